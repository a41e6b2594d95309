use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::broadcast::{BroadcastMessage, BroadcastStatus, MsgType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/broadcasts", post(create_broadcast).get(list_broadcasts))
        .route("/broadcasts/:id", get(get_broadcast))
}

#[derive(Deserialize)]
pub struct CreateBroadcastRequest {
    pub target: String,
    pub msg_type: MsgType,
    pub message: Option<String>,
    pub image_url: Option<String>,
    pub flex_json: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Queue a broadcast. Payload content is stored raw; the delivery engine
/// parses flex content at send time.
async fn create_broadcast(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBroadcastRequest>,
) -> Result<Json<BroadcastMessage>, AppError> {
    if payload.target.trim().is_empty() {
        return Err(AppError::BadRequest("target cannot be empty".to_string()));
    }
    match payload.msg_type {
        MsgType::Image if payload.image_url.as_deref().unwrap_or("").is_empty() => {
            return Err(AppError::BadRequest(
                "image broadcast requires image_url".to_string(),
            ));
        }
        MsgType::Flex if payload.flex_json.as_deref().unwrap_or("").is_empty() => {
            return Err(AppError::BadRequest(
                "flex broadcast requires flex_json".to_string(),
            ));
        }
        _ => {}
    }

    let now = Utc::now();
    let message = BroadcastMessage {
        id: Uuid::new_v4(),
        target: payload.target,
        msg_type: payload.msg_type,
        message: payload.message,
        image_url: payload.image_url,
        flex_json: payload.flex_json,
        scheduled_at: payload.scheduled_at.unwrap_or(now),
        status: BroadcastStatus::Scheduled,
        created_at: now,
        updated_at: now,
    };

    state.broadcasts.insert(message.id, message.clone());
    state.metrics.broadcasts_in_queue.inc();
    Ok(Json(message))
}

async fn list_broadcasts(State(state): State<Arc<AppState>>) -> Json<Vec<BroadcastMessage>> {
    let mut messages: Vec<BroadcastMessage> = state
        .broadcasts
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    messages.sort_by_key(|message| message.scheduled_at);
    Json(messages)
}

async fn get_broadcast(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BroadcastMessage>, AppError> {
    let message = state
        .broadcasts
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("broadcast {} not found", id)))?;
    Ok(Json(message.clone()))
}
