use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{post, put};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::profile::{Profile, Role, SegmentConditions};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profiles", post(create_profile).get(list_profiles))
        .route("/segments/:id", put(upsert_segment).get(get_segment))
}

#[derive(Deserialize)]
pub struct CreateProfileRequest {
    pub user_id: String,
    pub display_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

fn default_role() -> Role {
    Role::Member
}

async fn create_profile(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    if payload.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user_id cannot be empty".to_string()));
    }

    let profile = Profile {
        user_id: payload.user_id,
        display_name: payload.display_name,
        role: payload.role,
        points: payload.points,
        tags: payload.tags,
        created_at: payload.created_at.unwrap_or_else(Utc::now),
        last_activity: payload.last_activity,
    };

    state.profiles.insert(profile.user_id.clone(), profile.clone());
    Ok(Json(profile))
}

async fn list_profiles(State(state): State<Arc<AppState>>) -> Json<Vec<Profile>> {
    let mut profiles: Vec<Profile> = state
        .profiles
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    profiles.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    Json(profiles)
}

async fn upsert_segment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(conditions): Json<SegmentConditions>,
) -> Json<SegmentConditions> {
    state.segments.insert(id, conditions.clone());
    Json(conditions)
}

async fn get_segment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SegmentConditions>, AppError> {
    let conditions = state
        .segments
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("segment {} not found", id)))?;
    Ok(Json(conditions.clone()))
}
