use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::monitor;
use crate::error::AppError;
use crate::geo;
use crate::lifecycle::{self, CheckInFields, CheckOutFields, StampFields};
use crate::models::alert::{DeviationOutcome, GeofenceAlertRule, LocationLog, TriggeredAlert};
use crate::models::job::{GroupUpdateResult, Job, JobProgress, Stop};
use crate::models::location::{Destination, GeoPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(import_job))
        .route("/jobs/:reference", get(get_job))
        .route(
            "/jobs/:reference/stops/:ship_to_code/check-in",
            post(check_in),
        )
        .route(
            "/jobs/:reference/stops/:ship_to_code/check-out",
            post(check_out),
        )
        .route(
            "/jobs/:reference/stops/:ship_to_code/fueling",
            post(update_fueling),
        )
        .route(
            "/jobs/:reference/stops/:ship_to_code/unload",
            post(update_unload),
        )
        .route("/jobs/:reference/location-logs", post(post_location_log))
        .route("/alerts", get(list_alerts))
        .route("/alert-rules/:rule_type", put(upsert_alert_rule))
}

#[derive(Deserialize)]
pub struct ImportStopRequest {
    pub ship_to_code: String,
    pub seq: u32,
}

#[derive(Deserialize)]
pub struct ImportJobRequest {
    pub reference: String,
    pub route: String,
    pub vehicle: Option<String>,
    pub driver: Option<String>,
    pub destination: Option<Destination>,
    pub stops: Vec<ImportStopRequest>,
}

#[derive(Serialize)]
pub struct JobResponse {
    pub reference: String,
    pub route: String,
    pub vehicle: Option<String>,
    pub driver: Option<String>,
    pub destination: Option<Destination>,
    pub progress: JobProgress,
    pub stops: Vec<Stop>,
}

impl JobResponse {
    fn from_job(job: &Job) -> Self {
        Self {
            reference: job.reference.clone(),
            route: job.route.clone(),
            vehicle: job.vehicle.clone(),
            driver: job.driver.clone(),
            destination: job.destination.clone(),
            progress: job.progress(),
            stops: job.grouped_stops(),
        }
    }
}

/// Import or replace a job. Stops start PENDING; a re-import supersedes the
/// previous rows for the reference.
async fn import_job(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ImportJobRequest>,
) -> Result<Json<JobResponse>, AppError> {
    if payload.reference.trim().is_empty() {
        return Err(AppError::BadRequest("reference cannot be empty".to_string()));
    }
    if payload
        .stops
        .iter()
        .any(|stop| stop.ship_to_code.trim().is_empty())
    {
        return Err(AppError::BadRequest(
            "ship_to_code cannot be empty".to_string(),
        ));
    }

    let stops: Vec<Stop> = payload
        .stops
        .into_iter()
        .map(|stop| {
            Stop::new(
                state.next_stop_id(),
                payload.reference.clone(),
                stop.ship_to_code,
                stop.seq,
            )
        })
        .collect();

    let job = Job {
        reference: payload.reference.clone(),
        route: payload.route,
        vehicle: payload.vehicle,
        driver: payload.driver,
        destination: payload.destination,
        stops,
        imported_at: Utc::now(),
    };

    state.jobs.insert(payload.reference, job.clone());
    Ok(Json(JobResponse::from_job(&job)))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job = state
        .jobs
        .get(&reference)
        .ok_or_else(|| AppError::NotFound(format!("job {} not found", reference)))?;

    Ok(Json(JobResponse::from_job(&job)))
}

async fn check_in(
    State(state): State<Arc<AppState>>,
    Path((reference, ship_to_code)): Path<(String, String)>,
    Json(fields): Json<CheckInFields>,
) -> Result<Json<GroupUpdateResult>, AppError> {
    let result = lifecycle::check_in(&state, &reference, &ship_to_code, fields)?;
    Ok(Json(result))
}

async fn check_out(
    State(state): State<Arc<AppState>>,
    Path((reference, ship_to_code)): Path<(String, String)>,
    Json(fields): Json<CheckOutFields>,
) -> Result<Json<GroupUpdateResult>, AppError> {
    let result = lifecycle::check_out(&state, &reference, &ship_to_code, fields)?;
    Ok(Json(result))
}

async fn update_fueling(
    State(state): State<Arc<AppState>>,
    Path((reference, ship_to_code)): Path<(String, String)>,
    Json(fields): Json<StampFields>,
) -> Result<Json<GroupUpdateResult>, AppError> {
    let result = lifecycle::update_fueling(&state, &reference, &ship_to_code, fields)?;
    Ok(Json(result))
}

async fn update_unload(
    State(state): State<Arc<AppState>>,
    Path((reference, ship_to_code)): Path<(String, String)>,
    Json(fields): Json<StampFields>,
) -> Result<Json<GroupUpdateResult>, AppError> {
    let result = lifecycle::update_unload(&state, &reference, &ship_to_code, fields)?;
    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct LocationLogRequest {
    pub user_id: String,
    pub location: GeoPoint,
}

/// Record a live location ping and evaluate it against the trip's geofence.
/// The evaluation outcome is returned, never an error.
async fn post_location_log(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
    Json(payload): Json<LocationLogRequest>,
) -> Result<Json<DeviationOutcome>, AppError> {
    let Some(location) = geo::checked_point(payload.location.lat, payload.location.lng) else {
        return Err(AppError::BadRequest("invalid coordinates".to_string()));
    };

    let log = LocationLog {
        id: Uuid::new_v4(),
        reference,
        user_id: payload.user_id,
        location,
        created_at: Utc::now(),
    };

    Ok(Json(monitor::evaluate_location_log(&state, &log)))
}

async fn list_alerts(State(state): State<Arc<AppState>>) -> Json<Vec<TriggeredAlert>> {
    let mut alerts: Vec<TriggeredAlert> = state
        .alerts
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    alerts.sort_by_key(|alert| alert.created_at);
    Json(alerts)
}

#[derive(Deserialize)]
pub struct AlertRuleRequest {
    pub threshold_m: f64,
    pub active: bool,
}

async fn upsert_alert_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_type): Path<String>,
    Json(payload): Json<AlertRuleRequest>,
) -> Result<Json<GeofenceAlertRule>, AppError> {
    if payload.threshold_m <= 0.0 {
        return Err(AppError::BadRequest("threshold_m must be > 0".to_string()));
    }

    let rule = GeofenceAlertRule {
        rule_type: rule_type.clone(),
        threshold_m: payload.threshold_m,
        active: payload.active,
    };
    state.alert_rules.insert(rule_type, rule.clone());
    Ok(Json(rule))
}
