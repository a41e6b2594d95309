use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::resolver::ConfigTable;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/locations/import", post(import_locations))
}

#[derive(Deserialize)]
pub struct ImportLocationsRequest {
    #[serde(default)]
    pub station: ConfigTable,
    #[serde(default)]
    pub origin: ConfigTable,
}

#[derive(Serialize)]
pub struct ImportLocationsResponse {
    pub station_rows: usize,
    pub origin_rows: usize,
}

/// Replace both location tables. Rows are kept raw; normalization happens at
/// resolution time so one bad row never blocks an import.
async fn import_locations(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ImportLocationsRequest>,
) -> Json<ImportLocationsResponse> {
    let response = ImportLocationsResponse {
        station_rows: payload.station.rows.len(),
        origin_rows: payload.origin.rows.len(),
    };

    let mut locations = state
        .locations
        .write()
        .expect("location directory lock poisoned");
    locations.station = payload.station;
    locations.origin = payload.origin;
    drop(locations);

    info!(
        station_rows = response.station_rows,
        origin_rows = response.origin_rows,
        "location directory replaced"
    );
    Json(response)
}
