use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;

pub const GEOFENCE_DEVIATION_RULE: &str = "geofence_deviation";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceAlertRule {
    pub rule_type: String,
    pub threshold_m: f64,
    pub active: bool,
}

/// Live location ping from a driver, one per log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationLog {
    pub id: Uuid,
    pub reference: String,
    pub user_id: String,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
}

/// Immutable record of one detected deviation. One row per qualifying log;
/// suppression of repeats is left to consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredAlert {
    pub id: Uuid,
    pub reference: String,
    pub driver_user_id: String,
    pub distance_m: f64,
    pub threshold_m: f64,
    pub destination: GeoPoint,
    pub driver_location: GeoPoint,
    pub log_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeviationOutcome {
    /// Job or destination data is incomplete; nothing to evaluate.
    NoData,
    NoDeviation { distance_m: f64 },
    AlertTriggered { alert: TriggeredAlert },
}
