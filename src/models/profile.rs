use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub points: i64,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Stored filter conditions for a customer segment. All set conditions must
/// hold (conjunctive); `max_points = 0` is a valid, meaningful bound.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentConditions {
    pub min_days_joined: Option<i64>,
    pub max_points: Option<i64>,
    pub inactive_days: Option<i64>,
}
