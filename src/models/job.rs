use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::location::Destination;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopStatus {
    Pending,
    Checkin,
    Fueling,
    UnloadDone,
    Checkout,
}

impl StopStatus {
    /// Fueling and unload stamps happen between check-in and check-out, so
    /// all three count as the checked-in phase.
    pub fn is_checked_in(&self) -> bool {
        matches!(self, Self::Checkin | Self::Fueling | Self::UnloadDone)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Checkout)
    }

    /// Expected transitions. Operations do not reject on this (re-check-in is
    /// an idempotent overwrite); unusual transitions are logged instead.
    pub fn can_transition_to(&self, next: StopStatus) -> bool {
        match next {
            StopStatus::Pending => false,
            StopStatus::Checkin => matches!(self, Self::Pending | Self::Checkin),
            StopStatus::Fueling | StopStatus::UnloadDone => self.is_checked_in(),
            StopStatus::Checkout => self.is_checked_in() || *self == Self::Checkout,
        }
    }
}

/// One physical row of a delivery/pickup point. Rows sharing
/// `(reference, ship_to_code)` form one logical stop and are always updated
/// together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub id: i64,
    pub reference: String,
    pub ship_to_code: String,
    pub seq: u32,
    pub status: StopStatus,
    pub checkin_time: Option<DateTime<Utc>>,
    pub checkin_lat: Option<f64>,
    pub checkin_lng: Option<f64>,
    pub checkin_odo: Option<i64>,
    pub accuracy: Option<f64>,
    pub checkout_time: Option<DateTime<Utc>>,
    pub checkout_lat: Option<f64>,
    pub checkout_lng: Option<f64>,
    pub checkout_odo: Option<i64>,
    pub fueling_time: Option<DateTime<Utc>>,
    pub unload_done_time: Option<DateTime<Utc>>,
    pub receiver_name: Option<String>,
    pub receiver_type: Option<String>,
    pub has_pumping: Option<bool>,
    pub has_transfer: Option<bool>,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Stop {
    pub fn new(id: i64, reference: String, ship_to_code: String, seq: u32) -> Self {
        Self {
            id,
            reference,
            ship_to_code,
            seq,
            status: StopStatus::Pending,
            checkin_time: None,
            checkin_lat: None,
            checkin_lng: None,
            checkin_odo: None,
            accuracy: None,
            checkout_time: None,
            checkout_lat: None,
            checkout_lng: None,
            checkout_odo: None,
            fueling_time: None,
            unload_done_time: None,
            receiver_name: None,
            receiver_type: None,
            has_pumping: None,
            has_transfer: None,
            updated_by: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobProgress {
    Open,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub reference: String,
    pub route: String,
    pub vehicle: Option<String>,
    pub driver: Option<String>,
    pub destination: Option<Destination>,
    pub stops: Vec<Stop>,
    pub imported_at: DateTime<Utc>,
}

impl Job {
    pub fn progress(&self) -> JobProgress {
        if self.stops.is_empty() {
            return JobProgress::Open;
        }
        if self.stops.iter().all(|stop| stop.status.is_terminal()) {
            JobProgress::Completed
        } else if self.stops.iter().any(|stop| stop.status != StopStatus::Pending) {
            JobProgress::InProgress
        } else {
            JobProgress::Open
        }
    }

    /// Stops ordered by sequence, the shape reporting reads.
    pub fn grouped_stops(&self) -> Vec<Stop> {
        let mut stops = self.stops.clone();
        stops.sort_by_key(|stop| stop.seq);
        stops
    }
}

/// Result of a group update: how many physical rows were touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupUpdateResult {
    pub updated_count: usize,
    pub updated_ids: Vec<i64>,
}

impl GroupUpdateResult {
    pub fn empty() -> Self {
        Self {
            updated_count: 0,
            updated_ids: Vec::new(),
        }
    }
}
