use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use dashmap::{DashMap, DashSet};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::alert::{GeofenceAlertRule, TriggeredAlert};
use crate::models::broadcast::BroadcastMessage;
use crate::models::job::Job;
use crate::models::profile::{Profile, SegmentConditions};
use crate::observability::metrics::Metrics;
use crate::resolver::LocationDirectory;

pub struct AppState {
    pub jobs: DashMap<String, Job>,
    pub profiles: DashMap<String, Profile>,
    pub segments: DashMap<String, SegmentConditions>,
    pub broadcasts: DashMap<Uuid, BroadcastMessage>,
    pub in_flight_broadcasts: DashSet<Uuid>,
    pub alert_rules: DashMap<String, GeofenceAlertRule>,
    pub alerts: DashMap<Uuid, TriggeredAlert>,
    pub locations: RwLock<LocationDirectory>,
    pub alert_events_tx: broadcast::Sender<TriggeredAlert>,
    pub broadcast_batch_size: usize,
    pub metrics: Metrics,
    stop_id_seq: AtomicI64,
}

impl AppState {
    pub fn new(
        event_buffer_size: usize,
        broadcast_batch_size: usize,
        default_radius_m: f64,
    ) -> Self {
        let (alert_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            jobs: DashMap::new(),
            profiles: DashMap::new(),
            segments: DashMap::new(),
            broadcasts: DashMap::new(),
            in_flight_broadcasts: DashSet::new(),
            alert_rules: DashMap::new(),
            alerts: DashMap::new(),
            locations: RwLock::new(LocationDirectory::empty(default_radius_m)),
            alert_events_tx,
            broadcast_batch_size,
            metrics: Metrics::new(),
            stop_id_seq: AtomicI64::new(0),
        }
    }

    pub fn next_stop_id(&self) -> i64 {
        self.stop_id_seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}
