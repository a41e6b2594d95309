use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub broadcasts_total: IntCounterVec,
    pub broadcast_recipients_total: IntCounterVec,
    pub broadcasts_in_queue: IntGauge,
    pub delivery_pass_seconds: Histogram,
    pub geofence_alerts_total: IntCounter,
    pub stop_updates_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let broadcasts_total = IntCounterVec::new(
            Opts::new("broadcasts_total", "Finalized broadcasts by outcome"),
            &["outcome"],
        )
        .expect("valid broadcasts_total metric");

        let broadcast_recipients_total = IntCounterVec::new(
            Opts::new(
                "broadcast_recipients_total",
                "Per-recipient delivery results by outcome",
            ),
            &["outcome"],
        )
        .expect("valid broadcast_recipients_total metric");

        let broadcasts_in_queue = IntGauge::new(
            "broadcasts_in_queue",
            "Current number of scheduled broadcasts",
        )
        .expect("valid broadcasts_in_queue metric");

        let delivery_pass_seconds = Histogram::with_opts(prometheus::HistogramOpts::new(
            "delivery_pass_seconds",
            "Duration of one broadcast polling pass in seconds",
        ))
        .expect("valid delivery_pass_seconds metric");

        let geofence_alerts_total = IntCounter::new(
            "geofence_alerts_total",
            "Total geofence deviation alerts triggered",
        )
        .expect("valid geofence_alerts_total metric");

        let stop_updates_total = IntCounterVec::new(
            Opts::new("stop_updates_total", "Group stop updates by operation"),
            &["operation"],
        )
        .expect("valid stop_updates_total metric");

        registry
            .register(Box::new(broadcasts_total.clone()))
            .expect("register broadcasts_total");
        registry
            .register(Box::new(broadcast_recipients_total.clone()))
            .expect("register broadcast_recipients_total");
        registry
            .register(Box::new(broadcasts_in_queue.clone()))
            .expect("register broadcasts_in_queue");
        registry
            .register(Box::new(delivery_pass_seconds.clone()))
            .expect("register delivery_pass_seconds");
        registry
            .register(Box::new(geofence_alerts_total.clone()))
            .expect("register geofence_alerts_total");
        registry
            .register(Box::new(stop_updates_total.clone()))
            .expect("register stop_updates_total");

        Self {
            registry,
            broadcasts_total,
            broadcast_recipients_total,
            broadcasts_in_queue,
            delivery_pass_seconds,
            geofence_alerts_total,
            stop_updates_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
