//! Geofence deviation monitor.
//!
//! Evaluated once per posted location log. Returns a structured outcome
//! instead of erroring so the write that spawned the evaluation never fails.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::geo;
use crate::models::alert::{DeviationOutcome, LocationLog, TriggeredAlert, GEOFENCE_DEVIATION_RULE};
use crate::models::location::GeoPoint;
use crate::state::AppState;

pub fn evaluate_location_log(state: &AppState, log: &LocationLog) -> DeviationOutcome {
    let Some(destination) = state
        .jobs
        .get(&log.reference)
        .and_then(|job| job.destination.clone())
        .filter(|dest| dest.radius_m > 0.0)
    else {
        return DeviationOutcome::NoData;
    };

    let center = GeoPoint {
        lat: destination.lat,
        lng: destination.lng,
    };
    let distance_m = geo::haversine_meters(&log.location, &center);

    let threshold_m = state
        .alert_rules
        .get(GEOFENCE_DEVIATION_RULE)
        .filter(|rule| rule.active)
        .map(|rule| rule.threshold_m)
        .unwrap_or(destination.radius_m);

    if distance_m <= threshold_m {
        return DeviationOutcome::NoDeviation { distance_m };
    }

    let alert = TriggeredAlert {
        id: Uuid::new_v4(),
        reference: log.reference.clone(),
        driver_user_id: log.user_id.clone(),
        distance_m,
        threshold_m,
        destination: center,
        driver_location: log.location.clone(),
        log_id: log.id,
        created_at: Utc::now(),
    };
    state.alerts.insert(alert.id, alert.clone());
    state.metrics.geofence_alerts_total.inc();
    let _ = state.alert_events_tx.send(alert.clone());

    warn!(
        reference = %log.reference,
        driver = %log.user_id,
        distance_m,
        threshold_m,
        "geofence deviation alert triggered"
    );

    DeviationOutcome::AlertTriggered { alert }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::alert::GeofenceAlertRule;
    use crate::models::job::Job;
    use crate::models::location::Destination;

    fn state_with_job(destination: Option<Destination>) -> AppState {
        let state = AppState::new(16, 50, 200.0);
        state.jobs.insert(
            "TRIP-1".to_string(),
            Job {
                reference: "TRIP-1".to_string(),
                route: "BKK01".to_string(),
                vehicle: None,
                driver: None,
                destination,
                stops: Vec::new(),
                imported_at: Utc::now(),
            },
        );
        state
    }

    fn log_at(lat: f64, lng: f64) -> LocationLog {
        LocationLog {
            id: Uuid::new_v4(),
            reference: "TRIP-1".to_string(),
            user_id: "U1".to_string(),
            location: GeoPoint { lat, lng },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn missing_destination_yields_no_data() {
        let state = state_with_job(None);
        let outcome = evaluate_location_log(&state, &log_at(13.75, 100.50));
        assert!(matches!(outcome, DeviationOutcome::NoData));
        assert!(state.alerts.is_empty());
    }

    #[test]
    fn non_positive_radius_yields_no_data() {
        let state = state_with_job(Some(Destination {
            lat: 13.75,
            lng: 100.50,
            radius_m: 0.0,
        }));
        let outcome = evaluate_location_log(&state, &log_at(13.75, 100.50));
        assert!(matches!(outcome, DeviationOutcome::NoData));
    }

    #[test]
    fn deviation_past_job_radius_triggers_one_alert() {
        let state = state_with_job(Some(Destination {
            lat: 13.75,
            lng: 100.50,
            radius_m: 100.0,
        }));

        // ~150m north of the destination
        let outcome = evaluate_location_log(&state, &log_at(13.75135, 100.50));
        let DeviationOutcome::AlertTriggered { alert } = outcome else {
            panic!("expected an alert");
        };
        assert!((alert.distance_m - 150.0).abs() < 5.0);
        assert_eq!(alert.threshold_m, 100.0);
        assert_eq!(state.alerts.len(), 1);
    }

    #[test]
    fn within_radius_is_no_deviation() {
        let state = state_with_job(Some(Destination {
            lat: 13.75,
            lng: 100.50,
            radius_m: 100.0,
        }));
        let outcome = evaluate_location_log(&state, &log_at(13.7503, 100.50));
        assert!(matches!(outcome, DeviationOutcome::NoDeviation { .. }));
        assert!(state.alerts.is_empty());
    }

    #[test]
    fn active_rule_threshold_overrides_job_radius() {
        let state = state_with_job(Some(Destination {
            lat: 13.75,
            lng: 100.50,
            radius_m: 100.0,
        }));
        state.alert_rules.insert(
            GEOFENCE_DEVIATION_RULE.to_string(),
            GeofenceAlertRule {
                rule_type: GEOFENCE_DEVIATION_RULE.to_string(),
                threshold_m: 500.0,
                active: true,
            },
        );

        // 150m out: beyond the job radius but inside the rule threshold
        let outcome = evaluate_location_log(&state, &log_at(13.75135, 100.50));
        assert!(matches!(outcome, DeviationOutcome::NoDeviation { .. }));
    }

    #[test]
    fn inactive_rule_falls_back_to_job_radius() {
        let state = state_with_job(Some(Destination {
            lat: 13.75,
            lng: 100.50,
            radius_m: 100.0,
        }));
        state.alert_rules.insert(
            GEOFENCE_DEVIATION_RULE.to_string(),
            GeofenceAlertRule {
                rule_type: GEOFENCE_DEVIATION_RULE.to_string(),
                threshold_m: 500.0,
                active: false,
            },
        );

        let outcome = evaluate_location_log(&state, &log_at(13.75135, 100.50));
        assert!(matches!(outcome, DeviationOutcome::AlertTriggered { .. }));
    }

    #[test]
    fn every_qualifying_log_produces_a_new_alert() {
        let state = state_with_job(Some(Destination {
            lat: 13.75,
            lng: 100.50,
            radius_m: 100.0,
        }));
        evaluate_location_log(&state, &log_at(13.76, 100.50));
        evaluate_location_log(&state, &log_at(13.76, 100.50));
        assert_eq!(state.alerts.len(), 2);
    }
}
