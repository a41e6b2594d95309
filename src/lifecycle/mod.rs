//! Stop lifecycle operations.
//!
//! Every operation targets `(reference, ship_to_code)` and applies to all
//! physical rows sharing that pair. Updates are staged first and committed in
//! one write while holding the job entry lock, so a group is never observable
//! half-updated.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::geo;
use crate::models::job::{GroupUpdateResult, Job, Stop, StopStatus};
use crate::models::location::{Destination, GeoPoint};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckInFields {
    pub time: Option<DateTime<Utc>>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub odo: Option<i64>,
    pub accuracy: Option<f64>,
    pub updated_by: Option<String>,
    #[serde(default)]
    pub allow_out_of_radius: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckOutFields {
    pub time: Option<DateTime<Utc>>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub odo: Option<i64>,
    pub receiver_name: Option<String>,
    pub receiver_type: Option<String>,
    pub has_pumping: Option<bool>,
    pub has_transfer: Option<bool>,
    pub updated_by: Option<String>,
    #[serde(default)]
    pub allow_out_of_radius: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StampFields {
    pub time: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

pub fn check_in(
    state: &AppState,
    reference: &str,
    ship_to_code: &str,
    fields: CheckInFields,
) -> Result<GroupUpdateResult, AppError> {
    let Some(mut job) = state.jobs.get_mut(reference) else {
        return Ok(GroupUpdateResult::empty());
    };
    radius_gate(
        state,
        &job,
        ship_to_code,
        fields.lat,
        fields.lng,
        fields.allow_out_of_radius,
    )?;

    let time = fields.time.unwrap_or_else(Utc::now);
    let result = apply_group(&mut *job, ship_to_code, |stop| {
        if !stop.status.can_transition_to(StopStatus::Checkin) {
            warn!(
                reference = %reference,
                ship_to_code = %ship_to_code,
                from = ?stop.status,
                "unusual transition to CHECKIN"
            );
        }
        let mut next = stop.clone();
        next.status = StopStatus::Checkin;
        next.checkin_time = Some(time);
        if fields.lat.is_some() {
            next.checkin_lat = fields.lat;
        }
        if fields.lng.is_some() {
            next.checkin_lng = fields.lng;
        }
        if fields.odo.is_some() {
            next.checkin_odo = fields.odo;
        }
        if fields.accuracy.is_some() {
            next.accuracy = fields.accuracy;
        }
        next.updated_by = fields.updated_by.clone();
        next.updated_at = Some(time);
        Ok(next)
    })?;

    finish_operation(state, "checkin", reference, ship_to_code, &result);
    Ok(result)
}

pub fn check_out(
    state: &AppState,
    reference: &str,
    ship_to_code: &str,
    fields: CheckOutFields,
) -> Result<GroupUpdateResult, AppError> {
    let Some(mut job) = state.jobs.get_mut(reference) else {
        return Ok(GroupUpdateResult::empty());
    };
    radius_gate(
        state,
        &job,
        ship_to_code,
        fields.lat,
        fields.lng,
        fields.allow_out_of_radius,
    )?;

    let time = fields.time.unwrap_or_else(Utc::now);
    let result = apply_group(&mut *job, ship_to_code, |stop| {
        if !stop.status.can_transition_to(StopStatus::Checkout) {
            warn!(
                reference = %reference,
                ship_to_code = %ship_to_code,
                from = ?stop.status,
                "unusual transition to CHECKOUT"
            );
        }
        let mut next = stop.clone();
        next.status = StopStatus::Checkout;
        next.checkout_time = Some(time);
        if fields.lat.is_some() {
            next.checkout_lat = fields.lat;
        }
        if fields.lng.is_some() {
            next.checkout_lng = fields.lng;
        }
        if fields.odo.is_some() {
            next.checkout_odo = fields.odo;
        }
        if fields.receiver_name.is_some() {
            next.receiver_name = fields.receiver_name.clone();
        }
        if fields.receiver_type.is_some() {
            next.receiver_type = fields.receiver_type.clone();
        }
        if fields.has_pumping.is_some() {
            next.has_pumping = fields.has_pumping;
        }
        if fields.has_transfer.is_some() {
            next.has_transfer = fields.has_transfer;
        }
        next.updated_by = fields.updated_by.clone();
        next.updated_at = Some(time);
        Ok(next)
    })?;

    finish_operation(state, "checkout", reference, ship_to_code, &result);
    Ok(result)
}

/// Stamp the fueling time on every row of the group. The check-in/out phase
/// of `status` is left untouched.
pub fn update_fueling(
    state: &AppState,
    reference: &str,
    ship_to_code: &str,
    fields: StampFields,
) -> Result<GroupUpdateResult, AppError> {
    stamp_group(state, reference, ship_to_code, fields, "fueling", |next, time| {
        next.fueling_time = Some(time);
    })
}

/// Stamp the unload-done time on every row of the group.
pub fn update_unload(
    state: &AppState,
    reference: &str,
    ship_to_code: &str,
    fields: StampFields,
) -> Result<GroupUpdateResult, AppError> {
    stamp_group(state, reference, ship_to_code, fields, "unload", |next, time| {
        next.unload_done_time = Some(time);
    })
}

fn stamp_group<F>(
    state: &AppState,
    reference: &str,
    ship_to_code: &str,
    fields: StampFields,
    operation: &'static str,
    stamp: F,
) -> Result<GroupUpdateResult, AppError>
where
    F: Fn(&mut Stop, DateTime<Utc>),
{
    let Some(mut job) = state.jobs.get_mut(reference) else {
        return Ok(GroupUpdateResult::empty());
    };

    let time = fields.time.unwrap_or_else(Utc::now);
    let result = apply_group(&mut *job, ship_to_code, |stop| {
        if !stop.status.is_checked_in() {
            warn!(
                reference = %reference,
                ship_to_code = %ship_to_code,
                status = ?stop.status,
                operation,
                "stamping a stop outside the checked-in phase"
            );
        }
        let mut next = stop.clone();
        stamp(&mut next, time);
        next.updated_by = fields.updated_by.clone();
        next.updated_at = Some(time);
        Ok(next)
    })?;

    finish_operation(state, operation, reference, ship_to_code, &result);
    Ok(result)
}

/// Stage an updated copy of every row in the group, then commit all of them.
/// A failure while staging leaves the job untouched.
pub(crate) fn apply_group<F>(
    job: &mut Job,
    ship_to_code: &str,
    mut apply: F,
) -> Result<GroupUpdateResult, AppError>
where
    F: FnMut(&Stop) -> Result<Stop, AppError>,
{
    let mut staged: Vec<(usize, Stop)> = Vec::new();
    for (index, stop) in job.stops.iter().enumerate() {
        if stop.ship_to_code == ship_to_code {
            staged.push((index, apply(stop)?));
        }
    }

    let mut updated_ids = Vec::with_capacity(staged.len());
    for (index, next) in staged {
        updated_ids.push(next.id);
        job.stops[index] = next;
    }

    Ok(GroupUpdateResult {
        updated_count: updated_ids.len(),
        updated_ids,
    })
}

fn finish_operation(
    state: &AppState,
    operation: &'static str,
    reference: &str,
    ship_to_code: &str,
    result: &GroupUpdateResult,
) {
    state
        .metrics
        .stop_updates_total
        .with_label_values(&[operation])
        .inc();
    info!(
        reference = %reference,
        ship_to_code = %ship_to_code,
        operation,
        updated_count = result.updated_count,
        "stop group updated"
    );
}

/// Advisory radius gate. Rejects an out-of-radius write unless the caller
/// explicitly allows it; supplied coordinates are recorded verbatim either
/// way. Missing coordinates or an unresolvable destination skip the gate.
fn radius_gate(
    state: &AppState,
    job: &Job,
    ship_to_code: &str,
    lat: Option<f64>,
    lng: Option<f64>,
    allow_out_of_radius: bool,
) -> Result<(), AppError> {
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return Ok(());
    };
    let Some(point) = geo::checked_point(lat, lng) else {
        return Err(AppError::BadRequest("invalid coordinates".to_string()));
    };
    let Some(dest) = resolve_stop_destination(state, job, ship_to_code) else {
        return Ok(());
    };
    let center = GeoPoint {
        lat: dest.lat,
        lng: dest.lng,
    };
    let distance_m = geo::haversine_meters(&point, &center);
    if distance_m > dest.radius_m {
        if !allow_out_of_radius {
            return Err(AppError::OutOfRadius {
                distance_m,
                radius_m: dest.radius_m,
            });
        }
        warn!(
            reference = %job.reference,
            ship_to_code = %ship_to_code,
            distance_m,
            radius_m = dest.radius_m,
            "accepting out-of-radius update via override"
        );
    }
    Ok(())
}

/// Destination precedence: the job's own coordinates, then the station table
/// by ship-to code, then the origin table by route prefix.
fn resolve_stop_destination(
    state: &AppState,
    job: &Job,
    ship_to_code: &str,
) -> Option<Destination> {
    if let Some(dest) = &job.destination {
        return Some(dest.clone());
    }
    let locations = state
        .locations
        .read()
        .expect("location directory lock poisoned");
    locations
        .resolve_by_code(ship_to_code)
        .or_else(|| locations.resolve_by_route_prefix(&job.route))
        .map(|config| config.destination())
}
