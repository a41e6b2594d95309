//! Resolves a broadcast's target descriptor into a concrete recipient list.
//!
//! Read-only over the profile store; results are sorted so the same snapshot
//! always yields the same list.

use chrono::{DateTime, Duration, Utc};

use crate::models::broadcast::TargetDescriptor;
use crate::models::profile::{Profile, Role, SegmentConditions};
use crate::state::AppState;

pub fn resolve_recipients(
    state: &AppState,
    descriptor: &TargetDescriptor,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut recipients: Vec<String> = match descriptor {
        TargetDescriptor::All => state
            .profiles
            .iter()
            .filter(|entry| entry.role == Role::Member)
            .map(|entry| entry.user_id.clone())
            .collect(),
        TargetDescriptor::Segment(segment_id) => {
            let Some(conditions) = state.segments.get(segment_id) else {
                return Vec::new();
            };
            state
                .profiles
                .iter()
                .filter(|entry| matches_segment(entry.value(), &conditions, now))
                .map(|entry| entry.user_id.clone())
                .collect()
        }
        TargetDescriptor::Tag(tag) => state
            .profiles
            .iter()
            .filter(|entry| entry.tags.iter().any(|candidate| candidate == tag))
            .map(|entry| entry.user_id.clone())
            .collect(),
        TargetDescriptor::Unknown => Vec::new(),
    };

    recipients.retain(|id| !id.is_empty());
    recipients.sort();
    recipients
}

fn matches_segment(profile: &Profile, conditions: &SegmentConditions, now: DateTime<Utc>) -> bool {
    if let Some(min_days) = conditions.min_days_joined {
        if profile.created_at > now - Duration::days(min_days) {
            return false;
        }
    }
    if let Some(max_points) = conditions.max_points {
        if profile.points >= max_points {
            return false;
        }
    }
    if let Some(inactive_days) = conditions.inactive_days {
        match profile.last_activity {
            Some(last_activity) if last_activity < now - Duration::days(inactive_days) => {}
            _ => return false,
        }
    }
    true
}
