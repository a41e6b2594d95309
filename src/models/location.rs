use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Destination geofence attached to a job: center plus acceptance radius.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub lat: f64,
    pub lng: f64,
    pub radius_m: f64,
}

/// Normalized location record resolved from the station or origin tables.
/// Invariant: `radius_m > 0` (the resolver substitutes the default otherwise).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    pub code: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub radius_m: f64,
}

impl LocationConfig {
    pub fn destination(&self) -> Destination {
        Destination {
            lat: self.lat,
            lng: self.lng,
            radius_m: self.radius_m,
        }
    }
}
