use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// A coordinate with a display label, used for depots and driver start points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedLocation {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

impl NamedLocation {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}
