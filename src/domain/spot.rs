//! Parking spot model

use crate::domain::types::{SizeClass, SpotKey};
use serde::{Deserialize, Serialize};

/// Registration request for a spot, as supplied by the location registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotSpec {
    pub key: SpotKey,
    pub size: SizeClass,
    /// Walking distance to the nearest elevator (only the proximity policy reads it)
    #[serde(default)]
    pub elevator_distance: u32,
}

impl SpotSpec {
    pub fn new(unit: u32, spot: u32, size: SizeClass) -> Self {
        Self { key: SpotKey::new(unit, spot), size, elevator_distance: 0 }
    }

    pub fn with_elevator_distance(mut self, distance: u32) -> Self {
        self.elevator_distance = distance;
        self
    }
}

/// A registered spot. The inventory owns the canonical instance; callers get copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Spot {
    pub key: SpotKey,
    pub size: SizeClass,
    /// Registration order across the whole facility, starting at 0
    pub seq: u64,
    pub elevator_distance: u32,
    pub available: bool,
}

impl Spot {
    pub(crate) fn from_spec(spec: SpotSpec, seq: u64) -> Self {
        Self {
            key: spec.key,
            size: spec.size,
            seq,
            elevator_distance: spec.elevator_distance,
            available: true,
        }
    }
}
