use serde::{Deserialize, Serialize};

use crate::Vector2;

/// A radio command sent to a robot, fed back into tracking for prediction.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct RadioCommand {
    /// Team of the addressed robot. Commands without a team are dropped.
    pub is_blue: Option<bool>,
    pub id: u32,
    /// Commanded velocity in field coordinates, m/s.
    pub velocity: Vector2,
    pub kick_is_chip: Option<bool>,
    pub kick_is_linear: Option<bool>,
}

/// An axis-aligned area of interest in field coordinates.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Aoi {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Aoi {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x > self.x1 && x < self.x2 && y > self.y1 && y < self.y2
    }
}

/// Runtime configuration of the tracker.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default)]
pub struct TrackingCommand {
    pub aoi_enabled: Option<bool>,
    pub aoi: Option<Aoi>,
    pub system_delay_ns: Option<i64>,
    pub reset: bool,
}
