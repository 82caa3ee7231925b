use serde::{Deserialize, Serialize};

use crate::{Angle, Aoi, FieldGeometry, Vector2};

/// A tracked robot in a single world frame.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct RobotFrame {
    pub id: u32,
    /// Position in field coordinates, meters.
    pub position: Vector2,
    /// Velocity in m/s.
    pub velocity: Vector2,
    pub yaw: Angle,
    /// Angular speed in rad/s.
    pub angular_speed: f64,
    pub kick_is_chip: bool,
    pub kick_is_linear: bool,
}

/// The tracked ball in a single world frame.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct BallFrame {
    /// Position in field coordinates, meters.
    pub position: Vector2,
    /// Speed in m/s.
    pub speed: Vector2,
    /// Whether the ball was seen by the active camera recently.
    pub is_visible: bool,
}

/// A snapshot of the fused world state at a single point in time.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct WorldFrame {
    /// Snapshot time, nanoseconds (monotonic).
    pub time_ns: i64,
    pub has_vision_data: bool,
    pub ball: Option<BallFrame>,
    pub yellow: Vec<RobotFrame>,
    pub blue: Vec<RobotFrame>,
    /// Present only in the first snapshot after a geometry update.
    pub geometry: Option<FieldGeometry>,
    pub aoi: Option<Aoi>,
}
