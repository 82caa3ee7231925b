use serde::{Deserialize, Serialize};

use crate::FieldRaw;

/// A single ball detection in vision coordinates (mm).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct BallDetection {
    pub x: f64,
    pub y: f64,
}

/// A single robot detection in vision coordinates (mm) with the pattern id.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct RobotDetection {
    pub robot_id: u32,
    pub x: f64,
    pub y: f64,
    /// Orientation in the vision frame, radians.
    pub orientation: f64,
}

/// One detection frame from a single camera.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DetectionFrame {
    /// Time the frame was captured, seconds (vision clock).
    pub t_capture: f64,
    /// Time the frame was sent, seconds (vision clock).
    pub t_sent: f64,
    pub camera_id: u32,
    pub balls: Vec<BallDetection>,
    pub robots_yellow: Vec<RobotDetection>,
    pub robots_blue: Vec<RobotDetection>,
}

/// Camera calibration as reported by vision.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct CameraCalibration {
    pub camera_id: u32,
    pub derived_camera_world_tx_mm: Option<f64>,
    pub derived_camera_world_ty_mm: Option<f64>,
    pub derived_camera_world_tz_mm: Option<f64>,
    pub focal_length: f64,
}

/// Field geometry and camera calibrations from a geometry packet.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct GeometryFrame {
    pub field: FieldRaw,
    pub calibrations: Vec<CameraCalibration>,
}

/// A decoded vision packet. Mirrors the wrapper packet of the vision
/// protocol: either part may be absent.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct VisionPacket {
    pub geometry: Option<GeometryFrame>,
    pub detection: Option<DetectionFrame>,
}
