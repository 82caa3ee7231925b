use kestrel_core::{CameraCalibration, VecMap, Vector3};

#[derive(Clone, Copy, Debug)]
struct Camera {
    position: Vector3,
    focal_length: f64,
}

/// Registry of camera calibrations, keyed by camera id.
///
/// Cameras are upserted on every calibration message and never removed.
/// Positions are stored in field coordinates (meters), without the flip --
/// the whole filter pipeline works in the unflipped frame.
#[derive(Clone, Debug, Default)]
pub struct CameraRegistry {
    cameras: VecMap<u32, Camera>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts a camera from a calibration message. Calibrations without a
    /// derived world position are ignored.
    pub fn update(&mut self, calib: &CameraCalibration) {
        let (tx, ty, tz) = match (
            calib.derived_camera_world_tx_mm,
            calib.derived_camera_world_ty_mm,
            calib.derived_camera_world_tz_mm,
        ) {
            (Some(tx), Some(ty), Some(tz)) => (tx, ty, tz),
            _ => return,
        };
        let position = Vector3::new(-ty / 1000.0, tx / 1000.0, tz / 1000.0);
        self.cameras.insert(
            calib.camera_id,
            Camera {
                position,
                focal_length: calib.focal_length,
            },
        );
    }

    pub fn has(&self, camera_id: u32) -> bool {
        self.cameras.contains_key(&camera_id)
    }

    pub fn position(&self, camera_id: u32) -> Option<Vector3> {
        self.cameras.get(&camera_id).map(|c| c.position)
    }

    pub fn focal_length(&self, camera_id: u32) -> Option<f64> {
        self.cameras.get(&camera_id).map(|c| c.focal_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calib(id: u32, tx: f64, ty: f64, tz: f64) -> CameraCalibration {
        CameraCalibration {
            camera_id: id,
            derived_camera_world_tx_mm: Some(tx),
            derived_camera_world_ty_mm: Some(ty),
            derived_camera_world_tz_mm: Some(tz),
            focal_length: 500.0,
        }
    }

    #[test]
    fn test_upsert_and_convert() {
        let mut reg = CameraRegistry::new();
        reg.update(&calib(0, 1000.0, 2000.0, 3000.0));
        assert!(reg.has(0));
        assert!(!reg.has(1));
        assert_eq!(reg.position(0), Some(Vector3::new(-2.0, 1.0, 3.0)));

        reg.update(&calib(0, -1000.0, 0.0, 4000.0));
        assert_eq!(reg.position(0), Some(Vector3::new(0.0, -1.0, 4.0)));
    }

    #[test]
    fn test_incomplete_calibration_ignored() {
        let mut reg = CameraRegistry::new();
        let mut c = calib(2, 0.0, 0.0, 3000.0);
        c.derived_camera_world_tz_mm = None;
        reg.update(&c);
        assert!(!reg.has(2));
    }
}
