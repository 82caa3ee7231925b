use crate::Vector2;

/// Convert a position from ssl-vision coordinates (mm) to field coordinates
/// (meters). The vision frame is rotated 90 degrees against the field frame.
pub fn from_vision(x_mm: f64, y_mm: f64, flip: bool) -> Vector2 {
    let x = -y_mm / 1000.0;
    let y = x_mm / 1000.0;
    if flip {
        Vector2::new(-x, -y)
    } else {
        Vector2::new(x, y)
    }
}

/// Convert a field position (meters) back to ssl-vision coordinates (mm).
pub fn to_vision(pos: Vector2, flip: bool) -> (f64, f64) {
    let pos = if flip { -pos } else { pos };
    (pos.y * 1000.0, -pos.x * 1000.0)
}
