use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::Vector2;

/// An angle in radians, always in (-pi, pi]. Arithmetic wraps:
///
/// ```ignore
/// # use kestrel_core::Angle;
/// let a = Angle::from_degrees(170.0);
/// let b = Angle::from_degrees(20.0);
/// assert_eq!((a + b).degrees(), -170.0);
/// ```
#[derive(Debug, Clone, Copy, PartialOrd, Serialize, Deserialize)]
pub struct Angle(f64);

impl Angle {
    /// Create a new angle from radians.
    pub fn from_radians(radians: f64) -> Self {
        Angle(wrap_angle(radians))
    }

    /// Create a new angle from degrees.
    pub fn from_degrees(degrees: f64) -> Self {
        Self::from_radians(degrees.to_radians())
    }

    /// The smallest signed counter-clockwise angle from point a to point b.
    pub fn between_points(a: Vector2, b: Vector2) -> Self {
        Self::from_radians((b.y - a.y).atan2(b.x - a.x))
    }

    /// Get the angle in radians.
    pub fn radians(&self) -> f64 {
        self.0
    }

    /// Get the angle in degrees.
    pub fn degrees(&self) -> f64 {
        self.0.to_degrees()
    }

    /// The unit vector pointing in this direction.
    pub fn to_vector(&self) -> Vector2 {
        Vector2::new(self.0.cos(), self.0.sin())
    }

    /// Rotate a vector by this angle.
    pub fn rotate_vector(&self, v: &Vector2) -> Vector2 {
        let rot = nalgebra::Rotation2::new(self.0);
        rot * v
    }

    /// Get the absolute value of the angle.
    pub fn abs(&self) -> f64 {
        self.0.abs()
    }
}

impl std::ops::Add for Angle {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Angle::from_radians(self.0 + other.0)
    }
}

impl std::ops::Sub for Angle {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Angle::from_radians(self.0 - other.0)
    }
}

impl std::ops::Neg for Angle {
    type Output = Self;

    fn neg(self) -> Self {
        Angle::from_radians(-self.0)
    }
}

impl std::fmt::Display for Angle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} rad", self.0)
    }
}

impl Default for Angle {
    fn default() -> Self {
        Self(0.0)
    }
}

impl PartialEq for Angle {
    fn eq(&self, other: &Self) -> bool {
        let diff = (self.0 - other.0).abs();
        const TOLERANCE: f64 = 1e-5;
        !(TOLERANCE..=(2.0 * PI - TOLERANCE)).contains(&diff)
    }
}

fn wrap_angle(angle: f64) -> f64 {
    let mut angle = angle % (2.0 * PI);
    if angle <= -PI {
        angle += 2.0 * PI;
    } else if angle > PI {
        angle -= 2.0 * PI;
    }
    angle
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_wrap_angle() {
        assert_eq!(wrap_angle(0.0), 0.0);
        assert_eq!(wrap_angle(PI), PI);
        assert_eq!(wrap_angle(-PI), PI);
        assert_eq!(wrap_angle(3.0 * PI), PI);
    }

    #[test]
    fn test_angle_arithmetic() {
        let a = Angle::from_degrees(90.0);
        let b = Angle::from_degrees(45.0);
        assert_eq!((a + b).degrees(), 135.0);
        assert_eq!((a - b).degrees(), 45.0);
        assert_eq!((-a).degrees(), -90.0);

        let a = Angle::from_degrees(180.0);
        let b = Angle::from_degrees(-179.0);
        assert_relative_eq!((a - b).degrees(), -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_between_points() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(1.0, 1.0);
        assert_eq!(Angle::between_points(a, b).degrees(), 45.0);
        assert_eq!(Angle::between_points(b, a).degrees(), -135.0);
    }

    #[test]
    fn test_to_vector_roundtrip() {
        let a = Angle::from_degrees(30.0);
        let v = a.to_vector();
        assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-12);
        assert_eq!(Angle::between_points(Vector2::zeros(), v), a);
    }
}
