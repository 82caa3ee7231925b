use std::f64::consts::PI;

/// A low-pass filter for angular values (radians), wraparound-aware.
///
/// Also tracks a smoothed angular speed from the filtered differences.
#[derive(Clone, Debug)]
pub struct AngleLowPassFilter {
    alpha: f64,
    filtered_angle: Option<f64>,
    angular_speed: f64,
    last_time: f64,
}

impl AngleLowPassFilter {
    pub fn new(alpha: f64) -> Self {
        AngleLowPassFilter {
            alpha: alpha.clamp(0.0, 1.0),
            filtered_angle: None,
            angular_speed: 0.0,
            last_time: 0.0,
        }
    }

    /// Updates the filter with a new measurement and returns the filtered
    /// angle.
    pub fn update(&mut self, angle: f64, t: f64) -> f64 {
        let normalized = normalize_angle(angle);

        if let Some(filtered) = self.filtered_angle {
            let mut diff = normalized - filtered;
            if diff > PI {
                diff -= 2.0 * PI;
            } else if diff < -PI {
                diff += 2.0 * PI;
            }

            let step = self.alpha * diff;
            let dt = t - self.last_time;
            if dt > 0.0 {
                self.angular_speed = step / dt;
            }
            self.filtered_angle = Some(normalize_angle(filtered + step));
        } else {
            self.filtered_angle = Some(normalized);
        }
        self.last_time = t;

        self.filtered_angle.unwrap_or(normalized)
    }

    pub fn angle(&self) -> f64 {
        self.filtered_angle.unwrap_or(0.0)
    }

    pub fn angular_speed(&self) -> f64 {
        self.angular_speed
    }
}

fn normalize_angle(angle: f64) -> f64 {
    let mut normalized = angle % (2.0 * PI);
    if normalized > PI {
        normalized -= 2.0 * PI;
    } else if normalized < -PI {
        normalized += 2.0 * PI;
    }
    normalized
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_first_sample_passes_through() {
        let mut lpf = AngleLowPassFilter::new(0.3);
        assert_relative_eq!(lpf.update(1.0, 0.0), 1.0);
    }

    #[test]
    fn test_wraparound() {
        let mut lpf = AngleLowPassFilter::new(0.5);
        lpf.update(PI - 0.01, 0.0);
        // crossing the -pi/pi boundary must move the short way
        let filtered = lpf.update(-PI + 0.01, 0.016);
        assert!(filtered.abs() > PI - 0.02);
    }

    #[test]
    fn test_angular_speed_sign() {
        let mut lpf = AngleLowPassFilter::new(1.0);
        lpf.update(0.0, 0.0);
        lpf.update(0.1, 0.1);
        assert_relative_eq!(lpf.angular_speed(), 1.0, epsilon = 1e-9);
    }
}
