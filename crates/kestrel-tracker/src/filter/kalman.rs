use kestrel_core::Vector2;
use nalgebra::{SMatrix, SVector};

type StateVector = SVector<f64, 4>;
type StateMatrix = SMatrix<f64, 4, 4>;
type ObsMatrix = SMatrix<f64, 2, 4>;

/// A planar constant-velocity Kalman filter.
///
/// State is `[x, vx, y, vy]`, observations are positions. Process noise
/// follows the discrete white-noise acceleration model scaled by the unit
/// transition variance.
#[derive(Clone, Debug)]
pub struct ConstantVelocityFilter {
    transition_var: f64,
    measurement_var: f64,
    /// Time of the current state, seconds.
    t: f64,
    p: StateMatrix,
    x: StateVector,
}

fn transition(dt: f64) -> StateMatrix {
    let mut a = StateMatrix::identity();
    a[(0, 1)] = dt;
    a[(2, 3)] = dt;
    a
}

fn process_noise(dt: f64, var: f64) -> StateMatrix {
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;
    let mut q = StateMatrix::zeros();
    for base in [0, 2] {
        q[(base, base)] = dt3 / 3.0;
        q[(base, base + 1)] = dt2 / 2.0;
        q[(base + 1, base)] = dt2 / 2.0;
        q[(base + 1, base + 1)] = dt;
    }
    q * var
}

fn observation() -> ObsMatrix {
    let mut h = ObsMatrix::zeros();
    h[(0, 0)] = 1.0;
    h[(1, 2)] = 1.0;
    h
}

impl ConstantVelocityFilter {
    pub fn new(pos: Vector2, t: f64, transition_var: f64, measurement_var: f64) -> Self {
        let mut x = StateVector::zeros();
        x[0] = pos.x;
        x[2] = pos.y;
        Self {
            transition_var,
            measurement_var,
            t,
            p: StateMatrix::identity(),
            x,
        }
    }

    /// Re-initializes the filter at the given position with zero velocity.
    pub fn reset(&mut self, pos: Vector2, t: f64) {
        self.x = StateVector::zeros();
        self.x[0] = pos.x;
        self.x[2] = pos.y;
        self.p = StateMatrix::identity();
        self.t = t;
    }

    /// Advances the state estimate to time `t` without a measurement.
    /// Idempotent for `t <= self.t`.
    pub fn predict_to(&mut self, t: f64) {
        let dt = t - self.t;
        if dt <= 0.0 {
            return;
        }
        let a = transition(dt);
        self.x = a * self.x;
        self.p = a * self.p * a.transpose() + process_noise(dt, self.transition_var);
        self.t = t;
    }

    /// Corrects the state with a position measurement taken at time `t`.
    /// Measurements older than the filter state are dropped.
    pub fn update(&mut self, z: Vector2, t: f64) {
        if t < self.t {
            return;
        }
        self.predict_to(t);
        let h = observation();
        let r = SMatrix::<f64, 2, 2>::identity() * self.measurement_var;
        let residual = SVector::<f64, 2>::new(z.x, z.y) - h * self.x;
        let s = h * self.p * h.transpose() + r;
        let s_inv = match s.try_inverse() {
            Some(inv) => inv,
            None => return,
        };
        let k = self.p * h.transpose() * s_inv;
        self.x += k * residual;
        self.p -= k * h * self.p;
    }

    /// Position of the prediction at a time at or after the filter time,
    /// without mutating the filter.
    pub fn predicted_position(&self, t: f64) -> Vector2 {
        let dt = (t - self.t).max(0.0);
        Vector2::new(self.x[0] + self.x[1] * dt, self.x[2] + self.x[3] * dt)
    }

    pub fn position(&self) -> Vector2 {
        Vector2::new(self.x[0], self.x[2])
    }

    pub fn velocity(&self) -> Vector2 {
        Vector2::new(self.x[1], self.x[3])
    }

    pub fn set_velocity(&mut self, v: Vector2) {
        self.x[1] = v.x;
        self.x[3] = v.y;
    }

    pub fn time(&self) -> f64 {
        self.t
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_converges_to_constant_motion() {
        let mut f = ConstantVelocityFilter::new(Vector2::zeros(), 0.0, 4.0, 0.003);
        for i in 1..=50 {
            let t = i as f64 * 0.016;
            f.update(Vector2::new(t, 2.0 * t), t);
        }
        assert_relative_eq!(f.velocity().x, 1.0, epsilon = 0.1);
        assert_relative_eq!(f.velocity().y, 2.0, epsilon = 0.2);
        assert_relative_eq!(f.position().x, 50.0 * 0.016, epsilon = 0.01);
    }

    #[test]
    fn test_old_measurement_dropped() {
        let mut f = ConstantVelocityFilter::new(Vector2::zeros(), 1.0, 4.0, 0.003);
        let before = f.position();
        f.update(Vector2::new(5.0, 5.0), 0.5);
        assert_eq!(f.position(), before);
        assert_eq!(f.time(), 1.0);
    }

    #[test]
    fn test_predict_is_idempotent_at_same_time() {
        let mut f = ConstantVelocityFilter::new(Vector2::new(1.0, 1.0), 0.0, 4.0, 0.003);
        f.set_velocity(Vector2::new(1.0, 0.0));
        f.predict_to(1.0);
        let pos = f.position();
        f.predict_to(1.0);
        assert_eq!(f.position(), pos);
        assert_relative_eq!(pos.x, 2.0, epsilon = 1e-12);
    }
}
