use serde::{Deserialize, Serialize};

/// Settings for the vision fusion core.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TrackerSettings {
    /// Robot body radius in meters.
    pub robot_radius: f64,
    /// Robot body height in meters. Used for the occlusion test.
    pub robot_height: f64,
    /// Width of the dribbler face in meters.
    pub dribbler_width: f64,
    /// Distance from the robot center to the dribbler face in meters.
    pub shoot_radius: f64,

    /// Frames a filter must have absorbed before it is considered mature.
    pub min_frame_count: u32,
    /// Grace window after a reset during which immature robot filters are
    /// reported, nanoseconds.
    pub robot_reset_timeout_ns: i64,
    /// Grace window after a reset for ball filters, nanoseconds.
    pub ball_reset_timeout_ns: i64,

    /// Invalidation limit for a ball filter with siblings, nanoseconds.
    pub ball_max_time_ns: i64,
    /// Invalidation limit for the last ball filter, nanoseconds.
    pub ball_max_time_last_ns: i64,
    /// Invalidation limit for a robot filter with same-id siblings, ns.
    pub robot_max_time_ns: i64,
    /// Invalidation limit for the last robot filter of an id, nanoseconds.
    pub robot_max_time_last_ns: i64,

    /// Nearest-track association gate for robot detections, meters.
    pub association_gate: f64,
    /// Acceptance gate against the last reported ball position, meters.
    pub ball_accept_dist: f64,

    /// Enables the ball/robot collision and dribbling rules of the ball
    /// filter. The plain ground filter is always active.
    pub ball_collision_handling: bool,

    /// Transition variance of the robot position filter.
    pub robot_transition_var: f64,
    /// Measurement variance of the robot position filter.
    pub robot_measurement_var: f64,
    /// Smoothing factor of the yaw low-pass filter.
    pub robot_yaw_lpf_alpha: f64,
    /// Transition variance of the ball position filter.
    pub ball_transition_var: f64,
    /// Measurement variance of the ball position filter.
    pub ball_measurement_var: f64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            robot_radius: 0.088,
            robot_height: 0.148,
            dribbler_width: 0.07,
            shoot_radius: 0.0669,
            min_frame_count: 5,
            robot_reset_timeout_ns: 100_000_000,
            ball_reset_timeout_ns: 500_000_000,
            ball_max_time_ns: 100_000_000,
            ball_max_time_last_ns: 1_000_000_000,
            robot_max_time_ns: 200_000_000,
            robot_max_time_last_ns: 1_000_000_000,
            association_gate: 0.5,
            ball_accept_dist: 0.5,
            ball_collision_handling: false,
            robot_transition_var: 4.0,
            robot_measurement_var: 0.003,
            robot_yaw_lpf_alpha: 0.3,
            ball_transition_var: 16.0,
            ball_measurement_var: 0.003,
        }
    }
}

/// Settings for the trajectory planning core.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Maximum 2-D speed, m/s.
    pub max_speed: f64,
    /// Maximum acceleration, m/s^2.
    pub acceleration: f64,
    /// Enables the exponential tail slowdown for plans ending at rest.
    pub exponential_slowdown: bool,
    /// Clearance below which a trajectory's time is penalized, meters.
    pub obstacle_avoidance_radius: f64,
    /// Time penalty factor for trajectories closer than the avoidance
    /// radius.
    pub obstacle_avoidance_bonus: f64,
    /// Robot body radius used to inflate obstacles, meters.
    pub robot_radius: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_speed: 3.5,
            acceleration: 3.0,
            exponential_slowdown: true,
            obstacle_avoidance_radius: 0.1,
            obstacle_avoidance_bonus: 1.2,
            robot_radius: 0.088,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_robot_dimensions() {
        let s = TrackerSettings::default();
        assert_eq!(s.robot_radius, 0.088);
        assert_eq!(s.min_frame_count, 5);
        assert!(!s.ball_collision_handling);

        let p = PlannerSettings::default();
        assert_eq!(p.obstacle_avoidance_radius, 0.1);
        assert_eq!(p.obstacle_avoidance_bonus, 1.2);
    }
}
