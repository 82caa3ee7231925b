use std::collections::VecDeque;
use std::f64::consts::{FRAC_PI_2, PI};

use kestrel_core::{
    from_vision, Angle, RadioCommand, RobotDetection, RobotFrame, TrackerSettings, Vector2,
};

use crate::filter::{AngleLowPassFilter, ConstantVelocityFilter};

fn secs(t_ns: i64) -> f64 {
    t_ns as f64 * 1e-9
}

/// Per-track estimator for a single robot id.
///
/// Several filters may exist for one id when vision reports conflicting
/// detections; the tracker picks the mature one. All state is kept in the
/// unflipped field frame, the flip is applied when reading the track out.
#[derive(Clone, Debug)]
pub struct RobotFilter {
    id: u32,
    frame_counter: u32,
    init_time_ns: i64,
    last_update_ns: i64,
    filter: ConstantVelocityFilter,
    yaw: AngleLowPassFilter,
    /// Buffered radio commands (velocity, time), ordered by time.
    radio_commands: VecDeque<(Vector2, i64)>,
    kick_is_chip: bool,
    kick_is_linear: bool,
    shoot_radius: f64,
}

impl RobotFilter {
    pub fn new(detection: &RobotDetection, t_ns: i64, settings: &TrackerSettings) -> Self {
        let pos = from_vision(detection.x, detection.y, false);
        let mut yaw = AngleLowPassFilter::new(settings.robot_yaw_lpf_alpha);
        yaw.update(detection.orientation + FRAC_PI_2, secs(t_ns));
        Self {
            id: detection.robot_id,
            frame_counter: 0,
            init_time_ns: t_ns,
            last_update_ns: t_ns,
            filter: ConstantVelocityFilter::new(
                pos,
                secs(t_ns),
                settings.robot_transition_var,
                settings.robot_measurement_var,
            ),
            yaw,
            radio_commands: VecDeque::new(),
            kick_is_chip: false,
            kick_is_linear: false,
            shoot_radius: settings.shoot_radius,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    pub fn last_update(&self) -> i64 {
        self.last_update_ns
    }

    pub fn init_time(&self) -> i64 {
        self.init_time_ns
    }

    /// Advances the estimator to `t_ns`, consuming buffered radio commands
    /// up to that time. Idempotent when the filter is already at `t_ns`.
    pub fn update(&mut self, t_ns: i64) {
        while let Some(&(velocity, cmd_time)) = self.radio_commands.front() {
            if cmd_time > t_ns {
                break;
            }
            self.radio_commands.pop_front();
            self.filter.predict_to(secs(cmd_time));
            self.filter.set_velocity(velocity);
        }
        self.filter.predict_to(secs(t_ns));
    }

    /// Corrects the estimate with a vision detection from `camera_id`.
    pub fn add_vision_frame(&mut self, _camera_id: u32, detection: &RobotDetection, t_ns: i64) {
        let pos = from_vision(detection.x, detection.y, false);
        self.filter.update(pos, secs(t_ns));
        self.yaw.update(detection.orientation + FRAC_PI_2, secs(t_ns));
        self.frame_counter += 1;
        self.last_update_ns = t_ns;
    }

    /// Buffers a radio command for the prediction step.
    pub fn add_radio_command(&mut self, command: &RadioCommand, time_ns: i64) {
        if let Some(chip) = command.kick_is_chip {
            self.kick_is_chip = chip;
        }
        if let Some(linear) = command.kick_is_linear {
            self.kick_is_linear = linear;
        }
        self.radio_commands.push_back((command.velocity, time_ns));
    }

    /// Distance from the predicted position to a (converted) detection.
    pub fn distance_to(&self, detection: &RobotDetection) -> f64 {
        let pos = from_vision(detection.x, detection.y, false);
        (self.filter.position() - pos).norm()
    }

    pub fn robot_pos(&self) -> Vector2 {
        self.filter.position()
    }

    pub fn velocity(&self) -> Vector2 {
        self.filter.velocity()
    }

    /// Center of the dribbler face, on the front of the robot hull.
    pub fn dribbler_pos(&self) -> Vector2 {
        let dir = Vector2::new(self.yaw.angle().cos(), self.yaw.angle().sin());
        self.filter.position() + dir * self.shoot_radius
    }

    pub fn kick_is_chip(&self) -> bool {
        self.kick_is_chip
    }

    pub fn kick_is_linear(&self) -> bool {
        self.kick_is_linear
    }

    pub fn get(&self, flip: bool) -> RobotFrame {
        let sign = if flip { -1.0 } else { 1.0 };
        let yaw = if flip {
            self.yaw.angle() + PI
        } else {
            self.yaw.angle()
        };
        RobotFrame {
            id: self.id,
            position: self.filter.position() * sign,
            velocity: self.filter.velocity() * sign,
            yaw: Angle::from_radians(yaw),
            angular_speed: self.yaw.angular_speed(),
            kick_is_chip: self.kick_is_chip,
            kick_is_linear: self.kick_is_linear,
        }
    }
}
