use kestrel_core::{
    intersect_line_line, intersect_segment_circle, perp, BallFrame, TrackerSettings, Vector2,
    Vector3,
};

use crate::filter::ConstantVelocityFilter;

const BALL_RADIUS: f64 = 0.0215;
/// Invisibility time after which the stored dribbling offset takes over, ms.
const ACTIVATE_DRIBBLING_TIME_MS: i64 = 80;
/// Invisibility time after which the reported speed comes from context, ms.
const RESET_SPEED_TIME_MS: i64 = 150;

fn secs(t_ns: i64) -> f64 {
    t_ns as f64 * 1e-9
}

/// Snapshot of a tracked robot used for ball-robot interaction.
#[derive(Clone, Copy, Debug)]
pub struct RobotInfo {
    /// Unique identifier combining team and robot id.
    pub identifier: u32,
    pub robot_pos: Vector2,
    pub dribbler_pos: Vector2,
    pub speed: Vector2,
    pub kick_is_chip: bool,
    pub kick_is_linear: bool,
}

/// A single ball detection routed to the ball filters, in unflipped field
/// coordinates. Carries the robot whose dribbler is closest to the
/// detection.
#[derive(Clone, Copy, Debug)]
pub struct BallVisionFrame {
    pub pos: Vector2,
    pub time_ns: i64,
    pub camera_id: u32,
    pub nearest_robot: Option<RobotInfo>,
}

/// Ball offset relative to a robot, remembered while the ball is pushed or
/// dribbled.
#[derive(Clone, Copy, Debug)]
struct BallOffsetInfo {
    robot_identifier: u32,
    /// Offset in the robot-local frame (x towards the dribbler).
    ball_offset: Vector2,
    pushing_ball_pos: Vector2,
}

/// Tracks one ball candidate and reasons about contact with robots.
///
/// Two internal estimators run side by side: `ground` holds the current
/// estimate, `past` lags one detection behind. The lagging copy is what the
/// collision rules compare against, so a ball that just vanished inside a
/// robot hull is judged from its last free position.
#[derive(Clone, Debug)]
pub struct BallTracker {
    primary_camera: u32,
    init_time_ns: i64,
    last_update_ns: i64,
    last_vision_time_ns: i64,
    frame_counter: u32,
    ground: ConstantVelocityFilter,
    past: ConstantVelocityFilter,
    /// Detection not yet absorbed by the lagging filter.
    pending_past: Option<(Vector2, f64)>,
    local_ball_offset: Option<BallOffsetInfo>,
    inside_robot_offset: Option<BallOffsetInfo>,
    last_reported_pos: Vector2,
    last_detection_pos: Vector2,
    reset_pending: bool,
    settings: TrackerSettings,
}

impl BallTracker {
    pub fn new(frame: &BallVisionFrame, settings: &TrackerSettings) -> Self {
        let t = secs(frame.time_ns);
        Self {
            primary_camera: frame.camera_id,
            init_time_ns: frame.time_ns,
            last_update_ns: frame.time_ns,
            last_vision_time_ns: frame.time_ns,
            frame_counter: 0,
            ground: ConstantVelocityFilter::new(
                frame.pos,
                t,
                settings.ball_transition_var,
                settings.ball_measurement_var,
            ),
            past: ConstantVelocityFilter::new(
                frame.pos,
                t,
                settings.ball_transition_var,
                settings.ball_measurement_var,
            ),
            pending_past: None,
            local_ball_offset: None,
            inside_robot_offset: None,
            last_reported_pos: frame.pos,
            last_detection_pos: frame.pos,
            reset_pending: false,
            settings: *settings,
        }
    }

    /// Clones the tracker for a camera handover, keeping all estimator state.
    pub fn clone_for_camera(&self, camera_id: u32) -> Self {
        let mut clone = self.clone();
        clone.primary_camera = camera_id;
        clone
    }

    pub fn primary_camera(&self) -> u32 {
        self.primary_camera
    }

    pub fn init_time(&self) -> i64 {
        self.init_time_ns
    }

    pub fn last_update(&self) -> i64 {
        self.last_update_ns
    }

    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// 2-D distance from this tracker's camera to its last detection. Used
    /// for prioritizing filters after a detection was consumed.
    pub fn dist_to_camera(&self, camera_pos: Option<Vector3>) -> f64 {
        match camera_pos {
            Some(cam) => (cam.xy() - self.last_detection_pos).norm(),
            None => f64::MAX,
        }
    }

    /// Advances the estimators to `t_ns`.
    pub fn update(&mut self, t_ns: i64) {
        self.ground.predict_to(secs(t_ns));
    }

    /// Whether this tracker claims the detection.
    pub fn accept_detection(&self, frame: &BallVisionFrame) -> bool {
        let reported_dist = (self.last_reported_pos - frame.pos).norm();
        let predicted = self.ground.predicted_position(secs(frame.time_ns));
        reported_dist < self.settings.ball_accept_dist
            || (predicted - frame.pos).norm() < self.settings.ball_accept_dist
    }

    /// Feeds a detection into both estimators. The lagging estimator only
    /// sees the previous detection.
    pub fn process_vision_frame(&mut self, frame: &BallVisionFrame) {
        let t = secs(frame.time_ns);
        if self.reset_pending {
            self.ground.reset(frame.pos, t);
            self.past.reset(frame.pos, t);
            self.pending_past = None;
            self.reset_pending = false;
        } else {
            self.ground.update(frame.pos, t);
            if let Some((pos, pt)) = self.pending_past.take() {
                self.past.update(pos, pt);
            }
            self.pending_past = Some((frame.pos, t));
        }
        self.frame_counter += 1;
        self.last_update_ns = frame.time_ns;
        self.last_vision_time_ns = frame.time_ns;
        self.last_detection_pos = frame.pos;
    }

    /// Produces the reported ball state at `t_ns`.
    ///
    /// The collision and dribbling rules only run when enabled in the
    /// settings; otherwise the ground estimate passes through unchanged.
    pub fn write_ball_state(
        &mut self,
        t_ns: i64,
        robots: &[RobotInfo],
        camera_pos: Option<Vector3>,
    ) -> BallFrame {
        let frame = self.compute_ball_state(t_ns, robots, camera_pos);
        self.last_reported_pos = frame.position;
        frame
    }

    fn compute_ball_state(
        &mut self,
        t_ns: i64,
        robots: &[RobotInfo],
        camera_pos: Option<Vector3>,
    ) -> BallFrame {
        let invisible_ms = (t_ns - self.last_vision_time_ns) / 1_000_000;
        let mut frame = BallFrame {
            position: self.ground.predicted_position(secs(t_ns)),
            speed: self.ground.velocity(),
            is_visible: invisible_ms <= ACTIVATE_DRIBBLING_TIME_MS,
        };

        if !self.settings.ball_collision_handling {
            return frame;
        }

        // speed is only replaced from context once the estimate is stale
        let write_speed = invisible_ms > RESET_SPEED_TIME_MS;

        if invisible_ms > ACTIVATE_DRIBBLING_TIME_MS {
            if let Some(mut offset) = self.local_ball_offset {
                if let Some(robot) = robots
                    .iter()
                    .find(|r| r.identifier == offset.robot_identifier)
                {
                    let ball_pos = unproject_relative_position(offset.ball_offset, robot);
                    if is_inside_robot(offset.pushing_ball_pos, robot, &self.settings) {
                        offset.pushing_ball_pos = ball_pos;
                        self.local_ball_offset = Some(offset);
                    }
                    let pushing_visible = is_ball_visible(
                        offset.pushing_ball_pos,
                        robot,
                        camera_pos,
                        &self.settings,
                    );
                    if pushing_visible {
                        frame.position = ball_pos;
                        if write_speed {
                            frame.speed = robot.speed;
                        }
                    } else {
                        frame.position = offset.pushing_ball_pos;
                        if write_speed {
                            frame.speed = Vector2::zeros();
                        }
                    }
                    self.reset_pending = true;
                    return frame;
                }
            }
        } else {
            self.local_ball_offset = None;
        }

        let past_pos = self
            .past
            .predicted_position(secs(self.last_vision_time_ns));
        let past_speed = self.past.velocity();
        let mut current_pos = frame.position;

        for robot in robots {
            if is_inside_robot(past_pos, robot, &self.settings) {
                if let Some(inside) = self.inside_robot_offset {
                    if inside.robot_identifier == robot.identifier {
                        let ball_pos = unproject_relative_position(inside.ball_offset, robot);
                        frame.position = ball_pos;
                        if write_speed {
                            frame.speed = robot.speed;
                        }
                        self.local_ball_offset = Some(inside);
                        return frame;
                    }
                }

                let relative_speed = past_speed - robot.speed;
                let project_dir = if relative_speed.norm() < 1e-3 {
                    past_pos - robot.robot_pos
                } else {
                    -relative_speed
                };
                let dir = match project_dir.try_normalize(f64::EPSILON) {
                    Some(d) => d,
                    None => continue,
                };
                let close = intersect_segment_robot(
                    past_pos,
                    past_pos + dir * 1000.0,
                    robot,
                    &self.settings,
                    1.0,
                );
                let far = intersect_segment_robot(
                    past_pos,
                    past_pos - dir * 1000.0,
                    robot,
                    &self.settings,
                    1.0,
                );
                if let (Some(close), Some(far)) = (close, far) {
                    let close_dist = (close - past_pos).norm();
                    let far_dist = (far - past_pos).norm();
                    let projected = if close_dist < far_dist * 2.0 { close } else { far };
                    frame.position = projected;
                    if write_speed {
                        frame.speed = robot.speed;
                    }
                    self.update_dribbling_info(projected, robot);
                    self.inside_robot_offset = self.local_ball_offset;
                    return frame;
                }
            }

            if let Some(intersection) =
                intersect_segment_robot(past_pos, current_pos, robot, &self.settings, 1.0)
            {
                current_pos = intersection;
                frame.position = intersection;
                if write_speed {
                    frame.speed = robot.speed;
                }
                self.update_dribbling_info(intersection, robot);
            }
        }

        self.inside_robot_offset = None;
        frame
    }

    fn update_dribbling_info(&mut self, projected_ball_pos: Vector2, robot: &RobotInfo) {
        let to_dribbler = match (robot.dribbler_pos - robot.robot_pos).try_normalize(f64::EPSILON)
        {
            Some(d) => d,
            None => return,
        };
        self.local_ball_offset = Some(BallOffsetInfo {
            robot_identifier: robot.identifier,
            ball_offset: Vector2::new(
                (projected_ball_pos - robot.robot_pos).dot(&to_dribbler),
                (projected_ball_pos - robot.robot_pos).dot(&perp(to_dribbler)),
            ),
            pushing_ball_pos: projected_ball_pos,
        });
    }
}

fn unproject_relative_position(relative_pos: Vector2, robot: &RobotInfo) -> Vector2 {
    let to_dribbler = (robot.dribbler_pos - robot.robot_pos)
        .try_normalize(f64::EPSILON)
        .unwrap_or(Vector2::new(1.0, 0.0));
    robot.robot_pos + relative_pos.x * to_dribbler + relative_pos.y * perp(to_dribbler)
}

fn is_inside_robot(pos: Vector2, robot: &RobotInfo, settings: &TrackerSettings) -> bool {
    if (pos - robot.robot_pos).norm() > settings.robot_radius {
        return false;
    }
    let to_dribbler = (robot.dribbler_pos - robot.robot_pos)
        .try_normalize(f64::EPSILON)
        .unwrap_or(Vector2::new(1.0, 0.0));
    (pos - robot.dribbler_pos).dot(&to_dribbler) <= 0.0
}

/// Intersects the segment p1 -> p2 with the robot hull: the body disc
/// clipped by the dribbler face. Returns the intersection closest to p1.
fn intersect_segment_robot(
    p1: Vector2,
    p2: Vector2,
    robot: &RobotInfo,
    settings: &TrackerSettings,
    robot_size_factor: f64,
) -> Option<Vector2> {
    let mut robot_radius = settings.robot_radius;
    let mut dribbler_pos = robot.dribbler_pos;
    if robot_size_factor != 1.0 {
        robot_radius *= robot_size_factor;
        dribbler_pos = robot.robot_pos + (robot.dribbler_pos - robot.robot_pos) * robot_size_factor;
    }

    let to_dribbler = (dribbler_pos - robot.robot_pos).try_normalize(f64::EPSILON)?;
    let dribbler_sideways = perp(to_dribbler);

    let mut dribbler_intersection_pos = None;
    if let Some((t1, t2)) =
        intersect_line_line(dribbler_pos, dribbler_sideways, p1, p2 - p1)
    {
        if t1.abs() <= settings.dribbler_width / 2.0 && (0.0..=1.0).contains(&t2) {
            let pos = dribbler_pos + dribbler_sideways * t1;
            if (p1 - dribbler_pos).dot(&to_dribbler) >= 0.0 {
                // the segment comes from in front of the robot, the face
                // intersection is the right one
                return Some(pos);
            }
            dribbler_intersection_pos = Some(pos);
        }
    }

    let hull_intersection = intersect_segment_circle(p1, p2, robot.robot_pos, robot_radius);
    match (dribbler_intersection_pos, hull_intersection) {
        (Some(dribbler), Some(hull)) => {
            if (hull - p1).norm() < (dribbler - p1).norm() {
                Some(hull)
            } else {
                Some(dribbler)
            }
        }
        (dribbler, hull) => hull.or(dribbler),
    }
}

/// Whether a ball at `pos` can be seen by the camera, i.e. is not shadowed
/// by the robot body. The ball position is projected to the robot height
/// along the camera ray and tested against the hull.
fn is_ball_visible(
    pos: Vector2,
    robot: &RobotInfo,
    camera_pos: Option<Vector3>,
    settings: &TrackerSettings,
) -> bool {
    let cam = match camera_pos {
        Some(cam) => cam,
        // without calibration there is no occlusion information
        None => return true,
    };
    let to_ball = Vector3::new(pos.x, pos.y, BALL_RADIUS) - cam;
    let length = (cam.z - settings.robot_height) / (cam.z - BALL_RADIUS);
    let projected = cam + to_ball * length;
    let projected2d = projected.xy();

    let in_radius = (robot.robot_pos - projected2d).norm() <= settings.robot_radius;
    let front_of_dribbler =
        (projected2d - robot.dribbler_pos).dot(&(robot.dribbler_pos - robot.robot_pos)) > 0.0;
    let has_intersection =
        intersect_segment_robot(pos, projected2d, robot, settings, 0.98).is_some();
    (!in_radius || front_of_dribbler) && !has_intersection
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn settings() -> TrackerSettings {
        TrackerSettings::default()
    }

    fn robot_at(pos: Vector2, heading: Vector2) -> RobotInfo {
        let settings = settings();
        RobotInfo {
            identifier: 3,
            robot_pos: pos,
            dribbler_pos: pos + heading.normalize() * settings.shoot_radius,
            speed: Vector2::zeros(),
            kick_is_chip: false,
            kick_is_linear: false,
        }
    }

    fn frame(pos: Vector2, time_ns: i64, camera_id: u32) -> BallVisionFrame {
        BallVisionFrame {
            pos,
            time_ns,
            camera_id,
            nearest_robot: None,
        }
    }

    #[test]
    fn test_accept_detection_near_last_report() {
        let mut tracker = BallTracker::new(&frame(Vector2::zeros(), 0, 0), &settings());
        tracker.process_vision_frame(&frame(Vector2::zeros(), 0, 0));
        assert!(tracker.accept_detection(&frame(Vector2::new(0.3, 0.0), 16_000_000, 0)));
        assert!(!tracker.accept_detection(&frame(Vector2::new(3.0, 0.0), 16_000_000, 0)));
    }

    #[test]
    fn test_pass_through_without_collision_handling() {
        let mut tracker = BallTracker::new(&frame(Vector2::zeros(), 0, 0), &settings());
        for k in 1i64..=10 {
            let t = k * 16_000_000;
            tracker.update(t);
            tracker.process_vision_frame(&frame(
                Vector2::new(0.016 * k as f64, 0.0),
                t,
                0,
            ));
        }
        // a robot sitting right on the ball must not disturb the estimate
        let robot = robot_at(Vector2::new(0.16, 0.0), Vector2::new(1.0, 0.0));
        let state = tracker.write_ball_state(160_000_000, &[robot], None);
        assert_relative_eq!(state.position.x, 0.16, epsilon = 0.02);
        assert!(state.is_visible);
    }

    #[test]
    fn test_is_inside_robot_respects_dribbler_plane() {
        let s = settings();
        let robot = robot_at(Vector2::zeros(), Vector2::new(1.0, 0.0));
        assert!(is_inside_robot(Vector2::new(0.02, 0.0), &robot, &s));
        // in front of the dribbler face
        assert!(!is_inside_robot(Vector2::new(0.08, 0.0), &robot, &s));
        // outside the hull
        assert!(!is_inside_robot(Vector2::new(0.0, 0.2), &robot, &s));
    }

    #[test]
    fn test_segment_robot_intersection() {
        let s = settings();
        let robot = robot_at(Vector2::zeros(), Vector2::new(1.0, 0.0));
        // segment passing through the robot from behind
        let hit = intersect_segment_robot(
            Vector2::new(-1.0, 0.0),
            Vector2::new(1.0, 0.0),
            &robot,
            &s,
            1.0,
        )
        .unwrap();
        assert_relative_eq!(hit.x, -s.robot_radius, epsilon = 1e-6);

        // segment coming from the front hits the dribbler face
        let hit = intersect_segment_robot(
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 0.0),
            &robot,
            &s,
            1.0,
        )
        .unwrap();
        assert_relative_eq!(hit.x, s.shoot_radius, epsilon = 1e-6);

        let miss = intersect_segment_robot(
            Vector2::new(-1.0, 0.5),
            Vector2::new(1.0, 0.5),
            &robot,
            &s,
            1.0,
        );
        assert!(miss.is_none());
    }

    #[test]
    fn test_ball_shadowed_by_robot_body() {
        let s = settings();
        // camera straight up at 4 m over the origin area
        let cam = Some(Vector3::new(0.0, 0.0, 4.0));
        let robot = robot_at(Vector2::new(1.0, 0.0), Vector2::new(-1.0, 0.0));
        // ball tucked behind the robot, under the hull from the camera's view
        let hidden = Vector2::new(1.04, 0.0);
        assert!(!is_ball_visible(hidden, &robot, cam, &s));
        // ball well clear of the robot
        let open = Vector2::new(2.0, 2.0);
        assert!(is_ball_visible(open, &robot, cam, &s));
    }

    #[test]
    fn test_collision_rule_projects_out_of_robot() {
        let mut s = settings();
        s.ball_collision_handling = true;
        // ball rolling towards a robot and vanishing inside it
        let mut tracker = BallTracker::new(&frame(Vector2::new(-0.4, 0.0), 0, 0), &s);
        for k in 1i64..=10 {
            let t = k * 16_000_000;
            tracker.update(t);
            let x = -0.4 + 0.04 * k as f64;
            tracker.process_vision_frame(&frame(Vector2::new(x, 0.0), t, 0));
        }
        let robot = robot_at(Vector2::new(0.02, 0.0), Vector2::new(-1.0, 0.0));
        let state = tracker.write_ball_state(176_000_000, &[robot], None);
        // the reported position must sit on the hull or the dribbler face,
        // not deeper inside the robot
        let dist = (state.position - robot.robot_pos).norm();
        assert!(dist >= s.shoot_radius - 1e-6, "ball reported inside robot");
    }

    #[test]
    fn test_handover_clone_keeps_state() {
        let mut tracker = BallTracker::new(&frame(Vector2::new(0.5, 0.5), 0, 0), &settings());
        tracker.process_vision_frame(&frame(Vector2::new(0.5, 0.5), 0, 0));
        let clone = tracker.clone_for_camera(1);
        assert_eq!(clone.primary_camera(), 1);
        assert_eq!(clone.init_time(), tracker.init_time());
        assert_eq!(clone.frame_counter(), tracker.frame_counter());
    }
}
