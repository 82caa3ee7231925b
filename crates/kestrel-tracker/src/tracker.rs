use kestrel_core::{
    from_vision, Aoi, BallDetection, FieldGeometry, RadioCommand, RobotDetection, TrackerSettings,
    TrackingCommand, VecMap, Vector2, VisionPacket, WorldFrame,
};
use tracing::debug;

use crate::ball_filter::{BallTracker, BallVisionFrame, RobotInfo};
use crate::camera::CameraRegistry;
use crate::robot_filter::RobotFilter;

/// Team color of a tracked robot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Team {
    Yellow,
    Blue,
}

/// Identifier bit distinguishing blue robots in [`RobotInfo`].
const BLUE_ID_BIT: u32 = 1 << 8;

type RobotMap = VecMap<u32, Vec<RobotFilter>>;

/// The fusion supervisor.
///
/// Owns all filter storage, routes queued vision packets and radio feedback
/// to the per-object filters and produces [`WorldFrame`] snapshots. All
/// mutation happens in [`Tracker::process`]; snapshots observe only state of
/// the most recent completed tick.
pub struct Tracker {
    settings: TrackerSettings,
    cameras: CameraRegistry,
    flip: bool,
    system_delay_ns: i64,
    reset_time_ns: i64,
    last_update_time_ns: i64,
    has_vision_data: bool,
    geometry: Option<FieldGeometry>,
    geometry_updated: bool,
    aoi_enabled: bool,
    aoi: Option<Aoi>,
    vision_packets: Vec<(VisionPacket, i64)>,
    robots_yellow: RobotMap,
    robots_blue: RobotMap,
    ball_filters: Vec<BallTracker>,
}

impl Tracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            cameras: CameraRegistry::new(),
            flip: false,
            system_delay_ns: 0,
            reset_time_ns: 0,
            last_update_time_ns: 0,
            has_vision_data: false,
            geometry: None,
            geometry_updated: false,
            aoi_enabled: false,
            aoi: None,
            vision_packets: Vec::new(),
            robots_yellow: RobotMap::new(),
            robots_blue: RobotMap::new(),
            ball_filters: Vec::new(),
        }
    }

    /// Changes which goal the team defends.
    pub fn set_flip(&mut self, flip: bool) {
        self.flip = flip;
    }

    /// Queues a decoded vision packet for the next tick.
    pub fn queue_packet(&mut self, packet: VisionPacket, arrival_time_ns: i64) {
        self.vision_packets.push((packet, arrival_time_ns));
        self.has_vision_data = true;
    }

    /// Forwards radio commands to every candidate filter of the addressed
    /// robot. Commands without a team are dropped.
    pub fn queue_radio(&mut self, commands: &[RadioCommand], time_ns: i64) {
        for command in commands {
            let map = match command.is_blue {
                Some(true) => &mut self.robots_blue,
                Some(false) => &mut self.robots_yellow,
                None => continue,
            };
            if let Some(list) = map.get_mut(&command.id) {
                for filter in list.iter_mut() {
                    filter.add_radio_command(command, time_ns);
                }
            }
        }
    }

    pub fn handle_command(&mut self, command: &TrackingCommand) {
        if let Some(enabled) = command.aoi_enabled {
            self.aoi_enabled = enabled;
        }
        if let Some(aoi) = command.aoi {
            self.aoi = Some(aoi);
        }
        if let Some(delay) = command.system_delay_ns {
            self.system_delay_ns = delay;
        }
        if command.reset {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.robots_yellow.clear();
        self.robots_blue.clear();
        self.ball_filters.clear();
        self.vision_packets.clear();
        self.has_vision_data = false;
        self.reset_time_ns = 0;
        self.last_update_time_ns = 0;
    }

    /// Runs one fusion tick: invalidates stale filters, then replays all
    /// queued packets in arrival order.
    pub fn process(&mut self, now_ns: i64) {
        // reset time is used to quickly repopulate after a reset
        if self.reset_time_ns == 0 {
            self.reset_time_ns = now_ns;
        }

        self.invalidate_ball(now_ns);
        self.invalidate_robots(now_ns);

        self.geometry_updated = false;

        let packets = std::mem::take(&mut self.vision_packets);
        for (packet, arrival_time) in &packets {
            if let Some(geometry) = &packet.geometry {
                self.geometry = Some(FieldGeometry::from_raw(&geometry.field));
                for calib in &geometry.calibrations {
                    self.cameras.update(calib);
                }
                self.geometry_updated = true;
            }

            let detection = match &packet.detection {
                Some(detection) => detection,
                None => continue,
            };

            let vision_processing_ns = ((detection.t_sent - detection.t_capture) * 1e9) as i64;
            let source_time = arrival_time - vision_processing_ns - self.system_delay_ns;

            // frames older than the current state are dropped
            if source_time <= self.last_update_time_ns {
                debug!(
                    camera = detection.camera_id,
                    "dropping out-of-order vision frame"
                );
                continue;
            }

            for robot in &detection.robots_yellow {
                self.track_robot(Team::Yellow, robot, source_time, detection.camera_id);
            }
            for robot in &detection.robots_blue {
                self.track_robot(Team::Blue, robot, source_time, detection.camera_id);
            }

            let best_robots = self.best_robot_infos(source_time);
            for ball in &detection.balls {
                self.track_ball(ball, source_time, detection.camera_id, &best_robots);
            }

            self.last_update_time_ns = source_time;
        }
    }

    /// Produces a snapshot of the world state at `now_ns`.
    pub fn world_state(&mut self, now_ns: i64) -> WorldFrame {
        let min_fc_robot = self.min_frame_count(now_ns, self.settings.robot_reset_timeout_ns);
        let min_fc_ball = self.min_frame_count(now_ns, self.settings.ball_reset_timeout_ns);
        let flip = self.flip;

        let mut frame = WorldFrame {
            time_ns: now_ns,
            has_vision_data: self.has_vision_data,
            ..Default::default()
        };

        let mut robot_infos = Vec::new();
        for (team, is_blue) in [(Team::Yellow, false), (Team::Blue, true)] {
            let map = match team {
                Team::Yellow => &mut self.robots_yellow,
                Team::Blue => &mut self.robots_blue,
            };
            let out = match team {
                Team::Yellow => &mut frame.yellow,
                Team::Blue => &mut frame.blue,
            };
            for (_, list) in map.iter_mut() {
                if let Some(filter) = best_filter(list, min_fc_robot) {
                    filter.update(now_ns);
                    out.push(filter.get(flip));
                    robot_infos.push(robot_info(filter, is_blue));
                }
            }
        }

        if let Some(idx) = self.best_ball_index(min_fc_ball) {
            let camera_pos = self
                .cameras
                .position(self.ball_filters[idx].primary_camera());
            let ball = &mut self.ball_filters[idx];
            ball.update(now_ns);
            frame.ball = Some(ball.write_ball_state(now_ns, &robot_infos, camera_pos));
        }

        if self.geometry_updated {
            frame.geometry = self.geometry;
        }
        if self.aoi_enabled {
            frame.aoi = self.aoi;
        }
        frame
    }

    fn min_frame_count(&self, now_ns: i64, reset_timeout_ns: i64) -> u32 {
        if now_ns > self.reset_time_ns + reset_timeout_ns {
            self.settings.min_frame_count
        } else {
            0
        }
    }

    /// The active ball filter: the mature one with the oldest init time, so
    /// camera-handover clones inherit primacy immediately. Falls back to the
    /// oldest filter overall when none is mature.
    fn best_ball_index(&self, min_frame_count: u32) -> Option<usize> {
        let oldest = |indices: &mut dyn Iterator<Item = usize>| -> Option<usize> {
            indices.min_by_key(|&i| (self.ball_filters[i].init_time(), i))
        };
        let mut mature = (0..self.ball_filters.len())
            .filter(|&i| self.ball_filters[i].frame_counter() >= min_frame_count);
        oldest(&mut mature).or_else(|| oldest(&mut (0..self.ball_filters.len())))
    }

    fn invalidate_ball(&mut self, now_ns: i64) {
        let max_time = self.settings.ball_max_time_ns;
        let max_time_last = self.settings.ball_max_time_last_ns;
        let min_frame_count = self.settings.min_frame_count;
        let filters = &mut self.ball_filters;
        let mut i = 0;
        while i < filters.len() {
            let limit = if filters.len() > 1 || filters[i].frame_counter() < min_frame_count {
                max_time
            } else {
                max_time_last
            };
            if filters[i].last_update() + limit < now_ns {
                filters.remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn invalidate_robots(&mut self, now_ns: i64) {
        let max_time = self.settings.robot_max_time_ns;
        let max_time_last = self.settings.robot_max_time_last_ns;
        let min_frame_count = self.settings.min_frame_count;
        for map in [&mut self.robots_yellow, &mut self.robots_blue] {
            for (_, filters) in map.iter_mut() {
                let mut i = 0;
                while i < filters.len() {
                    let limit =
                        if filters.len() > 1 || filters[i].frame_counter() < min_frame_count {
                            max_time
                        } else {
                            max_time_last
                        };
                    if filters[i].last_update() + limit < now_ns {
                        filters.remove(i);
                    } else {
                        i += 1;
                    }
                }
            }
        }
    }

    fn in_aoi(&self, x_mm: f64, y_mm: f64) -> bool {
        if !self.aoi_enabled {
            return true;
        }
        match self.aoi {
            Some(aoi) => {
                let p = from_vision(x_mm, y_mm, self.flip);
                aoi.contains(p.x, p.y)
            }
            None => true,
        }
    }

    fn track_robot(
        &mut self,
        team: Team,
        detection: &RobotDetection,
        source_time: i64,
        camera_id: u32,
    ) {
        if !self.in_aoi(detection.x, detection.y) {
            return;
        }

        // nearest-track association with a hard gate; detections matching no
        // track start a new filter
        let settings = self.settings;
        let map = match team {
            Team::Yellow => &mut self.robots_yellow,
            Team::Blue => &mut self.robots_blue,
        };
        let list = map.get_or_insert_with(detection.robot_id, Vec::new);

        let mut nearest_dist = settings.association_gate;
        let mut nearest = None;
        for (i, filter) in list.iter_mut().enumerate() {
            filter.update(source_time);
            let dist = filter.distance_to(detection);
            if dist < nearest_dist {
                nearest_dist = dist;
                nearest = Some(i);
            }
        }

        let idx = match nearest {
            Some(i) => i,
            None => {
                list.push(RobotFilter::new(detection, source_time, &settings));
                list.len() - 1
            }
        };
        list[idx].add_vision_frame(camera_id, detection, source_time);
    }

    /// Best robots of both teams, used by the ball filters for collision
    /// reasoning.
    fn best_robot_infos(&mut self, now_ns: i64) -> Vec<RobotInfo> {
        let min_fc = self.min_frame_count(now_ns, self.settings.robot_reset_timeout_ns);
        let mut infos = Vec::new();
        for (map, is_blue) in [
            (&mut self.robots_yellow, false),
            (&mut self.robots_blue, true),
        ] {
            for (_, list) in map.iter_mut() {
                if let Some(filter) = best_filter(list, min_fc) {
                    filter.update(now_ns);
                    infos.push(robot_info(filter, is_blue));
                }
            }
        }
        infos
    }

    fn track_ball(
        &mut self,
        ball: &BallDetection,
        source_time: i64,
        camera_id: u32,
        best_robots: &[RobotInfo],
    ) {
        if !self.in_aoi(ball.x, ball.y) {
            return;
        }
        if !self.cameras.has(camera_id) {
            debug!(camera = camera_id, "ball detection without calibration");
            return;
        }

        let pos = from_vision(ball.x, ball.y, false);
        let frame = BallVisionFrame {
            pos,
            time_ns: source_time,
            camera_id,
            nearest_robot: nearest_robot_info(best_robots, pos),
        };

        let mut accepters_same_camera = Vec::new();
        let mut accepters_other_camera = Vec::new();
        for (i, filter) in self.ball_filters.iter_mut().enumerate() {
            filter.update(source_time);
            if filter.accept_detection(&frame) {
                if filter.primary_camera() == camera_id {
                    accepters_same_camera.push(i);
                } else {
                    accepters_other_camera.push(i);
                }
            }
        }

        for &i in &accepters_same_camera {
            self.ball_filters[i].process_vision_frame(&frame);
        }

        if accepters_same_camera.is_empty() {
            // camera handover: clone the oldest accepting filter from
            // another camera, or start fresh
            let source = accepters_other_camera
                .into_iter()
                .min_by_key(|&i| (self.ball_filters[i].init_time(), i));
            let mut tracker = match source {
                Some(i) => self.ball_filters[i].clone_for_camera(camera_id),
                None => BallTracker::new(&frame, &self.settings),
            };
            tracker.process_vision_frame(&frame);
            self.ball_filters.push(tracker);
        } else {
            self.prioritize_ball_filters();
        }
    }

    /// Sorts ball filters so the one whose camera is closest to its last
    /// detection comes first.
    fn prioritize_ball_filters(&mut self) {
        let cameras = &self.cameras;
        self.ball_filters.sort_by(|a, b| {
            let da = a.dist_to_camera(cameras.position(a.primary_camera()));
            let db = b.dist_to_camera(cameras.position(b.primary_camera()));
            da.total_cmp(&db)
        });
    }
}

/// The robot whose dribbler is closest to a ball detection.
fn nearest_robot_info(robots: &[RobotInfo], ball_pos: Vector2) -> Option<RobotInfo> {
    robots
        .iter()
        .min_by(|a, b| {
            let da = (ball_pos - a.dribbler_pos).norm();
            let db = (ball_pos - b.dribbler_pos).norm();
            da.total_cmp(&db)
        })
        .copied()
}

fn robot_info(filter: &RobotFilter, is_blue: bool) -> RobotInfo {
    RobotInfo {
        identifier: filter.id() | if is_blue { BLUE_ID_BIT } else { 0 },
        robot_pos: filter.robot_pos(),
        dribbler_pos: filter.dribbler_pos(),
        speed: filter.velocity(),
        kick_is_chip: filter.kick_is_chip(),
        kick_is_linear: filter.kick_is_linear(),
    }
}

/// First filter in the list that absorbed enough frames; it is moved to the
/// front so the choice is stable across ticks.
fn best_filter(list: &mut Vec<RobotFilter>, min_frame_count: u32) -> Option<&mut RobotFilter> {
    let idx = list
        .iter()
        .position(|f| f.frame_counter() >= min_frame_count)?;
    if idx != 0 {
        let filter = list.remove(idx);
        list.insert(0, filter);
    }
    Some(&mut list[0])
}

#[cfg(test)]
mod tests {
    use kestrel_core::{CameraCalibration, DetectionFrame, GeometryFrame, Vector2};

    use super::*;

    const MS: i64 = 1_000_000;

    fn calibration_packet(camera_ids: &[u32]) -> VisionPacket {
        VisionPacket {
            geometry: Some(GeometryFrame {
                field: Default::default(),
                calibrations: camera_ids
                    .iter()
                    .map(|&id| CameraCalibration {
                        camera_id: id,
                        derived_camera_world_tx_mm: Some(0.0),
                        derived_camera_world_ty_mm: Some(0.0),
                        derived_camera_world_tz_mm: Some(4000.0),
                        focal_length: 500.0,
                    })
                    .collect(),
            }),
            detection: None,
        }
    }

    fn detection_packet(camera_id: u32, t: f64) -> DetectionFrame {
        DetectionFrame {
            t_capture: t,
            t_sent: t,
            camera_id,
            ..Default::default()
        }
    }

    fn robot(id: u32, x: f64, y: f64) -> RobotDetection {
        RobotDetection {
            robot_id: id,
            x,
            y,
            orientation: 0.0,
        }
    }

    #[test]
    fn test_out_of_order_frames_dropped() {
        let mut tracker = Tracker::new(TrackerSettings::default());
        let mut d1 = detection_packet(0, 0.0);
        d1.robots_yellow.push(robot(1, 0.0, 0.0));
        let mut d2 = detection_packet(0, 0.0);
        d2.robots_yellow.push(robot(1, 100.0, 0.0));

        tracker.queue_packet(
            VisionPacket {
                detection: Some(d1),
                ..Default::default()
            },
            100 * MS,
        );
        // older arrival queued later must be ignored
        tracker.queue_packet(
            VisionPacket {
                detection: Some(d2),
                ..Default::default()
            },
            50 * MS,
        );
        tracker.process(200 * MS);

        let state = tracker.world_state(200 * MS);
        assert_eq!(state.yellow.len(), 1);
        // the surviving filter saw only the first detection
        assert!(state.yellow[0].position.y.abs() < 0.01);
    }

    #[test]
    fn test_aoi_excludes_detections() {
        let mut tracker = Tracker::new(TrackerSettings::default());
        tracker.handle_command(&TrackingCommand {
            aoi_enabled: Some(true),
            aoi: Some(Aoi {
                x1: 5.0,
                y1: 5.0,
                x2: 6.0,
                y2: 6.0,
            }),
            ..Default::default()
        });

        for k in 1i64..=10 {
            let mut d = detection_packet(0, 0.0);
            d.robots_blue.push(robot(2, 0.0, 0.0));
            tracker.queue_packet(
                VisionPacket {
                    detection: Some(d),
                    ..Default::default()
                },
                k * 16 * MS,
            );
        }
        tracker.process(200 * MS);

        let state = tracker.world_state(200 * MS);
        assert!(state.has_vision_data);
        assert!(state.blue.is_empty());
        assert!(state.ball.is_none());
        assert_eq!(
            state.aoi,
            Some(Aoi {
                x1: 5.0,
                y1: 5.0,
                x2: 6.0,
                y2: 6.0,
            })
        );
    }

    #[test]
    fn test_radio_without_team_dropped() {
        let mut tracker = Tracker::new(TrackerSettings::default());
        let mut d = detection_packet(0, 0.0);
        d.robots_yellow.push(robot(1, 0.0, 0.0));
        tracker.queue_packet(
            VisionPacket {
                detection: Some(d),
                ..Default::default()
            },
            16 * MS,
        );
        tracker.process(20 * MS);

        // must not panic or attach to any filter
        tracker.queue_radio(
            &[RadioCommand {
                is_blue: None,
                id: 1,
                velocity: Vector2::new(1.0, 0.0),
                kick_is_chip: None,
                kick_is_linear: None,
            }],
            20 * MS,
        );
        let state = tracker.world_state(100 * MS);
        assert_eq!(state.yellow.len(), 1);
    }

    #[test]
    fn test_ball_requires_calibration() {
        let mut tracker = Tracker::new(TrackerSettings::default());
        let mut d = detection_packet(3, 0.0);
        d.balls.push(BallDetection { x: 0.0, y: 0.0 });
        tracker.queue_packet(
            VisionPacket {
                detection: Some(d),
                ..Default::default()
            },
            16 * MS,
        );
        tracker.process(20 * MS);
        assert!(tracker.world_state(20 * MS).ball.is_none());
    }

    #[test]
    fn test_geometry_emitted_once() {
        let mut tracker = Tracker::new(TrackerSettings::default());
        tracker.queue_packet(calibration_packet(&[0]), 10 * MS);
        tracker.process(20 * MS);
        assert!(tracker.world_state(20 * MS).geometry.is_some());

        tracker.process(40 * MS);
        assert!(tracker.world_state(40 * MS).geometry.is_none());
    }

    #[test]
    fn test_stable_best_filter_selection() {
        let settings = TrackerSettings::default();
        let mut list = vec![
            RobotFilter::new(&robot(1, 0.0, 0.0), 0, &settings),
            RobotFilter::new(&robot(1, 1000.0, 0.0), 0, &settings),
        ];
        for k in 1i64..=6 {
            list[1].add_vision_frame(0, &robot(1, 1000.0, 0.0), k * 16 * MS);
        }
        // only the second filter is mature; it is chosen and moved to front
        let chosen = best_filter(&mut list, 5).unwrap().robot_pos();
        let again = best_filter(&mut list, 5).unwrap().robot_pos();
        assert_eq!(chosen, again);
        assert_eq!(list[0].robot_pos(), chosen);
    }
}
