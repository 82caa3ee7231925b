use std::f64::consts::PI;

use kestrel_core::{PlannerSettings, Vector2};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::alpha_time;
use crate::obstacles::{MovingCircle, MovingLine, Obstacle};
use crate::profile::{Trajectory, TrajectoryPoint, SLOW_DOWN_TIME};
use crate::sampler::SamplerPrecomputation;

/// One planning request. Positions in meters, speeds in m/s.
#[derive(Clone, Copy, Debug)]
pub struct PlanInput {
    pub s0: Vector2,
    pub v0: Vector2,
    pub s1: Vector2,
    pub v1: Vector2,
    pub max_speed: f64,
    pub acceleration: f64,
}

#[derive(Clone, Copy, Debug)]
struct BestTrajectoryInfo {
    time: f64,
    center_time: f64,
    angle: f64,
    mid_speed: Vector2,
    valid: bool,
}

impl Default for BestTrajectoryInfo {
    fn default() -> Self {
        Self {
            time: 0.0,
            center_time: 0.0,
            angle: 0.0,
            mid_speed: Vector2::zeros(),
            valid: false,
        }
    }
}

/// One generated trajectory segment plus the offset it was asked to cover.
struct GenerationSegment {
    trajectory: Trajectory,
    desired_distance: Option<Vector2>,
}

/// Monte-Carlo trajectory planner.
///
/// Searches for a two-segment alpha-time trajectory from the current
/// kinematic state to a target state that avoids all obstacles. Start or
/// target inside an obstacle and fully blocked situations fall back to the
/// escape search, so a trajectory is always returned.
///
/// Positions handed to the obstacle tests are absolute; the trajectory
/// segments themselves are computed relative to the start position.
pub struct TrajectoryPlanner {
    rng: SmallRng,
    settings: PlannerSettings,
    boundary_min: Vector2,
    boundary_max: Vector2,
    out_of_field_prio: i32,
    obstacles: Vec<Obstacle>,
    moving_circles: Vec<MovingCircle>,
    moving_lines: Vec<MovingLine>,
    precomputation: Option<SamplerPrecomputation>,

    // per-request state
    s0: Vector2,
    s1: Vector2,
    v0: Vector2,
    v1: Vector2,
    distance: Vector2,
    max_speed: f64,
    max_speed_squared: f64,
    acceleration: f64,
    exponential_slow_down: bool,

    // carried across requests to warm-start the searches
    best_result: BestTrajectoryInfo,
    best_end_point: Vector2,
    best_end_point_distance: f64,
    best_escaping_time: f64,
    best_escaping_angle: f64,

    generation: Vec<GenerationSegment>,
    current_trajectory: Vec<TrajectoryPoint>,
}

impl TrajectoryPlanner {
    pub fn new(rng_seed: u64, settings: PlannerSettings) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(rng_seed),
            settings,
            boundary_min: Vector2::new(-1e9, -1e9),
            boundary_max: Vector2::new(1e9, 1e9),
            out_of_field_prio: 1,
            obstacles: Vec::new(),
            moving_circles: Vec::new(),
            moving_lines: Vec::new(),
            precomputation: None,
            s0: Vector2::zeros(),
            s1: Vector2::zeros(),
            v0: Vector2::zeros(),
            v1: Vector2::zeros(),
            distance: Vector2::zeros(),
            max_speed: settings.max_speed,
            max_speed_squared: settings.max_speed * settings.max_speed,
            acceleration: settings.acceleration,
            exponential_slow_down: false,
            best_result: BestTrajectoryInfo::default(),
            best_end_point: Vector2::zeros(),
            best_end_point_distance: f64::INFINITY,
            best_escaping_time: 2.0,
            best_escaping_angle: 0.0,
            generation: Vec::new(),
            current_trajectory: Vec::new(),
        }
    }

    pub fn set_boundary(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        self.boundary_min = Vector2::new(x1.min(x2), y1.min(y2));
        self.boundary_max = Vector2::new(x1.max(x2), y1.max(y2));
    }

    pub fn set_out_of_field_priority(&mut self, prio: i32) {
        self.out_of_field_prio = prio;
    }

    /// Installs precomputed mid-point samples used instead of live
    /// sampling.
    pub fn set_precomputation(&mut self, precomputation: SamplerPrecomputation) {
        self.precomputation = Some(precomputation);
    }

    /// Obstacle lists are rebuilt from scratch every tick.
    pub fn clear_obstacles(&mut self) {
        self.obstacles.clear();
        self.moving_circles.clear();
        self.moving_lines.clear();
    }

    pub fn add_obstacle(&mut self, obstacle: Obstacle) {
        self.obstacles.push(obstacle);
    }

    /// Adds a moving circle, inflated by the robot radius.
    pub fn add_moving_circle(&mut self, mut circle: MovingCircle) {
        circle.radius += self.settings.robot_radius;
        self.moving_circles.push(circle);
    }

    /// Adds a moving line, inflated by the robot radius.
    pub fn add_moving_line(&mut self, mut line: MovingLine) {
        line.width += self.settings.robot_radius;
        self.moving_lines.push(line);
    }

    /// The trajectory returned by the last [`Self::plan`] call, equally
    /// spaced in time per segment. Other robots use this as a moving
    /// obstacle.
    pub fn current_trajectory(&self) -> &[TrajectoryPoint] {
        &self.current_trajectory
    }

    /// Plans a trajectory for the request, always returning samples.
    pub fn plan(&mut self, input: PlanInput) -> Vec<TrajectoryPoint> {
        self.s0 = input.s0;
        self.s1 = input.s1;
        self.v0 = input.v0;
        self.v1 = input.v1;
        self.distance = input.s1 - input.s0;
        self.max_speed = input.max_speed;
        self.max_speed_squared = input.max_speed * input.max_speed;
        self.acceleration = input.acceleration;
        self.exponential_slow_down =
            self.settings.exponential_slowdown && input.v1 == Vector2::zeros();

        self.find_path_alpha_t();
        self.current_trajectory = self.result_path();
        self.current_trajectory.clone()
    }

    fn point_in_playfield(&self, point: Vector2) -> bool {
        let radius = self.settings.robot_radius;
        point.x - radius >= self.boundary_min.x
            && point.x + radius <= self.boundary_max.x
            && point.y - radius >= self.boundary_min.y
            && point.y + radius <= self.boundary_max.y
    }

    fn is_in_static_obstacle(&self, point: Vector2) -> bool {
        if !self.point_in_playfield(point) {
            return true;
        }
        let radius = self.settings.robot_radius;
        self.obstacles.iter().any(|o| o.distance(point) < radius)
    }

    fn is_in_moving_obstacle(&self, point: Vector2, time: f64) -> bool {
        self.moving_circles
            .iter()
            .any(|o| o.intersects(point, time))
            || self.moving_lines.iter().any(|o| o.intersects(point, time))
    }

    fn is_trajectory_in_obstacle(
        &self,
        trajectory: &Trajectory,
        time_offset: f64,
        start_pos: Vector2,
    ) -> bool {
        let total_time = trajectory.time();
        for i in 0..40 {
            let time = total_time * i as f64 / 39.0;
            let pos = trajectory.position_at_time(time) + start_pos;
            if self.is_in_static_obstacle(pos) || self.is_in_moving_obstacle(pos, time + time_offset)
            {
                return true;
            }
        }
        false
    }

    /// Minimum clearance of the trajectory to all obstacles, sampled at 40
    /// points. Negative (early out) when any sample is inside an obstacle.
    fn min_obstacle_distance(
        &self,
        trajectory: &Trajectory,
        time_offset: f64,
        start_pos: Vector2,
    ) -> f64 {
        let total_time = trajectory.time();
        let radius = self.settings.robot_radius;
        let mut min_distance = f64::MAX;
        for i in 0..40 {
            let time = total_time * i as f64 / 39.0;
            let pos = trajectory.position_at_time(time) + start_pos;
            if !self.point_in_playfield(pos) {
                return -1.0;
            }
            for obstacle in &self.obstacles {
                let d = obstacle.distance(pos) - radius;
                if d <= 0.0 {
                    return d;
                }
                min_distance = min_distance.min(d);
            }
            for obstacle in &self.moving_circles {
                let d = obstacle.distance(pos, time + time_offset);
                if d <= 0.0 {
                    return d;
                }
                min_distance = min_distance.min(d);
            }
            for obstacle in &self.moving_lines {
                let d = obstacle.distance(pos, time + time_offset);
                if d <= 0.0 {
                    return d;
                }
                min_distance = min_distance.min(d);
            }
        }
        min_distance
    }

    fn find_path_alpha_t(&mut self) {
        self.generation.clear();

        let direct_slow_down = if self.exponential_slow_down {
            SLOW_DOWN_TIME
        } else {
            0.0
        };
        let use_high_precision = self.distance.norm() < 0.1
            && self.v1 == Vector2::zeros()
            && self.v0.norm() < 0.2;
        if let Some(direct) = alpha_time::find_trajectory_fast_end_speed(
            self.v0,
            self.v1,
            self.distance,
            self.acceleration,
            self.max_speed,
            direct_slow_down,
            use_high_precision,
        ) {
            if self.min_obstacle_distance(&direct, 0.0, self.s0)
                > self.settings.obstacle_avoidance_radius
            {
                self.generation.push(GenerationSegment {
                    trajectory: direct,
                    desired_distance: Some(self.distance),
                });
                return;
            }
        }

        let mut last_info = self.best_result;
        if last_info.mid_speed.norm_squared() > self.max_speed_squared {
            last_info.valid = false;
        }
        self.best_result.time = f64::INFINITY;
        self.best_result.valid = false;

        // the best mid point of the previous request is usually still good
        if last_info.valid {
            self.check_sample(last_info.mid_speed, last_info.center_time, last_info.angle);
        }

        if self.is_in_static_obstacle(self.s0) || self.is_in_moving_obstacle(self.s0, 0.0) {
            debug!("start inside obstacle, escaping");
            self.escape_obstacles();
            return;
        }

        if self.is_in_static_obstacle(self.s1) {
            self.find_path_end_in_obstacle();
            return;
        }

        if let Some(precomputation) = self.precomputation.take() {
            self.sample_precomputed(&precomputation);
            self.precomputation = Some(precomputation);
        } else {
            self.sample_live(&last_info);
        }

        if !self.best_result.valid {
            self.escape_obstacles();
        }
    }

    fn sample_precomputed(&mut self, precomputation: &SamplerPrecomputation) {
        let distance = self.distance.norm();
        if let Some(segment) = precomputation.segment_for_distance(distance) {
            for sample in &segment.points {
                let (time, angle, mid_speed) = sample.denormalize(self.distance, self.max_speed);
                self.check_sample(mid_speed, time, angle);
            }
        }
    }

    fn sample_live(&mut self, last_info: &BestTrajectoryInfo) {
        // a speed towards the target works for most plain situations
        let distance_length = self.distance.norm();
        let default_speed = if distance_length > 1e-6 {
            let mut speed = self.distance * (2.5f64.max(distance_length / 2.0) / distance_length);
            if speed.norm_squared() > self.max_speed_squared {
                speed = speed / speed.norm();
            }
            speed
        } else {
            Vector2::zeros()
        };

        #[derive(PartialEq, Clone, Copy)]
        enum SamplingMode {
            TotalRandom,
            CurrentBest,
            LastBest,
        }

        for i in 0..100 {
            let mode = if !self.best_result.valid {
                if i < 20 || self.rng.gen::<bool>() {
                    SamplingMode::LastBest
                } else {
                    SamplingMode::TotalRandom
                }
            } else if self.rng.gen_range(0..1024) < 150 {
                SamplingMode::TotalRandom
            } else if self.best_result.time < last_info.time + 0.05 {
                SamplingMode::CurrentBest
            } else if self.rng.gen::<bool>() {
                SamplingMode::CurrentBest
            } else {
                SamplingMode::LastBest
            };

            let (speed, angle, time) = if mode == SamplingMode::TotalRandom {
                let speed = if self.rng.gen::<bool>() {
                    default_speed
                } else {
                    self.random_speed()
                };
                let angle = self.rng.gen_range(0.0..2.0 * PI);
                let max_time = if self.best_result.valid {
                    (self.best_result.time - 0.1).max(0.01)
                } else {
                    5.0
                };
                (speed, angle, self.rng.gen_range(0.0..max_time))
            } else {
                let info = if mode == SamplingMode::CurrentBest {
                    self.best_result
                } else {
                    *last_info
                };
                const RADIUS: f64 = 0.2;
                let mut chosen_mid_speed = info.mid_speed;
                while chosen_mid_speed.norm_squared() > self.max_speed_squared {
                    chosen_mid_speed *= 0.9;
                }
                let angle = info.angle + self.rng.gen_range(-0.1..0.1);
                let time = (info.center_time + self.rng.gen_range(-0.1..0.1)).max(0.0001);
                let speed = loop {
                    let candidate = chosen_mid_speed
                        + Vector2::new(
                            self.rng.gen_range(-RADIUS..RADIUS),
                            self.rng.gen_range(-RADIUS..RADIUS),
                        );
                    if candidate.norm_squared() < self.max_speed_squared {
                        break candidate;
                    }
                };
                (speed, angle, time)
            };
            self.check_sample(speed, time, angle);
        }
    }

    /// Evaluates a two-segment candidate: the second segment from the mid
    /// speed to the target state, the first segment searched to cover the
    /// remaining offset. Keeps the candidate when it beats the current
    /// best.
    fn check_sample(&mut self, mid_speed: Vector2, time: f64, angle: f64) -> bool {
        // require a real improvement on long plans
        let minimum_time_improvement = if self.distance.norm_squared() > 1.0 {
            0.05
        } else {
            0.0
        };
        if time < 0.0 {
            return false;
        }

        let slow_down_time = if self.exponential_slow_down {
            SLOW_DOWN_TIME
        } else {
            0.0
        };
        let second_part = match alpha_time::calculate_trajectory_fast_end_speed(
            mid_speed,
            self.v1,
            time,
            angle,
            self.acceleration,
            self.max_speed,
            slow_down_time,
        ) {
            Some(trajectory) => trajectory,
            None => return false,
        };
        let second_part_time = second_part.time();
        let second_part_offset = second_part.end_position();
        if second_part_time > self.best_result.time - minimum_time_improvement {
            return false;
        }

        let first_part_position = self.distance - second_part_offset;
        let first_part_slow_down = if self.exponential_slow_down {
            (SLOW_DOWN_TIME - second_part_time).max(0.0)
        } else {
            0.0
        };
        let first_part = match alpha_time::find_trajectory_exact_end_speed(
            self.v0,
            mid_speed,
            first_part_position,
            self.acceleration,
            self.max_speed,
            first_part_slow_down,
            false,
        ) {
            Some(trajectory) => trajectory,
            None => return false,
        };
        let first_part_time = first_part.time();
        if first_part_time + second_part_time > self.best_result.time - minimum_time_improvement {
            return false;
        }

        let first_part_obstacle_dist = self.min_obstacle_distance(&first_part, 0.0, self.s0);
        if first_part_obstacle_dist <= 0.0 {
            return false;
        }
        let second_part_obstacle_dist =
            self.min_obstacle_distance(&second_part, first_part_time, self.s1 - second_part_offset);
        if second_part_obstacle_dist <= 0.0 {
            return false;
        }

        let min_obstacle_dist = first_part_obstacle_dist.min(second_part_obstacle_dist);
        let obstacle_dist_extra_time = if min_obstacle_dist < self.settings.obstacle_avoidance_radius
        {
            self.settings.obstacle_avoidance_bonus
        } else {
            1.0
        };
        let biased_trajectory_time = (first_part_time + second_part_time) * obstacle_dist_extra_time;
        if biased_trajectory_time > self.best_result.time - minimum_time_improvement {
            return false;
        }

        self.best_result = BestTrajectoryInfo {
            time: biased_trajectory_time,
            center_time: time,
            angle,
            mid_speed,
            valid: true,
        };

        self.generation.clear();
        self.generation.push(GenerationSegment {
            trajectory: first_part,
            desired_distance: Some(first_part_position),
        });
        self.generation.push(GenerationSegment {
            trajectory: second_part,
            desired_distance: None,
        });
        true
    }

    fn random_speed(&mut self) -> Vector2 {
        loop {
            let speed = Vector2::new(
                self.rng.gen_range(-self.max_speed..self.max_speed),
                self.rng.gen_range(-self.max_speed..self.max_speed),
            );
            if speed.norm_squared() <= self.max_speed_squared {
                return speed;
            }
        }
    }

    /// A random point in the playfield, relative to the start position.
    fn random_point_in_field(&mut self) -> Vector2 {
        Vector2::new(
            self.rng.gen_range(self.boundary_min.x..self.boundary_max.x),
            self.rng.gen_range(self.boundary_min.y..self.boundary_max.y),
        ) - self.s0
    }

    fn test_end_point(&mut self, end_point: Vector2) -> bool {
        if (end_point - self.distance).norm() > self.best_end_point_distance - 0.05 {
            return false;
        }

        // no slowdown here, we are not even where we want to be
        let direct = match alpha_time::find_trajectory_exact_end_speed(
            self.v0,
            Vector2::zeros(),
            end_point,
            self.acceleration,
            self.max_speed,
            0.0,
            false,
        ) {
            Some(trajectory) => trajectory,
            None => return false,
        };
        if self.is_trajectory_in_obstacle(&direct, 0.0, self.s0) {
            return false;
        }

        self.best_end_point_distance = (end_point - self.distance).norm();
        self.best_result.valid = true;
        self.best_end_point = end_point;

        self.generation.clear();
        self.generation.push(GenerationSegment {
            trajectory: direct,
            desired_distance: Some(end_point),
        });
        true
    }

    /// Searches an alternative end point near the blocked target.
    fn find_path_end_in_obstacle(&mut self) {
        let prev_best_distance = self.best_end_point_distance;
        self.best_end_point_distance = f64::INFINITY;
        self.best_result.valid = false;
        let cached_end_point = self.best_end_point;
        if !self.test_end_point(cached_end_point) {
            // widen the search when the cached end point no longer works
            self.best_end_point_distance = prev_best_distance * 1.3;
        }

        const ITERATIONS: usize = 200;
        for i in 0..ITERATIONS {
            if i == ITERATIONS / 3 && !self.best_result.valid {
                self.best_end_point_distance = f64::INFINITY;
            }
            let rand_val = self.rng.gen_range(0..1024);
            let test_point = if rand_val < 300 {
                // sample around the actual target
                let radius = self.best_end_point_distance.min(0.3);
                self.distance
                    + Vector2::new(
                        self.rng.gen_range(-radius..radius),
                        self.rng.gen_range(-radius..radius),
                    )
            } else if rand_val < 800 || self.best_end_point_distance < 0.3 {
                // sample around the last best end point
                let radius = self.best_end_point_distance.min(0.3);
                self.best_end_point
                    + Vector2::new(
                        self.rng.gen_range(-radius..radius),
                        self.rng.gen_range(-radius..radius),
                    )
            } else {
                self.random_point_in_field()
            };
            self.test_end_point(test_point);
        }

        if !self.best_result.valid {
            self.escape_obstacles();
        }
    }

    /// Scores a trajectory by the obstacles it passes through: the highest
    /// priority touched, the time spent at that priority (stopping inside
    /// counts heavily) and nothing else.
    fn trajectory_obstacle_score(&self, trajectory: &Trajectory) -> (i32, f64) {
        let total_time = trajectory.time();
        const SAMPLING_INTERVAL: f64 = 0.005;
        let samples = (total_time / SAMPLING_INTERVAL) as usize + 1;

        let mut current_best_prio = 0;
        let mut current_best_time = 0.0;
        for i in 0..samples {
            let time = if i < samples - 1 {
                i as f64 * SAMPLING_INTERVAL
            } else {
                total_time
            };
            let pos = trajectory.position_at_time(time) + self.s0;
            let mut prio = 0;
            if !self.point_in_playfield(pos) {
                prio = self.out_of_field_prio;
            }
            let radius = self.settings.robot_radius;
            for obstacle in &self.obstacles {
                if obstacle.prio() > prio && obstacle.distance(pos) < radius {
                    prio = obstacle.prio();
                }
            }
            for obstacle in &self.moving_circles {
                if obstacle.prio > prio && obstacle.intersects(pos, time) {
                    prio = obstacle.prio;
                }
            }
            for obstacle in &self.moving_lines {
                if obstacle.prio > prio && obstacle.intersects(pos, time) {
                    prio = obstacle.prio;
                }
            }
            if prio > current_best_prio {
                current_best_prio = prio;
                current_best_time = 0.0;
            }
            if prio == current_best_prio {
                if i == samples - 1 {
                    // stopping in an obstacle is far worse than crossing one
                    current_best_time += 10.0;
                } else {
                    current_best_time += SAMPLING_INTERVAL;
                }
            }
        }
        (current_best_prio, current_best_time)
    }

    /// Samples stopping trajectories and keeps the one that leaves the
    /// highest-priority obstacles soonest. Always produces a result, even
    /// one that still ends inside an obstacle.
    fn escape_obstacles(&mut self) {
        let mut best_prio = i32::MAX;
        let mut best_obstacle_time = f64::INFINITY;
        let mut best_total_time = f64::INFINITY;

        if let Some(trajectory) = alpha_time::calculate_trajectory_exact_end_speed(
            self.v0,
            Vector2::zeros(),
            self.best_escaping_time,
            self.best_escaping_angle,
            self.acceleration,
            self.max_speed,
            0.0,
        ) {
            let (prio, obstacle_time) = self.trajectory_obstacle_score(&trajectory);
            best_prio = prio;
            best_obstacle_time = obstacle_time;
            best_total_time = trajectory.time();
        }

        for _ in 0..100 {
            if best_prio == 0 {
                break;
            }
            let (time, angle) = if self.rng.gen::<bool>() {
                (
                    self.rng.gen_range(0.4..5.0),
                    self.rng.gen_range(0.0..2.0 * PI),
                )
            } else {
                (
                    (self.best_escaping_time + self.rng.gen_range(-0.1..0.1)).max(0.05),
                    self.best_escaping_angle + self.rng.gen_range(-0.1..0.1),
                )
            };
            if let Some(trajectory) = alpha_time::calculate_trajectory_exact_end_speed(
                self.v0,
                Vector2::zeros(),
                time,
                angle,
                self.acceleration,
                self.max_speed,
                0.0,
            ) {
                let (prio, obstacle_time) = self.trajectory_obstacle_score(&trajectory);
                let total_time = trajectory.time();
                if (prio, obstacle_time, total_time)
                    < (best_prio, best_obstacle_time, best_total_time)
                {
                    best_prio = prio;
                    best_obstacle_time = obstacle_time;
                    best_total_time = total_time;
                    self.best_escaping_time = time;
                    self.best_escaping_angle = angle;
                }
            }
        }

        self.generation.clear();
        if let Some(trajectory) = alpha_time::calculate_trajectory_exact_end_speed(
            self.v0,
            Vector2::zeros(),
            self.best_escaping_time,
            self.best_escaping_angle,
            self.acceleration,
            self.max_speed,
            0.0,
        ) {
            self.generation.push(GenerationSegment {
                trajectory,
                desired_distance: None,
            });
        }
    }

    /// Samples the generated segments into the final path. Positions are
    /// rescaled per axis (clamped to [0.9, 1.1]) so the path hits the
    /// desired offset exactly.
    fn result_path(&self) -> Vec<TrajectoryPoint> {
        let mut result = Vec::with_capacity(self.generation.len() * 40);
        let mut start_pos = self.s0;
        let mut time_sum = 0.0;
        for segment in &self.generation {
            let total_time = segment.trajectory.time();
            let mut x_scale = 1.0;
            let mut y_scale = 1.0;
            if let Some(desired) = segment.desired_distance {
                let end_pos = segment.trajectory.end_position();
                if end_pos.x.abs() > 1e-6 {
                    x_scale = (desired.x / end_pos.x).clamp(0.9, 1.1);
                }
                if end_pos.y.abs() > 1e-6 {
                    y_scale = (desired.y / end_pos.y).clamp(0.9, 1.1);
                }
            }
            for i in 0..40 {
                let t = total_time * i as f64 / 39.0;
                let state = segment.trajectory.state_at_time(t);
                result.push(TrajectoryPoint {
                    pos: start_pos + Vector2::new(state.pos.x * x_scale, state.pos.y * y_scale),
                    speed: state.speed,
                    time: time_sum + t,
                });
            }
            if let Some(last) = result.last() {
                start_pos = last.pos;
                time_sum = last.time;
            }
        }
        result
    }
}
