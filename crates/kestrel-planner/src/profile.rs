use kestrel_core::{BoundingBox, Vector2};

/// Trailing duration during which the acceleration tapers off.
pub const SLOW_DOWN_TIME: f64 = 0.3;
/// Acceleration factor reached at the very end of the slowdown.
const MIN_ACC_FACTOR: f64 = 0.3;

fn sign(x: f64) -> f64 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// A 1-D speed sample: speed `v` at time `t`. During construction `t` holds
/// the segment duration, [`SpeedProfile1D::integrate_time`] converts it to
/// the cumulative time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VT1 {
    pub v: f64,
    pub t: f64,
}

/// Position and speed reached by a 1-D profile, without materializing it.
#[derive(Clone, Copy, Debug)]
pub struct TrajectoryPosInfo1D {
    pub end_pos: f64,
    pub increase_at_speed: f64,
}

/// A piecewise-linear 1-D speed profile, `|dv|/dt <= acc` on every segment.
#[derive(Clone, Debug, Default)]
pub struct SpeedProfile1D {
    pub profile: Vec<VT1>,
}

fn constant_distance(v: f64, time: f64) -> f64 {
    v * time
}

fn dist(v0: f64, v1: f64, acc: f64) -> f64 {
    let time = (v0 - v1).abs() / acc;
    0.5 * (v0 + v1) * time
}

/// Bounds `speed_after_t` into the allowed end speed range `[0, v1]`,
/// returning the bounded speed and the time left over after reaching it.
fn adjust_end_speed(v0: f64, v1: f64, time: f64, direction_positive: bool, acc: f64) -> VT1 {
    let inv_acc = 1.0 / acc;

    let speed_after_t = v0 + if direction_positive { 1.0 } else { -1.0 } * (time * acc);
    let bounded_speed = speed_after_t.min(v1.max(0.0)).max(v1.min(0.0));
    let necessary_time = (v0 - bounded_speed).abs() * inv_acc;
    VT1 {
        v: bounded_speed,
        t: time - necessary_time,
    }
}

impl SpeedProfile1D {
    /// End position and top speed of the trajectory
    /// `calculate_1d_trajectory(v0, v1, hint_dist, acc, v_max)` without
    /// building it. The sign of `hint_dist` selects the direction.
    pub fn calculate_end_pos(v0: f64, v1: f64, hint_dist: f64, acc: f64, v_max: f64) -> TrajectoryPosInfo1D {
        let desired_v_max = if hint_dist < 0.0 { -v_max } else { v_max };
        if hint_dist == 0.0 {
            TrajectoryPosInfo1D {
                end_pos: dist(v0, v1, acc),
                increase_at_speed: v0.max(v1),
            }
        } else if (v0 < desired_v_max) != (v1 < desired_v_max) {
            // the maximum speed is crossed
            TrajectoryPosInfo1D {
                end_pos: dist(v0, v1, acc) + constant_distance(desired_v_max, hint_dist.abs()),
                increase_at_speed: desired_v_max,
            }
        } else {
            // which of v0 and v1 is closer to the desired max speed?
            let v0_closer = (v0 - desired_v_max).abs() < (v1 - desired_v_max).abs();
            let closer_speed = if v0_closer { v0 } else { v1 };
            let (extra_dist, reached) =
                Self::free_extra_time_distance(closer_speed, hint_dist.abs(), acc, desired_v_max);
            TrajectoryPosInfo1D {
                end_pos: extra_dist + dist(v0, v1, acc),
                increase_at_speed: reached,
            }
        }
    }

    fn free_extra_time_distance(v: f64, time: f64, acc: f64, v_max: f64) -> (f64, f64) {
        let to_max_time = 2.0 * (v_max - v).abs() / acc;
        if to_max_time < time {
            (
                2.0 * dist(v, v_max, acc) + constant_distance(v_max, time - to_max_time),
                v_max,
            )
        } else {
            let v1 = if v > v_max { -1.0 } else { 1.0 } * acc * time / 2.0 + v;
            (2.0 * dist(v, v1, acc), v1)
        }
    }

    /// As [`Self::calculate_end_pos`] for the fast end speed mode, where the
    /// end speed is only bounded into `[0, v1]`.
    pub fn calculate_end_pos_fast_speed(
        v0: f64,
        v1: f64,
        time: f64,
        direction_positive: bool,
        acc: f64,
        v_max: f64,
    ) -> TrajectoryPosInfo1D {
        let end_values = adjust_end_speed(v0, v1, time, direction_positive, acc);
        if end_values.t == 0.0 {
            TrajectoryPosInfo1D {
                end_pos: (v0 + end_values.v) * 0.5 * time,
                increase_at_speed: if direction_positive {
                    v0.max(v1)
                } else {
                    v0.min(v1)
                },
            }
        } else {
            let hint = if direction_positive {
                end_values.t
            } else {
                -end_values.t
            };
            Self::calculate_end_pos(v0, end_values.v, hint, acc, v_max)
        }
    }

    /// Builds a 1-D profile from `v0` to `v1` that spends `|extra_time|`
    /// beyond the direct ramp. The sign of `extra_time` selects the
    /// direction of the excursion.
    pub fn calculate_1d_trajectory(v0: f64, v1: f64, extra_time: f64, acc: f64, v_max: f64) -> Self {
        let mut result = SpeedProfile1D {
            profile: vec![VT1 { v: v0, t: 0.0 }],
        };

        let desired_v_max = if extra_time < 0.0 { -v_max } else { v_max };
        let extra = extra_time.abs();
        if extra == 0.0 {
            result.profile.push(VT1 {
                v: v1,
                t: (v0 - v1).abs() / acc,
            });
        } else if (v0 < desired_v_max) != (v1 < desired_v_max) {
            // the profile has to cross the maximum speed: ramp to it, hold
            // for the extra time, ramp to the end speed
            let acc_inv = 1.0 / acc;
            result.profile.push(VT1 {
                v: desired_v_max,
                t: (v0 - desired_v_max).abs() * acc_inv,
            });
            result.profile.push(VT1 {
                v: desired_v_max,
                t: extra,
            });
            result.profile.push(VT1 {
                v: v1,
                t: (v1 - desired_v_max).abs() * acc_inv,
            });
        } else {
            let v0_closer = (v0 - desired_v_max).abs() < (v1 - desired_v_max).abs();
            let closer_speed = if v0_closer { v0 } else { v1 };
            result.create_free_extra_time_segment(v0, closer_speed, v1, extra, acc, desired_v_max);
        }
        result
    }

    fn create_free_extra_time_segment(
        &mut self,
        before_speed: f64,
        v: f64,
        next_speed: f64,
        time: f64,
        acc: f64,
        desired_v_max: f64,
    ) {
        let to_max_time = 2.0 * (desired_v_max - v).abs() / acc;
        if to_max_time < time {
            self.profile.push(VT1 {
                v: desired_v_max,
                t: (desired_v_max - before_speed).abs() / acc,
            });
            self.profile.push(VT1 {
                v: desired_v_max,
                t: time - to_max_time,
            });
            self.profile.push(VT1 {
                v: next_speed,
                t: (desired_v_max - next_speed).abs() / acc,
            });
        } else {
            let v1 = if v > desired_v_max { -1.0 } else { 1.0 } * acc * time / 2.0 + v;
            self.profile.push(VT1 {
                v: v1,
                t: (before_speed - v1).abs() / acc,
            });
            self.profile.push(VT1 {
                v: next_speed,
                t: (next_speed - v1).abs() / acc,
            });
        }
    }

    /// Builds a 1-D profile in fast end speed mode: the end speed is the
    /// value closest to `v0` on `[0, v1]` that is reachable in `time`.
    pub fn calculate_1d_trajectory_fast_end_speed(
        v0: f64,
        v1: f64,
        time: f64,
        direction_positive: bool,
        acc: f64,
        v_max: f64,
    ) -> Self {
        let end_values = adjust_end_speed(v0, v1, time, direction_positive, acc);
        if end_values.t == 0.0 {
            SpeedProfile1D {
                profile: vec![
                    VT1 { v: v0, t: 0.0 },
                    VT1 {
                        v: end_values.v,
                        t: (end_values.v - v0).abs() / acc,
                    },
                ],
            }
        } else {
            let hint = if direction_positive {
                end_values.t
            } else {
                -end_values.t
            };
            Self::calculate_1d_trajectory(v0, end_values.v, hint, acc, v_max)
        }
    }

    /// A plain two-point profile, used by the closed-form deceleration.
    pub fn linear_segment(v0: f64, v1: f64, time: f64) -> Self {
        SpeedProfile1D {
            profile: vec![VT1 { v: v0, t: 0.0 }, VT1 { v: v1, t: time }],
        }
    }

    /// Converts per-segment durations into cumulative times.
    pub fn integrate_time(&mut self) {
        let mut total_time = 0.0;
        for vt in self.profile.iter_mut() {
            total_time += vt.t;
            vt.t = total_time;
        }
    }
}

/// A 2-D speed sample of the merged trajectory at cumulative time `t`.
#[derive(Clone, Copy, Debug)]
struct VT {
    v: Vector2,
    t: f64,
}

/// Robot position and speed at one point of a trajectory.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RobotState {
    pub pos: Vector2,
    pub speed: Vector2,
}

/// One sample of the emitted trajectory.
#[derive(Clone, Copy, Debug)]
pub struct TrajectoryPoint {
    pub pos: Vector2,
    pub speed: Vector2,
    pub time: f64,
}

fn speed_for_time(first: VT1, second: VT1, time: f64) -> f64 {
    let time_diff = time - first.t;
    let diff = if second.t == first.t {
        1.0
    } else {
        time_diff / (second.t - first.t)
    };
    first.v + diff * (second.v - first.v)
}

/// Per-segment slowdown precomputation, see [`SlowdownAcceleration`].
#[derive(Clone, Copy, Debug)]
struct SegmentPrecomputation {
    inv_segment_time: f64,
    v0: Vector2,
    a0: Vector2,
    a1: Vector2,
    /// Real duration of the slowed-down part of the segment.
    segment_time: f64,
    partial_distance: Vector2,
}

impl Default for SegmentPrecomputation {
    fn default() -> Self {
        Self {
            inv_segment_time: 0.0,
            v0: Vector2::zeros(),
            a0: Vector2::zeros(),
            a1: Vector2::zeros(),
            segment_time: 0.0,
            partial_distance: Vector2::zeros(),
        }
    }
}

/// Evaluates profile segments under the exponential tail slowdown.
///
/// During the last `SLOW_DOWN_TIME` of real time, the acceleration is
/// scaled by `sqrt(1 + 2 * t_factor * a_factor)`, tapering to
/// `MIN_ACC_FACTOR` at the end. Segments fully before the slowdown start
/// behave exactly like constant acceleration.
struct SlowdownAcceleration {
    slow_down_start_time: f64,
    end_time: f64,
}

impl SlowdownAcceleration {
    fn new(total_simple_time: f64, slow_down_time: f64) -> Self {
        Self {
            slow_down_start_time: total_simple_time - slow_down_time,
            end_time: total_simple_time + SLOW_DOWN_TIME - slow_down_time,
        }
    }

    /// Disabled slowdown: every segment takes the constant-acceleration path.
    fn disabled() -> Self {
        Self {
            slow_down_start_time: f64::INFINITY,
            end_time: f64::INFINITY,
        }
    }

    fn compute_acceleration(time_to_end: f64) -> f64 {
        let total_time = 2.0 / (1.0 + MIN_ACC_FACTOR);
        let a_factor = (MIN_ACC_FACTOR - 1.0) / total_time;
        let t_factor = 1.0 - time_to_end / SLOW_DOWN_TIME;
        (1.0 + 2.0 * t_factor * a_factor).sqrt()
    }

    fn precompute(&self, first: VT, second: VT) -> SegmentPrecomputation {
        let mut result = SegmentPrecomputation {
            inv_segment_time: 1.0 / (second.t - first.t),
            ..Default::default()
        };
        if second.t <= self.slow_down_start_time || first.t == second.t {
            return result;
        }
        let t0;
        if first.t < self.slow_down_start_time {
            let (partial, v0) = self.constant_partial(first, second, result.inv_segment_time, first.t, self.slow_down_start_time);
            result.partial_distance = partial;
            result.v0 = v0;
            t0 = self.slow_down_start_time;
        } else {
            result.partial_distance = Vector2::zeros();
            result.v0 = first.v;
            t0 = first.t;
        }
        let base_acc = (first.v - second.v).abs() / (second.t - first.t);
        let factor0 = Self::compute_acceleration(self.end_time - t0);
        let factor1 = Self::compute_acceleration(self.end_time - second.t);
        result.a0 = base_acc * factor0;
        result.a1 = base_acc * factor1;
        result.segment_time = 2.0 * (second.t - t0) / (factor0 + factor1);
        result
    }

    fn constant_partial(
        &self,
        first: VT,
        second: VT,
        inv_segment_time: f64,
        transformed_t0: f64,
        time: f64,
    ) -> (Vector2, Vector2) {
        let time_diff = time - transformed_t0;
        let diff = if second.t == first.t {
            1.0
        } else {
            time_diff * inv_segment_time
        };
        let speed = first.v + (second.v - first.v) * diff;
        let part_dist = (first.v + speed) * (0.5 * time_diff);
        (part_dist, speed)
    }

    fn segment_offset(&self, first: VT, second: VT, precomp: &SegmentPrecomputation) -> Vector2 {
        if second.t <= self.slow_down_start_time || first.t == second.t {
            return (first.v + second.v) * (0.5 * (second.t - first.t));
        }
        let t = precomp.segment_time;
        let speed_diff = second.v - precomp.v0;
        let diff_sign = Vector2::new(sign(speed_diff.x), sign(speed_diff.y));
        let signed_a0 = Vector2::new(diff_sign.x * precomp.a0.x, diff_sign.y * precomp.a0.y);
        let a_diff = precomp.a1 - precomp.a0;
        let signed_a_diff = Vector2::new(diff_sign.x * a_diff.x, diff_sign.y * a_diff.y);
        let d = precomp.v0 * t + signed_a0 * (0.5 * t * t) + signed_a_diff * (t * t / 6.0);
        precomp.partial_distance + d
    }

    fn partial_offset_and_speed(
        &self,
        first: VT,
        second: VT,
        precomp: &SegmentPrecomputation,
        transformed_t0: f64,
        time: f64,
    ) -> (Vector2, Vector2) {
        if time <= self.slow_down_start_time || first.t == second.t {
            return self.constant_partial(first, second, precomp.inv_segment_time, transformed_t0, time);
        }
        let slowdown_t0 = if first.t > self.slow_down_start_time {
            transformed_t0
        } else {
            self.slow_down_start_time
        };
        let tm = time - slowdown_t0;
        let speed_diff = second.v - precomp.v0;
        let diff_sign = Vector2::new(sign(speed_diff.x), sign(speed_diff.y));
        let signed_a0 = Vector2::new(diff_sign.x * precomp.a0.x, diff_sign.y * precomp.a0.y);
        let a_diff = precomp.a1 - precomp.a0;
        let signed_a_diff = Vector2::new(diff_sign.x * a_diff.x, diff_sign.y * a_diff.y);
        let inv_segment_time = 1.0 / precomp.segment_time;
        let speed = precomp.v0 + signed_a0 * tm + signed_a_diff * (0.5 * tm * tm * inv_segment_time);
        let d = precomp.v0 * tm
            + signed_a0 * (0.5 * tm * tm)
            + signed_a_diff * (tm * tm * tm * inv_segment_time / 6.0);
        (precomp.partial_distance + d, speed)
    }

    fn time_for_segment(&self, first: VT, second: VT, precomp: &SegmentPrecomputation) -> f64 {
        if second.t <= self.slow_down_start_time {
            second.t - first.t
        } else if first.t < self.slow_down_start_time {
            self.slow_down_start_time - first.t + precomp.segment_time
        } else {
            precomp.segment_time
        }
    }
}

/// A 2-D trajectory: the time-merge of two 1-D speed profiles plus a start
/// position and an optional tail slowdown.
///
/// Positions returned by the queries are relative to `s0`.
#[derive(Clone, Debug)]
pub struct Trajectory {
    profile: Vec<VT>,
    s0: Vector2,
    /// Duration of the profile tail that is stretched by the slowdown.
    /// Negative when the slowdown is disabled.
    slow_down_time: f64,
}

impl Trajectory {
    /// Merges two time-integrated 1-D profiles.
    pub fn new(
        x_profile: &SpeedProfile1D,
        y_profile: &SpeedProfile1D,
        start_pos: Vector2,
        slow_down_time: f64,
    ) -> Self {
        // 0 would lie exactly on the trajectory end, which is numerically
        // fragile
        let slow_down_time = if slow_down_time == 0.0 {
            -1.0
        } else {
            slow_down_time
        };
        const SAME_POINT_EPSILON: f64 = 0.0001;

        let x = &x_profile.profile;
        let y = &y_profile.profile;
        let mut profile: Vec<VT> = Vec::with_capacity(x.len() + y.len());

        let mut x_index = 0;
        let mut y_index = 0;
        while x_index < x.len() && y_index < y.len() {
            let x_next = x[x_index].t;
            let y_next = y[y_index].t;

            if (x_next - y_next).abs() < SAME_POINT_EPSILON {
                let time = (x_next + y_next) * 0.5;
                profile.push(VT {
                    v: Vector2::new(x[x_index].v, y[y_index].v),
                    t: time,
                });
                x_index += 1;
                y_index += 1;
            } else if x_next < y_next {
                let vy = speed_for_time(y[y_index - 1], y[y_index], x_next);
                profile.push(VT {
                    v: Vector2::new(x[x_index].v, vy),
                    t: x_next,
                });
                x_index += 1;
            } else {
                let vx = speed_for_time(x[x_index - 1], x[x_index], y_next);
                profile.push(VT {
                    v: Vector2::new(vx, y[y_index].v),
                    t: y_next,
                });
                y_index += 1;
            }
        }
        while x_index < x.len() {
            profile.push(VT {
                v: Vector2::new(x[x_index].v, y.last().map(|p| p.v).unwrap_or(0.0)),
                t: x[x_index].t,
            });
            x_index += 1;
        }
        while y_index < y.len() {
            profile.push(VT {
                v: Vector2::new(x.last().map(|p| p.v).unwrap_or(0.0), y[y_index].v),
                t: y[y_index].t,
            });
            y_index += 1;
        }

        Self {
            profile,
            s0: start_pos,
            slow_down_time,
        }
    }

    fn acceleration(&self) -> SlowdownAcceleration {
        if self.slow_down_time < 0.0 {
            SlowdownAcceleration::disabled()
        } else {
            SlowdownAcceleration::new(self.profile.last().map(|p| p.t).unwrap_or(0.0), self.slow_down_time)
        }
    }

    pub fn start_pos(&self) -> Vector2 {
        self.s0
    }

    pub fn end_speed(&self) -> Vector2 {
        self.profile.last().map(|p| p.v).unwrap_or_else(Vector2::zeros)
    }

    /// Total (real) duration, including the stretched slowdown tail.
    pub fn time(&self) -> f64 {
        if self.slow_down_time < 0.0 {
            return self.profile.last().map(|p| p.t).unwrap_or(0.0);
        }
        let acceleration = self.acceleration();
        let mut time = 0.0;
        for pair in self.profile.windows(2) {
            let precomp = acceleration.precompute(pair[0], pair[1]);
            time += acceleration.time_for_segment(pair[0], pair[1], &precomp);
        }
        time
    }

    /// Truncates the profile in place. Only meaningful without slowdown.
    pub fn limit_to_time(&mut self, time: f64) {
        if self.profile.len() < 2 {
            return;
        }
        for i in 0..self.profile.len() - 1 {
            if self.profile[i + 1].t >= time {
                let diff = if self.profile[i + 1].t == self.profile[i].t {
                    1.0
                } else {
                    (time - self.profile[i].t) / (self.profile[i + 1].t - self.profile[i].t)
                };
                let speed = self.profile[i].v + (self.profile[i + 1].v - self.profile[i].v) * diff;
                self.profile[i + 1] = VT { v: speed, t: time };
                self.profile.truncate(i + 2);
                return;
            }
        }
    }

    /// End position relative to the start position.
    pub fn end_position(&self) -> Vector2 {
        let acceleration = self.acceleration();
        let mut offset = Vector2::zeros();
        for pair in self.profile.windows(2) {
            let precomp = acceleration.precompute(pair[0], pair[1]);
            offset += acceleration.segment_offset(pair[0], pair[1], &precomp);
        }
        offset
    }

    /// Position (relative to start) and speed at `time`.
    pub fn state_at_time(&self, time: f64) -> RobotState {
        let acceleration = self.acceleration();
        let mut offset = Vector2::zeros();
        let mut total_time = 0.0;
        for pair in self.profile.windows(2) {
            let precomp = acceleration.precompute(pair[0], pair[1]);
            let segment_time = acceleration.time_for_segment(pair[0], pair[1], &precomp);
            if total_time + segment_time > time {
                let (pos, speed) = acceleration.partial_offset_and_speed(
                    pair[0],
                    pair[1],
                    &precomp,
                    total_time,
                    time,
                );
                return RobotState {
                    pos: offset + pos,
                    speed,
                };
            }
            offset += acceleration.segment_offset(pair[0], pair[1], &precomp);
            total_time += segment_time;
        }
        RobotState {
            pos: offset,
            speed: self.end_speed(),
        }
    }

    pub fn position_at_time(&self, time: f64) -> Vector2 {
        self.state_at_time(time).pos
    }

    /// Evenly spaced samples: `count` points at `time_offset + i *
    /// time_interval`.
    pub fn trajectory_points(&self, count: usize, time_interval: f64, time_offset: f64) -> Vec<TrajectoryPoint> {
        if count == 0 {
            return Vec::new();
        }
        let acceleration = self.acceleration();
        let mut result: Vec<TrajectoryPoint> = (0..count)
            .map(|i| TrajectoryPoint {
                pos: Vector2::zeros(),
                speed: Vector2::zeros(),
                time: time_offset + i as f64 * time_interval,
            })
            .collect();

        let mut offset = Vector2::zeros();
        let mut total_time = 0.0;
        let mut next_desired_time = 0.0;
        let mut result_counter = 0;

        for pair in self.profile.windows(2) {
            let precomp = acceleration.precompute(pair[0], pair[1]);
            let segment_time = acceleration.time_for_segment(pair[0], pair[1], &precomp);
            while total_time + segment_time >= next_desired_time {
                let (pos, speed) = acceleration.partial_offset_and_speed(
                    pair[0],
                    pair[1],
                    &precomp,
                    total_time,
                    next_desired_time,
                );
                result[result_counter].pos = offset + pos;
                result[result_counter].speed = speed;
                result_counter += 1;
                next_desired_time += time_interval;
                if result_counter == result.len() {
                    return result;
                }
            }
            offset += acceleration.segment_offset(pair[0], pair[1], &precomp);
            total_time += segment_time;
        }

        while result_counter < result.len() {
            result[result_counter].pos = offset;
            result[result_counter].speed = self.end_speed();
            result_counter += 1;
        }
        result
    }

    /// Axis-aligned bounds of the whole trajectory, relative to the start
    /// position. Segments whose speed crosses zero get an extra breakpoint
    /// at the turning point.
    pub fn bounding_box(&self) -> BoundingBox {
        let acceleration = self.acceleration();
        let mut bbox = BoundingBox::from_point(Vector2::zeros());
        let mut offset = Vector2::zeros();
        for pair in self.profile.windows(2) {
            for j in 0..2 {
                if (pair[0].v[j] > 0.0) != (pair[1].v[j] > 0.0) {
                    let proportion =
                        pair[0].v[j].abs() / (pair[0].v[j].abs() + pair[1].v[j].abs());
                    let rel_time = (pair[1].t - pair[0].t) * proportion;
                    let zero_segment = VT {
                        v: Vector2::zeros(),
                        t: pair[0].t + rel_time,
                    };
                    let precomp = acceleration.precompute(pair[0], zero_segment);
                    let partial =
                        offset + acceleration.segment_offset(pair[0], zero_segment, &precomp);
                    bbox.merge_point(partial);
                }
            }
            let precomp = acceleration.precompute(pair[0], pair[1]);
            offset += acceleration.segment_offset(pair[0], pair[1], &precomp);
            bbox.merge_point(offset);
        }
        bbox
    }
}
