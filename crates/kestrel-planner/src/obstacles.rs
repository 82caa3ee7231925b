use kestrel_core::{det, LineSegment, Vector2};
use serde::{Deserialize, Serialize};

/// A static obstacle. Distances are signed: negative inside, at least zero
/// outside. All variants are convex (the triangle stroke included), which
/// the in-obstacle movement rules of the waypoint planner rely on.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub enum Obstacle {
    Circle {
        center: Vector2,
        radius: f64,
        prio: i32,
    },
    Rect {
        bottom_left: Vector2,
        top_right: Vector2,
        prio: i32,
    },
    Triangle {
        p1: Vector2,
        p2: Vector2,
        p3: Vector2,
        line_width: f64,
        prio: i32,
    },
    Line {
        segment: LineSegment,
        width: f64,
        prio: i32,
    },
}

impl Obstacle {
    pub fn circle(center: Vector2, radius: f64, prio: i32) -> Self {
        Obstacle::Circle {
            center,
            radius,
            prio,
        }
    }

    pub fn rect(c1: Vector2, c2: Vector2, prio: i32) -> Self {
        Obstacle::Rect {
            bottom_left: Vector2::new(c1.x.min(c2.x), c1.y.min(c2.y)),
            top_right: Vector2::new(c1.x.max(c2.x), c1.y.max(c2.y)),
            prio,
        }
    }

    /// Builds a triangle obstacle, reordering the corners counter-clockwise.
    pub fn triangle(a: Vector2, b: Vector2, c: Vector2, line_width: f64, prio: i32) -> Self {
        if det(a, b, c) > 0.0 {
            Obstacle::Triangle {
                p1: a,
                p2: b,
                p3: c,
                line_width,
                prio,
            }
        } else {
            Obstacle::Triangle {
                p1: a,
                p2: c,
                p3: b,
                line_width,
                prio,
            }
        }
    }

    pub fn line(p1: Vector2, p2: Vector2, width: f64, prio: i32) -> Self {
        Obstacle::Line {
            segment: LineSegment::new(p1, p2),
            width,
            prio,
        }
    }

    pub fn prio(&self) -> i32 {
        match *self {
            Obstacle::Circle { prio, .. }
            | Obstacle::Rect { prio, .. }
            | Obstacle::Triangle { prio, .. }
            | Obstacle::Line { prio, .. } => prio,
        }
    }

    /// Signed distance from a point to the obstacle boundary.
    pub fn distance(&self, v: Vector2) -> f64 {
        match *self {
            Obstacle::Circle { center, radius, .. } => (v - center).norm() - radius,
            Obstacle::Rect {
                bottom_left,
                top_right,
                ..
            } => {
                let dist_x = (bottom_left.x - v.x).max(v.x - top_right.x);
                let dist_y = (bottom_left.y - v.y).max(v.y - top_right.y);
                if dist_x >= 0.0 && dist_y >= 0.0 {
                    // distance to a corner
                    (dist_x * dist_x + dist_y * dist_y).sqrt()
                } else if dist_x < 0.0 && dist_y < 0.0 {
                    // inside
                    dist_x.max(dist_y)
                } else if dist_x < 0.0 {
                    dist_y
                } else {
                    dist_x
                }
            }
            Obstacle::Triangle {
                p1,
                p2,
                p3,
                line_width,
                ..
            } => {
                // positive det == left of the (counter-clockwise) side
                let det1 = det(p2, p3, v) / (p3 - p2).norm();
                let det2 = det(p3, p1, v) / (p1 - p3).norm();
                let det3 = det(p1, p2, v) / (p2 - p1).norm();

                let distance = if det1 >= 0.0 && det2 >= 0.0 && det3 >= 0.0 {
                    // inside: negative distance to the closest side
                    -det1.min(det2).min(det3)
                } else if det1 * det2 * det3 < 0.0 {
                    // closest to one side
                    -det1.min(det2).min(det3)
                } else if det1 > 0.0 {
                    (p1 - v).norm()
                } else if det2 > 0.0 {
                    (p2 - v).norm()
                } else {
                    (p3 - v).norm()
                };
                distance - line_width
            }
            Obstacle::Line { segment, width, .. } => segment.distance_to_point(v) - width,
        }
    }

    /// Signed distance from a line segment to the obstacle.
    pub fn distance_to_segment(&self, seg: &LineSegment) -> f64 {
        match *self {
            Obstacle::Circle { center, radius, .. } => seg.distance_to_point(center) - radius,
            Obstacle::Rect {
                bottom_left,
                top_right,
                ..
            } => {
                let inside = |p: Vector2| {
                    p.x >= bottom_left.x
                        && p.x <= top_right.x
                        && p.y >= bottom_left.y
                        && p.y <= top_right.y
                };
                if inside(seg.start) || inside(seg.end) {
                    return 0.0;
                }
                let bottom_right = Vector2::new(top_right.x, bottom_left.y);
                let top_left = Vector2::new(bottom_left.x, top_right.y);
                let sides = [
                    LineSegment::new(top_left, top_right),
                    LineSegment::new(bottom_left, bottom_right),
                    LineSegment::new(top_left, bottom_left),
                    LineSegment::new(top_right, bottom_right),
                ];
                sides
                    .iter()
                    .map(|side| seg.distance_to_segment(side))
                    .fold(f64::MAX, f64::min)
            }
            Obstacle::Triangle {
                p1,
                p2,
                p3,
                line_width,
                ..
            } => {
                let sides = [
                    LineSegment::new(p1, p2),
                    LineSegment::new(p2, p3),
                    LineSegment::new(p3, p1),
                ];
                let d: Vec<f64> = sides.iter().map(|s| s.distance_to_segment(seg)).collect();
                if d[0] * d[1] * d[2] == 0.0 {
                    return 0.0;
                }
                // entirely inside the triangle
                if self.distance(seg.start) < 0.0 && self.distance(seg.end) < 0.0 {
                    return 0.0;
                }
                (d[0].min(d[1]).min(d[2]) - line_width).max(0.0)
            }
            Obstacle::Line { segment, width, .. } => seg.distance_to_segment(&segment) - width,
        }
    }
}

/// A circle moving with constant acceleration, active on `[t0, t1]`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct MovingCircle {
    pub start_pos: Vector2,
    pub speed: Vector2,
    pub acc: Vector2,
    pub start_time: f64,
    pub end_time: f64,
    pub radius: f64,
    pub prio: i32,
}

impl MovingCircle {
    fn center_at(&self, time: f64) -> Vector2 {
        let t = time - self.start_time;
        self.start_pos + self.speed * t + self.acc * (0.5 * t * t)
    }

    pub fn intersects(&self, pos: Vector2, time: f64) -> bool {
        if time < self.start_time || time > self.end_time {
            return false;
        }
        (self.center_at(time) - pos).norm_squared() < self.radius * self.radius
    }

    /// Distance at a point in time; infinity outside the active interval.
    pub fn distance(&self, pos: Vector2, time: f64) -> f64 {
        if time < self.start_time || time > self.end_time {
            return f64::MAX;
        }
        (self.center_at(time) - pos).norm() - self.radius
    }

    /// Minimum distance to a segment traversed during `[time, time + dt]`,
    /// reduced to sampled point-time tests.
    pub fn distance_to_segment(&self, seg: &LineSegment, time: f64, dt: f64) -> f64 {
        const SAMPLES: usize = 10;
        let mut min = f64::MAX;
        for i in 0..SAMPLES {
            let f = i as f64 / (SAMPLES - 1) as f64;
            let pos = seg.start + (seg.end - seg.start) * f;
            min = min.min(self.distance(pos, time + dt * f));
        }
        min
    }
}

/// A line segment whose endpoints move with constant acceleration.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct MovingLine {
    pub start_pos1: Vector2,
    pub speed1: Vector2,
    pub acc1: Vector2,
    pub start_pos2: Vector2,
    pub speed2: Vector2,
    pub acc2: Vector2,
    pub start_time: f64,
    pub end_time: f64,
    pub width: f64,
    pub prio: i32,
}

impl MovingLine {
    fn endpoints_at(&self, time: f64) -> (Vector2, Vector2) {
        let t = time - self.start_time;
        (
            self.start_pos1 + self.speed1 * t + self.acc1 * (0.5 * t * t),
            self.start_pos2 + self.speed2 * t + self.acc2 * (0.5 * t * t),
        )
    }

    pub fn intersects(&self, pos: Vector2, time: f64) -> bool {
        if time < self.start_time || time > self.end_time {
            return false;
        }
        let (p1, p2) = self.endpoints_at(time);
        LineSegment::new(p1, p2).distance_to_point(pos) < self.width
    }

    pub fn distance(&self, pos: Vector2, time: f64) -> f64 {
        if time < self.start_time || time > self.end_time {
            return f64::MAX;
        }
        let (p1, p2) = self.endpoints_at(time);
        LineSegment::new(p1, p2).distance_to_point(pos) - self.width
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_circle_signed_distance() {
        let c = Obstacle::circle(Vector2::zeros(), 1.0, 1);
        assert_relative_eq!(c.distance(Vector2::new(2.0, 0.0)), 1.0);
        assert_relative_eq!(c.distance(Vector2::new(0.5, 0.0)), -0.5);
    }

    #[test]
    fn test_rect_distance_regions() {
        let r = Obstacle::rect(Vector2::new(0.0, 0.0), Vector2::new(2.0, 1.0), 1);
        // inside
        assert!(r.distance(Vector2::new(1.0, 0.5)) < 0.0);
        // next to a side
        assert_relative_eq!(r.distance(Vector2::new(1.0, 2.0)), 1.0);
        // next to a corner
        assert_relative_eq!(
            r.distance(Vector2::new(3.0, 2.0)),
            (2.0f64).sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_triangle_orientation_independent() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(2.0, 0.0);
        let c = Vector2::new(0.0, 2.0);
        let ccw = Obstacle::triangle(a, b, c, 0.0, 1);
        let cw = Obstacle::triangle(a, c, b, 0.0, 1);
        let inside = Vector2::new(0.4, 0.4);
        assert!(ccw.distance(inside) < 0.0);
        assert_relative_eq!(ccw.distance(inside), cw.distance(inside), epsilon = 1e-12);
        let outside = Vector2::new(3.0, 0.0);
        assert_relative_eq!(ccw.distance(outside), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_line_obstacle() {
        let l = Obstacle::line(Vector2::new(0.0, 0.0), Vector2::new(2.0, 0.0), 0.1, 1);
        assert_relative_eq!(l.distance(Vector2::new(1.0, 1.0)), 0.9);
        assert!(l.distance(Vector2::new(1.0, 0.05)) < 0.0);
    }

    #[test]
    fn test_moving_circle_active_window() {
        let m = MovingCircle {
            start_pos: Vector2::zeros(),
            speed: Vector2::new(1.0, 0.0),
            acc: Vector2::zeros(),
            start_time: 1.0,
            end_time: 3.0,
            radius: 0.5,
            prio: 2,
        };
        assert!(!m.intersects(Vector2::zeros(), 0.5));
        assert!(m.intersects(Vector2::new(1.0, 0.0), 2.0));
        assert_eq!(m.distance(Vector2::zeros(), 5.0), f64::MAX);
        assert_relative_eq!(m.distance(Vector2::new(2.0, 0.0), 2.0), 0.5);
    }

    #[test]
    fn test_moving_line_follows_endpoints() {
        let m = MovingLine {
            start_pos1: Vector2::new(0.0, -1.0),
            speed1: Vector2::new(1.0, 0.0),
            acc1: Vector2::zeros(),
            start_pos2: Vector2::new(0.0, 1.0),
            speed2: Vector2::new(1.0, 0.0),
            acc2: Vector2::zeros(),
            start_time: 0.0,
            end_time: 10.0,
            width: 0.1,
            prio: 1,
        };
        assert!(m.intersects(Vector2::new(2.0, 0.0), 2.0));
        assert!(!m.intersects(Vector2::new(0.0, 0.0), 2.0));
        assert_relative_eq!(m.distance(Vector2::new(3.0, 0.0), 2.0), 0.9);
    }

    #[test]
    fn test_segment_distance_samples_time() {
        let m = MovingCircle {
            start_pos: Vector2::new(0.0, 0.0),
            speed: Vector2::new(1.0, 0.0),
            acc: Vector2::zeros(),
            start_time: 0.0,
            end_time: 10.0,
            radius: 0.2,
            prio: 1,
        };
        // the robot path crosses the obstacle's future position
        let seg = LineSegment::new(Vector2::new(1.0, -1.0), Vector2::new(1.0, 1.0));
        let d = m.distance_to_segment(&seg, 0.5, 1.0);
        assert!(d < 0.3);
    }
}
