use serde::{Deserialize, Serialize};

use crate::Vector2;

/// Returns a vector perpendicular to the given vector (rotated clockwise).
pub fn perp(v: Vector2) -> Vector2 {
    Vector2::new(v.y, -v.x)
}

/// Twice the signed area of the triangle (a, b, c). Positive if c lies to the
/// left of the line a -> b.
pub fn det(a: Vector2, b: Vector2, c: Vector2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// A 2-D line segment.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct LineSegment {
    pub start: Vector2,
    pub end: Vector2,
}

impl LineSegment {
    pub fn new(start: Vector2, end: Vector2) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// Distance from a point to the segment (zero on the segment).
    pub fn distance_to_point(&self, p: Vector2) -> f64 {
        let dir = self.end - self.start;
        let len_sq = dir.norm_squared();
        if len_sq == 0.0 {
            return (p - self.start).norm();
        }
        let t = ((p - self.start).dot(&dir) / len_sq).clamp(0.0, 1.0);
        (p - (self.start + dir * t)).norm()
    }

    /// Distance between two segments (zero if they intersect).
    pub fn distance_to_segment(&self, other: &LineSegment) -> f64 {
        if self.intersects_segment(other) {
            return 0.0;
        }
        self.distance_to_point(other.start)
            .min(self.distance_to_point(other.end))
            .min(other.distance_to_point(self.start))
            .min(other.distance_to_point(self.end))
    }

    fn intersects_segment(&self, other: &LineSegment) -> bool {
        let d1 = det(other.start, other.end, self.start);
        let d2 = det(other.start, other.end, self.end);
        let d3 = det(self.start, self.end, other.start);
        let d4 = det(self.start, self.end, other.end);
        ((d1 > 0.0) != (d2 > 0.0)) && ((d3 > 0.0) != (d4 > 0.0))
    }
}

/// An axis-aligned bounding box.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vector2,
    pub max: Vector2,
}

impl BoundingBox {
    pub fn from_point(p: Vector2) -> Self {
        Self { min: p, max: p }
    }

    pub fn merge_point(&mut self, p: Vector2) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    pub fn contains(&self, p: Vector2, margin: f64) -> bool {
        p.x >= self.min.x - margin
            && p.x <= self.max.x + margin
            && p.y >= self.min.y - margin
            && p.y <= self.max.y + margin
    }
}

/// Finds the intersection of two lines given as point + direction.
///
/// Returns the parameters (t1, t2) such that the intersection is
/// `pos1 + dir1 * t1 == pos2 + dir2 * t2`, or None for (nearly) collinear
/// directions.
pub fn intersect_line_line(
    pos1: Vector2,
    dir1: Vector2,
    pos2: Vector2,
    dir2: Vector2,
) -> Option<(f64, f64)> {
    if perp(dir1).dot(&dir2).abs() / (dir1.norm() * dir2.norm()) < 1e-4 {
        return None;
    }
    let normal1 = perp(dir1);
    let normal2 = perp(dir2);
    let diff = pos2 - pos1;
    let t1 = normal2.dot(&diff) / normal2.dot(&dir1);
    let t2 = -normal1.dot(&diff) / normal1.dot(&dir2);
    Some((t1, t2))
}

/// Intersects the line `offset + lambda * dir` with a circle.
///
/// Returns up to two (point, lambda) pairs, where lambda is measured along
/// the normalized direction.
pub fn intersect_line_circle(
    offset: Vector2,
    dir: Vector2,
    center: Vector2,
    radius: f64,
) -> Vec<(Vector2, f64)> {
    let dir = match dir.try_normalize(f64::EPSILON) {
        Some(d) => d,
        None => return Vec::new(),
    };
    let const_part = offset - center;
    let a = dir.dot(&dir);
    let b = 2.0 * dir.dot(&const_part);
    let c = const_part.dot(&const_part) - radius * radius;

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    if disc < 1e-5 {
        let lambda = -b / (2.0 * a);
        return vec![(offset + dir * lambda, lambda)];
    }
    let lambda1 = (-b + disc.sqrt()) / (2.0 * a);
    let lambda2 = (-b - disc.sqrt()) / (2.0 * a);
    vec![
        (offset + dir * lambda1, lambda1),
        (offset + dir * lambda2, lambda2),
    ]
}

/// Intersects the segment from p1 to p2 with a circle, returning the
/// intersection closest to p1 if any lies on the segment.
pub fn intersect_segment_circle(
    p1: Vector2,
    p2: Vector2,
    center: Vector2,
    radius: f64,
) -> Option<Vector2> {
    let dist = (p2 - p1).norm();
    let mut intersections = intersect_line_circle(p1, p2 - p1, center, radius);
    intersections.sort_by(|a, b| a.1.total_cmp(&b.1));
    intersections
        .into_iter()
        .find(|(_, lambda)| *lambda >= 0.0 && *lambda <= dist)
        .map(|(p, _)| p)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_segment_point_distance() {
        let seg = LineSegment::new(Vector2::new(0.0, 0.0), Vector2::new(2.0, 0.0));
        assert_relative_eq!(seg.distance_to_point(Vector2::new(1.0, 1.0)), 1.0);
        assert_relative_eq!(
            seg.distance_to_point(Vector2::new(3.0, 0.0)),
            1.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(seg.distance_to_point(Vector2::new(1.0, 0.0)), 0.0);
    }

    #[test]
    fn test_segment_segment_distance() {
        let a = LineSegment::new(Vector2::new(0.0, 0.0), Vector2::new(2.0, 0.0));
        let crossing = LineSegment::new(Vector2::new(1.0, -1.0), Vector2::new(1.0, 1.0));
        assert_eq!(a.distance_to_segment(&crossing), 0.0);

        let parallel = LineSegment::new(Vector2::new(0.0, 1.0), Vector2::new(2.0, 1.0));
        assert_relative_eq!(a.distance_to_segment(&parallel), 1.0);
    }

    #[test]
    fn test_line_line_intersection() {
        let (t1, t2) = intersect_line_line(
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(-1.0, 1.0),
        )
        .unwrap();
        assert_relative_eq!(t1, 1.0, epsilon = 1e-10);
        assert_relative_eq!(t2, 1.0, epsilon = 1e-10);

        let parallel = intersect_line_line(
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(2.0, 2.0),
        );
        assert!(parallel.is_none());
    }

    #[test]
    fn test_line_circle_intersection() {
        let hits = intersect_line_circle(
            Vector2::new(-2.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::zeros(),
            1.0,
        );
        assert_eq!(hits.len(), 2);
        for (p, _) in &hits {
            assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-10);
        }

        let miss = intersect_line_circle(
            Vector2::new(-2.0, 5.0),
            Vector2::new(1.0, 0.0),
            Vector2::zeros(),
            1.0,
        );
        assert!(miss.is_empty());
    }

    #[test]
    fn test_segment_circle_closest_hit() {
        let hit = intersect_segment_circle(
            Vector2::new(-2.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::zeros(),
            1.0,
        )
        .unwrap();
        assert_relative_eq!(hit.x, -1.0, epsilon = 1e-9);

        let outside = intersect_segment_circle(
            Vector2::new(2.0, 0.0),
            Vector2::new(3.0, 0.0),
            Vector2::zeros(),
            1.0,
        );
        assert!(outside.is_none());
    }

    #[test]
    fn test_bounding_box_merge() {
        let mut bbox = BoundingBox::from_point(Vector2::new(1.0, 1.0));
        bbox.merge_point(Vector2::new(-1.0, 2.0));
        assert_eq!(bbox.min, Vector2::new(-1.0, 1.0));
        assert_eq!(bbox.max, Vector2::new(1.0, 2.0));
        assert!(bbox.contains(Vector2::new(0.0, 1.5), 0.0));
        assert!(!bbox.contains(Vector2::new(0.0, 3.0), 0.0));
    }
}
