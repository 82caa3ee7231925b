use kestrel_core::{LineSegment, Vector2};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::obstacles::Obstacle;

/// A cubic 2-D spline segment, tested against obstacles by sampling.
#[derive(Clone, Copy, Debug)]
pub struct Spline {
    pub t_start: f64,
    pub t_end: f64,
    /// Coefficients `a0..a3` of the x polynomial.
    pub x: [f64; 4],
    /// Coefficients `a0..a3` of the y polynomial.
    pub y: [f64; 4],
}

impl Spline {
    fn eval(&self, t: f64) -> Vector2 {
        let x = self.x[0] + (self.x[1] + (self.x[2] + self.x[3] * t) * t) * t;
        let y = self.y[0] + (self.y[1] + (self.y[2] + self.y[3] * t) * t) * t;
        Vector2::new(x, y)
    }
}

#[derive(Clone, Copy, Debug)]
struct Node {
    pos: Vector2,
    parent: Option<usize>,
    in_obstacle: bool,
}

/// A search tree rooted at the start or end point. Nearest-neighbor lookup
/// is a linear scan, which is plenty for the bounded iteration count.
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn new(root: Vector2, in_obstacle: bool) -> Self {
        Self {
            nodes: vec![Node {
                pos: root,
                parent: None,
                in_obstacle,
            }],
        }
    }

    fn nearest(&self, target: Vector2) -> usize {
        let mut best = 0;
        let mut best_dist = f64::MAX;
        for (i, node) in self.nodes.iter().enumerate() {
            let dist = (node.pos - target).norm_squared();
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
        }
        best
    }

    fn insert(&mut self, pos: Vector2, in_obstacle: bool, parent: usize) -> usize {
        self.nodes.push(Node {
            pos,
            parent: Some(parent),
            in_obstacle,
        });
        self.nodes.len() - 1
    }

    fn position(&self, idx: usize) -> Vector2 {
        self.nodes[idx].pos
    }

    fn in_obstacle(&self, idx: usize) -> bool {
        self.nodes[idx].in_obstacle
    }

    fn previous(&self, idx: usize) -> Option<usize> {
        self.nodes[idx].parent
    }
}

/// Waypoint-level fallback planner: a bidirectional RRT with special
/// movement rules for paths that start or end inside obstacles, plus a
/// waypoint cache that biases sampling toward previously useful points.
pub struct WaypointPlanner {
    rng: SmallRng,
    obstacles: Vec<Obstacle>,
    boundary_min: Vector2,
    boundary_max: Vector2,
    sample_min: Vector2,
    sample_max: Vector2,
    p_dest: f64,
    p_wp: f64,
    radius: f64,
    step_size: f64,
    cache_size: usize,
    waypoints: Vec<Vector2>,
    seed_targets: Vec<Vector2>,
}

impl WaypointPlanner {
    pub fn new(rng_seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(rng_seed),
            obstacles: Vec::new(),
            boundary_min: Vector2::new(-1.0, -1.0),
            boundary_max: Vector2::new(1.0, 1.0),
            sample_min: Vector2::new(-1.0, -1.0),
            sample_max: Vector2::new(1.0, 1.0),
            p_dest: 0.1,
            p_wp: 0.4,
            radius: -1.0,
            step_size: 0.1,
            cache_size: 200,
            waypoints: Vec::new(),
            seed_targets: Vec::new(),
        }
    }

    pub fn set_radius(&mut self, radius: f64) {
        self.radius = radius;
    }

    pub fn is_radius_valid(&self) -> bool {
        self.radius >= 0.0
    }

    pub fn set_boundary(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        self.boundary_min = Vector2::new(x1.min(x2), y1.min(y2));
        self.boundary_max = Vector2::new(x1.max(x2), y1.max(y2));
    }

    pub fn set_probabilities(&mut self, p_dest: f64, p_wp: f64) {
        self.p_dest = p_dest;
        self.p_wp = p_wp;
    }

    /// A target that is rastered into the start tree before the random
    /// search begins.
    pub fn add_seed_target(&mut self, target: Vector2) {
        self.seed_targets.push(target);
    }

    pub fn clear_obstacles(&mut self) {
        self.obstacles.clear();
        self.seed_targets.clear();
    }

    pub fn add_obstacle(&mut self, obstacle: Obstacle) {
        self.obstacles.push(obstacle);
    }

    pub fn reset(&mut self) {
        self.clear_obstacles();
        self.waypoints.clear();
    }

    fn point_in_playfield(&self, point: Vector2) -> bool {
        point.x - self.radius >= self.boundary_min.x
            && point.x + self.radius <= self.boundary_max.x
            && point.y - self.radius >= self.boundary_min.y
            && point.y + self.radius <= self.boundary_max.y
    }

    /// How far the robot sticks out of the playfield.
    fn outside_playfield_coverage(&self, point: Vector2) -> f64 {
        let r = self.radius;
        0.0f64
            .max(self.boundary_min.x - point.x + r)
            .max(point.x + r - self.boundary_max.x)
            .max(self.boundary_min.y - point.y + r)
            .max(point.y + r - self.boundary_max.y)
    }

    fn test_point(&self, v: Vector2, obstacles: &[&Obstacle]) -> bool {
        if !self.point_in_playfield(v) {
            return false;
        }
        obstacles.iter().all(|o| o.distance(v) >= self.radius)
    }

    fn test_segment_with(&self, segment: &LineSegment, obstacles: &[&Obstacle]) -> bool {
        obstacles
            .iter()
            .all(|o| o.distance_to_segment(segment) >= self.radius)
    }

    fn test_segment(&self, segment: &LineSegment) -> bool {
        let all: Vec<&Obstacle> = self.obstacles.iter().collect();
        self.test_segment_with(segment, &all)
    }

    fn test_point_all(&self, v: Vector2) -> bool {
        let all: Vec<&Obstacle> = self.obstacles.iter().collect();
        self.test_point(v, &all)
    }

    /// Sum of penetration depths into the given obstacles, each capped at
    /// twice the robot radius.
    fn obstacle_coverage(&self, v: Vector2, obstacles: &[&Obstacle]) -> f64 {
        let mut sum = 0.0;
        for o in obstacles {
            let d = o.distance(v) - self.radius;
            if d < 0.0 {
                sum += (2.0 * self.radius).min(-d);
            }
        }
        sum
    }

    /// Movement rules for edges starting inside obstacles: never further
    /// out of the playfield, the penetration into the start obstacles must
    /// weakly decrease, and no other obstacle may be entered.
    fn check_movement_relative_to_obstacles(&self, segment: &LineSegment) -> bool {
        let p = segment.start;
        let mut step = segment.end - segment.start;
        let l = step.norm();

        if l == 0.0 {
            return false;
        }

        // only allow moving further inside the field
        if self.outside_playfield_coverage(segment.end) > self.outside_playfield_coverage(segment.start)
        {
            return false;
        }

        // split the obstacle list, the start obstacles are grouped under
        // the highest priority one covering the start
        let mut start_obstacles: Vec<&Obstacle> = Vec::new();
        let mut free_obstacles: Vec<&Obstacle> = Vec::new();
        let mut max_obstacle_prio = i32::MIN;
        for o in &self.obstacles {
            if o.distance(p) < self.radius {
                if o.prio() > max_obstacle_prio {
                    start_obstacles.clear();
                    max_obstacle_prio = o.prio();
                }
                start_obstacles.push(o);
            } else {
                free_obstacles.push(o);
            }
        }
        let other_obstacles: Vec<&Obstacle> = free_obstacles
            .into_iter()
            .filter(|o| o.prio() >= max_obstacle_prio)
            .collect();

        if start_obstacles.len() == 1 {
            let step_size = 1e-3f64.min(l);
            step *= step_size / l;

            // the obstacles are convex, so it is enough to check that the
            // penetration does not grow over one small step
            let start_sum = self.obstacle_coverage(p, &start_obstacles);
            let step_sum = self.obstacle_coverage(p + step, &start_obstacles);
            if step_sum > start_sum {
                return false;
            }
        } else if start_obstacles.len() > 1 {
            let mut step_size = 2e-3;
            let num_steps = (l / step_size).ceil() as usize;
            step_size = l / num_steps as f64;
            if l > step_size {
                step *= step_size / l;
            }

            let mut p = p;
            let mut last_sum = f64::INFINITY;
            for i in 0..=num_steps {
                let sum = self.obstacle_coverage(p, &start_obstacles);
                if sum > last_sum {
                    return false;
                } else if sum == 0.0 && i < num_steps {
                    if !self.test_segment_with(
                        &LineSegment::new(p, segment.end),
                        &start_obstacles,
                    ) {
                        return false;
                    }
                    break;
                }
                last_sum = sum;
                p += step;
            }
        }
        // new obstacles must not be entered
        self.test_segment_with(segment, &other_obstacles)
    }

    fn random_state(&mut self) -> Vector2 {
        Vector2::new(
            self.rng
                .gen_range(self.sample_min.x..=self.sample_max.x),
            self.rng
                .gen_range(self.sample_min.y..=self.sample_max.y),
        )
    }

    fn get_target(&mut self, end: Vector2) -> Vector2 {
        let p: f64 = self.rng.gen();
        if p < self.p_dest {
            end
        } else if p < self.p_dest + self.p_wp && !self.waypoints.is_empty() {
            let idx = self.rng.gen_range(0..self.waypoints.len());
            self.waypoints[idx]
        } else {
            self.random_state()
        }
    }

    fn add_to_waypoint_cache(&mut self, pos: Vector2) {
        if self.waypoints.len() < self.cache_size {
            self.waypoints.push(pos);
        } else {
            let idx = self.rng.gen_range(0..self.cache_size);
            self.waypoints[idx] = pos;
        }
    }

    /// Extends the tree from `from_node` towards `to` by at most one step.
    fn extend(&mut self, tree: &mut Tree, from_node: usize, to: Vector2) -> Option<usize> {
        let from = tree.position(from_node);
        let in_obstacle = tree.in_obstacle(from_node);
        let mut d = to - from;
        let l = d.norm();
        if l == 0.0 {
            // point already reached
            return None;
        } else if l > self.step_size {
            d *= self.step_size / l;
        }

        let extended = from + d;

        let success = if in_obstacle {
            // the new point is only valid if it gets the robot out of the
            // obstacles
            self.check_movement_relative_to_obstacles(&LineSegment::new(from, extended))
        } else {
            self.point_in_playfield(extended) && self.test_segment(&LineSegment::new(from, extended))
        };

        if !success {
            return None;
        }

        // once every obstacle was left, reentering one is impossible
        let new_in_obstacle = in_obstacle && !self.test_point_all(extended);
        Some(tree.insert(extended, new_in_obstacle, from_node))
    }

    fn raster_path(&mut self, tree: &mut Tree, segment: &LineSegment, mut last_node: usize) {
        let steps = (segment.length() / self.step_size).ceil() as usize;
        for _ in 0..steps {
            match self.extend(tree, last_node, segment.end) {
                Some(node) => last_node = node,
                None => return,
            }
        }
    }

    /// Finds the point on the segment closest to its end that is still
    /// reachable from the segment start, by binary search.
    fn find_valid_point(&self, segment: &LineSegment) -> Vector2 {
        let line_start = segment.start;
        let mut start = segment.start;
        let mut end = segment.end;
        let mut dist = (start - end).norm();

        while dist > 0.001 {
            let mid = (end + start) / 2.0;
            if self.point_in_playfield(mid)
                && self.test_segment(&LineSegment::new(line_start, mid))
            {
                start = mid;
            } else {
                end = mid;
            }
            dist /= 2.0;
        }
        (start + end) / 2.0
    }

    fn simplify(&self, points: &mut Vec<Vector2>) {
        // every point before this index is inside the start obstacles
        let mut split = points.len();
        for (i, point) in points.iter().enumerate() {
            if self.point_in_playfield(*point) && self.test_point_all(*point) {
                split = i;
                break;
            }
        }

        let mut start_index = 0;
        while start_index < points.len() {
            let mut end_index = points.len().saturating_sub(1);
            while end_index > start_index + 1 {
                // common points in start and end tree, remove everything
                // in between
                if points[start_index] == points[end_index] {
                    let removed = end_index - start_index;
                    split -= split.saturating_sub(start_index).min(removed);
                    points.drain(start_index..end_index);
                    break;
                }
                // if the start point is inside an obstacle, check that the
                // robot still leaves it, otherwise use the plain test
                let seg = LineSegment::new(points[start_index], points[end_index]);
                let passable = if start_index < split {
                    self.check_movement_relative_to_obstacles(&seg)
                } else {
                    self.test_segment(&seg)
                };
                if passable {
                    let removed = end_index - start_index - 1;
                    split -= split.saturating_sub(start_index + 1).min(removed);
                    points.drain(start_index + 1..end_index);
                    break;
                }
                end_index -= 1;
            }
            start_index += 1;
        }
    }

    fn cut_corners(&self, points: &mut Vec<Vector2>) {
        let mut i = 1;
        while i + 1 < points.len() {
            let left = points[i - 1];
            let mid = points[i];
            let right = points[i + 1];

            let diff_left = left - mid;
            let diff_right = right - mid;
            let max_cut = diff_left.norm().min(diff_right.norm());
            let diff_left = match diff_left.try_normalize(f64::EPSILON) {
                Some(d) => d,
                None => {
                    i += 1;
                    continue;
                }
            };
            let diff_right = match diff_right.try_normalize(f64::EPSILON) {
                Some(d) => d,
                None => {
                    i += 1;
                    continue;
                }
            };

            // binary search for the largest symmetric cut; there may be
            // several valid ranges, this settles for a local one
            let mut step = max_cut / 2.0;
            let mut dist = step;
            let mut last_good = 0.0;
            while step > 0.01 {
                let line = LineSegment::new(mid + diff_left * dist, mid + diff_right * dist);
                step /= 2.0;
                // paths into the playfield may be smoothed, so the corner
                // points are only tested against obstacles
                if self.test_segment(&line) {
                    last_good = dist;
                    dist += step;
                } else {
                    dist -= step;
                }
            }

            if last_good > 0.0 {
                points[i] = mid + diff_left * last_good;
                i += 1;
                points.insert(i, mid + diff_right * last_good);
            }
            i += 1;
        }
    }

    /// Checks a cubic spline for collisions by sampling 10 equispaced
    /// parameters.
    pub fn test_spline(&self, spline: &Spline) -> bool {
        let start = spline.t_start;
        let end = spline.t_end;
        if !start.is_finite() || !end.is_finite() || end <= start {
            return false;
        }
        const STEPS: usize = 10;
        let step_size = (end - start) / STEPS as f64;

        let points: Vec<Vector2> = (0..STEPS)
            .map(|i| spline.eval(start + i as f64 * step_size))
            .collect();

        for pair in points.windows(2) {
            if pair[0] == pair[1] {
                continue;
            }
            if !self.test_segment(&LineSegment::new(pair[0], pair[1])) {
                return false;
            }
        }
        true
    }

    /// Plans a waypoint path from `start` to `end`.
    pub fn get(&mut self, start: Vector2, end: Vector2) -> Vec<Vector2> {
        const EXTEND_MULTI_STEPS: usize = 4;
        const ITERATIONS: usize = 300;

        // symmetric sampling around the middle between start and end that
        // includes the complete field
        let middle = (start + end) / 2.0;
        let x_half = (middle.x - self.boundary_min.x).max(self.boundary_max.x - middle.x);
        let y_half = (middle.y - self.boundary_min.y).max(self.boundary_max.y - middle.y);
        self.sample_min = Vector2::new(middle.x - x_half, middle.y - y_half);
        self.sample_max = Vector2::new(middle.x + x_half, middle.y + y_half);

        let starting_in_obstacle = !self.point_in_playfield(start) || !self.test_point_all(start);
        let ending_in_obstacle = !self.point_in_playfield(end) || !self.test_point_all(end);

        let mut tree_start = Tree::new(start, starting_in_obstacle);
        let mut tree_end = Tree::new(end, ending_in_obstacle);

        let mut path_completed = false;
        let mut merger_pos: Option<Vector2> = None;

        // shortcuts only apply with free start and end points
        if !starting_in_obstacle && !ending_in_obstacle {
            if start == end {
                path_completed = true;
            } else if self.test_segment(&LineSegment::new(start, end)) {
                path_completed = true;
                // raster the path for the waypoint cache
                let nearest = tree_start.nearest(start);
                self.raster_path(&mut tree_start, &LineSegment::new(start, end), nearest);
            }
        }

        if !path_completed && !self.seed_targets.is_empty() {
            for seed_target in self.seed_targets.clone() {
                let nearest = tree_start.nearest(start);
                self.raster_path(
                    &mut tree_start,
                    &LineSegment::new(start, seed_target),
                    nearest,
                );
            }
        }

        // the trees are rooted at the start and the end, so the search
        // leaves obstacles at both sides before trying to merge
        let mut a_is_start = true;
        for _ in 1..ITERATIONS {
            if path_completed {
                break;
            }
            let target_hint = if a_is_start { end } else { start };
            let mut target = self.get_target(target_hint);

            let (tree_a, tree_b) = if a_is_start {
                (&mut tree_start, &mut tree_end)
            } else {
                (&mut tree_end, &mut tree_start)
            };

            let nearest = tree_a.nearest(target);
            if let Some(extended) = self.extend(tree_a, nearest, target) {
                // extend the other tree towards the new point
                target = tree_a.position(extended);
                let mut nearest_b = tree_b.nearest(target);

                for _ in 0..EXTEND_MULTI_STEPS {
                    match self.extend(tree_b, nearest_b, target) {
                        Some(node) => {
                            nearest_b = node;
                            let dist = (tree_b.position(node) - target).norm();
                            if dist <= 1e-5 && !tree_b.in_obstacle(node) {
                                path_completed = true;
                                merger_pos = Some(tree_b.position(node));
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
            a_is_start = !a_is_start;
        }

        let (mid, start_nearest) = match merger_pos {
            Some(pos) => (pos, tree_start.nearest(pos)),
            None => {
                // the trees did not connect, just use the start tree
                let nearest = tree_start.nearest(end);
                (tree_start.position(nearest), nearest)
            }
        };

        let mut points: Vec<Vector2> = Vec::new();
        {
            let mut node = Some(start_nearest);
            while let Some(idx) = node {
                points.push(tree_start.position(idx));
                node = tree_start.previous(idx);
            }
            points.reverse();
        }

        let mut remaining_end_node = None;
        if merger_pos.is_some() {
            // traverse the end tree, skipping the merger node, until a node
            // inside an obstacle is hit
            let mut node = tree_end.previous(tree_end.nearest(mid));
            while let Some(idx) = node {
                if tree_end.in_obstacle(idx) {
                    break;
                }
                points.push(tree_end.position(idx));
                node = tree_end.previous(idx);
            }
            remaining_end_node = node;
            // get as close to the target as possible if it is not reached
            if let (Some(idx), Some(&line_start)) = (node, points.last()) {
                let best_pos = self.find_valid_point(&LineSegment::new(
                    line_start,
                    tree_end.position(idx),
                ));
                if line_start != best_pos
                    && self.point_in_playfield(best_pos)
                    && self.test_segment(&LineSegment::new(line_start, best_pos))
                {
                    points.push(best_pos);
                }
            }
        }

        // keep fewer waypoints for longer paths
        let normalized_waypoint_count = ((start - end).norm() * 1.05 / self.step_size).ceil();
        let keep_probability = if points.is_empty() {
            0.0
        } else {
            (normalized_waypoint_count / points.len() as f64).clamp(0.0, 1.0)
        };
        for pos in points.clone() {
            if self.rng.gen::<f64>() <= keep_probability {
                self.add_to_waypoint_cache(pos);
            }
        }
        let mut node = remaining_end_node;
        while let Some(idx) = node {
            self.add_to_waypoint_cache(tree_end.position(idx));
            node = tree_end.previous(idx);
        }

        // cut corners several times
        for _ in 0..3 {
            self.simplify(&mut points);
            self.cut_corners(&mut points);
        }
        self.simplify(&mut points);

        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> WaypointPlanner {
        let mut p = WaypointPlanner::new(7);
        p.set_boundary(-3.0, -3.0, 3.0, 3.0);
        p.set_radius(0.09);
        p
    }

    fn path_is_collision_free(planner: &WaypointPlanner, points: &[Vector2]) -> bool {
        points
            .windows(2)
            .all(|pair| planner.test_segment(&LineSegment::new(pair[0], pair[1])))
    }

    #[test]
    fn test_direct_path_when_free() {
        let mut planner = planner();
        let start = Vector2::new(-1.0, 0.0);
        let end = Vector2::new(1.0, 0.0);
        let points = planner.get(start, end);
        assert!(!points.is_empty());
        assert!((points[0] - start).norm() < 1e-9);
        assert!((points.last().unwrap() - end).norm() < 0.15);
        assert!(path_is_collision_free(&planner, &points));
    }

    #[test]
    fn test_path_avoids_blocking_circle() {
        let mut planner = planner();
        planner.add_obstacle(Obstacle::circle(Vector2::zeros(), 0.4, 1));
        let start = Vector2::new(-1.5, 0.0);
        let end = Vector2::new(1.5, 0.0);
        let points = planner.get(start, end);
        assert!(points.len() >= 2);
        assert!((points[0] - start).norm() < 1e-9);
        assert!((points.last().unwrap() - end).norm() < 0.15);
        for pair in points.windows(2) {
            let seg = LineSegment::new(pair[0], pair[1]);
            assert!(
                seg.distance_to_point(Vector2::zeros()) >= 0.4,
                "path cuts through the obstacle"
            );
        }
    }

    #[test]
    fn test_start_in_obstacle_leaves_it() {
        let mut planner = planner();
        planner.add_obstacle(Obstacle::circle(Vector2::new(-1.0, 0.0), 0.3, 1));
        let start = Vector2::new(-1.0, 0.0);
        let end = Vector2::new(1.5, 0.0);
        let points = planner.get(start, end);
        assert!(points.len() >= 2);
        // the penetration depth must never grow along the path
        let all: Vec<&Obstacle> = planner.obstacles.iter().collect();
        let mut last_coverage = f64::INFINITY;
        for p in &points {
            let coverage = planner.obstacle_coverage(*p, &all);
            assert!(coverage <= last_coverage + 1e-6, "re-entered the obstacle");
            if coverage == 0.0 {
                break;
            }
            last_coverage = coverage;
        }
        assert!((points.last().unwrap() - end).norm() < 0.15);
    }

    #[test]
    fn test_waypoint_cache_fills() {
        let mut planner = planner();
        planner.add_obstacle(Obstacle::circle(Vector2::zeros(), 0.4, 1));
        planner.get(Vector2::new(-1.5, 0.0), Vector2::new(1.5, 0.0));
        assert!(!planner.waypoints.is_empty());
        assert!(planner.waypoints.len() <= 200);
    }

    #[test]
    fn test_spline_collision() {
        let mut planner = planner();
        planner.add_obstacle(Obstacle::circle(Vector2::zeros(), 0.4, 1));
        // straight line through the obstacle
        let blocked = Spline {
            t_start: 0.0,
            t_end: 1.0,
            x: [-1.0, 2.0, 0.0, 0.0],
            y: [0.0, 0.0, 0.0, 0.0],
        };
        assert!(!planner.test_spline(&blocked));
        // straight line well above it
        let free = Spline {
            t_start: 0.0,
            t_end: 1.0,
            x: [-1.0, 2.0, 0.0, 0.0],
            y: [1.0, 0.0, 0.0, 0.0],
        };
        assert!(planner.test_spline(&free));

        let degenerate = Spline {
            t_start: 1.0,
            t_end: 0.0,
            x: [0.0; 4],
            y: [0.0; 4],
        };
        assert!(!planner.test_spline(&degenerate));
    }
}
