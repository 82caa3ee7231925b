use kestrel_core::{PlannerSettings, Vector2};
use kestrel_planner::{Obstacle, PlanInput, TrajectoryPlanner};

fn planner_with(settings: PlannerSettings) -> TrajectoryPlanner {
    let mut planner = TrajectoryPlanner::new(42, settings);
    planner.set_boundary(-5.0, -5.0, 5.0, 5.0);
    planner
}

fn input(s0: Vector2, v0: Vector2, s1: Vector2, v1: Vector2) -> PlanInput {
    PlanInput {
        s0,
        v0,
        s1,
        v1,
        max_speed: 3.5,
        acceleration: 3.0,
    }
}

#[test]
fn direct_plan_succeeds() {
    let mut planner = planner_with(PlannerSettings::default());
    let result = planner.plan(input(
        Vector2::new(0.0, 0.0),
        Vector2::zeros(),
        Vector2::new(1.0, 0.0),
        Vector2::zeros(),
    ));
    assert!(!result.is_empty());
    let last = result.last().unwrap();
    assert!(
        (last.pos - Vector2::new(1.0, 0.0)).norm() < 0.01,
        "end position off target: {}",
        last.pos
    );
    // generous bound over the bang-bang optimum, leaving room for the
    // exponential slowdown
    assert!(last.time < 2.0 * (2.0f64 / 3.0).sqrt() + 0.3, "too slow: {}", last.time);
    // samples are equally spaced and the start matches
    assert!((result[0].pos - Vector2::zeros()).norm() < 1e-9);
    let dt = result[1].time - result[0].time;
    for pair in result.windows(2) {
        assert!((pair[1].time - pair[0].time - dt).abs() < 1e-6);
    }
}

#[test]
fn kinematic_feasibility_of_result() {
    let mut planner = planner_with(PlannerSettings::default());
    let acceleration = 3.0;
    let result = planner.plan(input(
        Vector2::new(-1.0, -0.5),
        Vector2::new(0.5, 0.2),
        Vector2::new(2.0, 1.0),
        Vector2::zeros(),
    ));
    assert!(!result.is_empty());
    for pair in result.windows(2) {
        let dt = pair[1].time - pair[0].time;
        if dt < 1e-6 {
            continue;
        }
        let acc = (pair[1].speed - pair[0].speed).norm() / dt;
        // per-axis limits allow sqrt(2) times the scalar acceleration
        assert!(
            acc <= acceleration * std::f64::consts::SQRT_2 * 1.05,
            "acceleration {} exceeds the limit",
            acc
        );
        assert!(pair[1].speed.norm() <= 3.5 * std::f64::consts::SQRT_2 * 1.01);
    }
}

#[test]
fn end_in_obstacle_stops_nearby() {
    let mut planner = planner_with(PlannerSettings::default());
    planner.add_obstacle(Obstacle::circle(Vector2::new(1.0, 0.0), 0.2, 1));
    let result = planner.plan(input(
        Vector2::new(0.0, 0.0),
        Vector2::zeros(),
        Vector2::new(1.0, 0.0),
        Vector2::zeros(),
    ));
    assert!(!result.is_empty());
    let last = result.last().unwrap();
    let end_error = (last.pos - Vector2::new(1.0, 0.0)).norm();
    assert!(end_error < 0.45, "stopped too far from target: {}", end_error);
    // no sample of the path may lie inside the circle itself
    for point in &result {
        assert!(
            (point.pos - Vector2::new(1.0, 0.0)).norm() >= 0.2 - 1e-6,
            "sample {} inside the obstacle",
            point.pos
        );
    }
}

#[test]
fn start_in_obstacle_escapes() {
    let mut planner = planner_with(PlannerSettings::default());
    planner.add_obstacle(Obstacle::circle(Vector2::new(0.0, 0.0), 0.15, 1));
    let result = planner.plan(input(
        Vector2::new(0.0, 0.0),
        Vector2::zeros(),
        Vector2::new(2.0, 0.0),
        Vector2::zeros(),
    ));
    assert!(!result.is_empty(), "escape must always return a trajectory");
    // the escape moves monotonically away from the obstacle center
    let mut last_dist = 0.0;
    for point in &result {
        let dist = point.pos.norm();
        assert!(
            dist >= last_dist - 1e-6,
            "distance to the obstacle center decreased"
        );
        last_dist = dist;
    }
    // the trajectory actually leaves the inflated obstacle
    assert!(last_dist > 0.15, "did not leave the obstacle");
}

#[test]
fn zero_distance_plan_is_zero_length() {
    let mut planner = planner_with(PlannerSettings::default());
    let result = planner.plan(input(
        Vector2::new(0.5, 0.5),
        Vector2::zeros(),
        Vector2::new(0.5, 0.5),
        Vector2::zeros(),
    ));
    assert!(!result.is_empty());
    for point in &result {
        assert!((point.pos - Vector2::new(0.5, 0.5)).norm() < 0.01);
        assert!(point.speed.norm() < 0.05);
    }
}

#[test]
fn moving_obstacle_is_avoided() {
    let mut planner = planner_with(PlannerSettings::default());
    // a robot-sized obstacle crossing the direct path around the time the
    // robot would pass
    planner.add_moving_circle(kestrel_planner::MovingCircle {
        start_pos: Vector2::new(1.0, -1.0),
        speed: Vector2::new(0.0, 2.0),
        acc: Vector2::zeros(),
        start_time: 0.0,
        end_time: 3.0,
        radius: 0.09,
        prio: 10,
    });
    let result = planner.plan(input(
        Vector2::new(0.0, 0.0),
        Vector2::zeros(),
        Vector2::new(2.0, 0.0),
        Vector2::zeros(),
    ));
    assert!(!result.is_empty());
    // verify clearance against the moving obstacle at the sampled times
    for point in &result {
        let t = point.time;
        if t <= 3.0 {
            let center = Vector2::new(1.0, -1.0) + Vector2::new(0.0, 2.0) * t;
            let dist = (point.pos - center).norm();
            assert!(
                dist >= 0.09,
                "too close to the moving obstacle at t={}: {}",
                t,
                dist
            );
        }
    }
}

#[test]
fn planner_is_deterministic_for_a_seed() {
    let run = || {
        let mut planner = planner_with(PlannerSettings::default());
        planner.add_obstacle(Obstacle::circle(Vector2::new(0.7, 0.1), 0.3, 1));
        planner
            .plan(input(
                Vector2::new(0.0, 0.0),
                Vector2::zeros(),
                Vector2::new(1.5, 0.0),
                Vector2::zeros(),
            ))
            .iter()
            .map(|p| (p.pos.x, p.pos.y, p.time))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}
