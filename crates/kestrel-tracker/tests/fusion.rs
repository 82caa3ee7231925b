use kestrel_core::{
    BallDetection, CameraCalibration, DetectionFrame, GeometryFrame, RobotDetection,
    TrackerSettings, VisionPacket,
};
use kestrel_tracker::Tracker;

const MS: i64 = 1_000_000;

fn robot(id: u32, x: f64, y: f64) -> RobotDetection {
    RobotDetection {
        robot_id: id,
        x,
        y,
        orientation: 0.0,
    }
}

fn detection_packet(detection: DetectionFrame) -> VisionPacket {
    VisionPacket {
        geometry: None,
        detection: Some(detection),
    }
}

fn calibration_packet(cameras: &[(u32, f64, f64)]) -> VisionPacket {
    VisionPacket {
        geometry: Some(GeometryFrame {
            field: Default::default(),
            calibrations: cameras
                .iter()
                .map(|&(id, tx, ty)| CameraCalibration {
                    camera_id: id,
                    derived_camera_world_tx_mm: Some(tx),
                    derived_camera_world_ty_mm: Some(ty),
                    derived_camera_world_tz_mm: Some(4000.0),
                    focal_length: 500.0,
                })
                .collect(),
        }),
        detection: None,
    }
}

#[test]
fn single_robot_steady_motion() {
    let mut tracker = Tracker::new(TrackerSettings::default());

    let t0 = 1_000 * MS;
    for k in 0i64..10 {
        let arrival = t0 + k * 16 * MS;
        let t_sent = arrival as f64 * 1e-9;
        let frame = DetectionFrame {
            t_capture: t_sent - 0.010,
            t_sent,
            camera_id: 0,
            robots_yellow: vec![robot(3, 0.0, 100.0 * (k + 1) as f64)],
            ..Default::default()
        };
        tracker.queue_packet(detection_packet(frame), arrival);
    }
    tracker.process(t0 + 160 * MS);

    let state = tracker.world_state(t0 + 160 * MS);
    assert_eq!(state.yellow.len(), 1);
    assert!(state.blue.is_empty());
    let robot = &state.yellow[0];
    assert_eq!(robot.id, 3);
    // detections moved along vision y, which is negative field x
    assert!(robot.position.y.abs() < 0.01);
    // the estimate tracks the newest detection, predicted to snapshot time
    assert!(
        robot.position.x < -0.5 && robot.position.x > -1.3,
        "unexpected position {}",
        robot.position
    );
}

#[test]
fn duplicate_id_filter_invalidated() {
    let mut tracker = Tracker::new(TrackerSettings::default());

    // two simultaneous detections for the same id, half a meter apart
    let first = DetectionFrame {
        t_capture: 0.0,
        t_sent: 0.0,
        camera_id: 0,
        robots_blue: vec![robot(1, 0.0, 0.0), robot(1, 0.0, 500.0)],
        ..Default::default()
    };
    tracker.queue_packet(detection_packet(first), 16 * MS);
    tracker.process(16 * MS);

    // keep feeding only the robot at the origin for 400 ms
    for k in 2i64..=25 {
        let arrival = k * 16 * MS;
        let frame = DetectionFrame {
            t_capture: 0.0,
            t_sent: 0.0,
            camera_id: 0,
            robots_blue: vec![robot(1, 0.0, 0.0)],
            ..Default::default()
        };
        tracker.queue_packet(detection_packet(frame), arrival);
        tracker.process(arrival);
    }

    let now = 26 * 16 * MS;
    let state = tracker.world_state(now);
    assert_eq!(state.blue.len(), 1);
    let surviving = &state.blue[0];
    assert!(surviving.position.norm() < 0.05, "wrong filter survived");
}

#[test]
fn ball_camera_handover() {
    let mut tracker = Tracker::new(TrackerSettings::default());
    // camera 0 over the field origin, camera 1 a meter along negative x
    tracker.queue_packet(calibration_packet(&[(0, 0.0, 0.0), (1, 0.0, 1000.0)]), MS);
    tracker.process(MS);

    let mut last_x: Option<f64> = None;
    for k in 0i64..13 {
        let arrival = 10 * MS + k * 16 * MS;
        let t = arrival as f64 * 1e-9;
        let camera_id = if k < 7 { 0 } else { 1 };
        let frame = DetectionFrame {
            t_capture: t,
            t_sent: t,
            camera_id,
            balls: vec![BallDetection {
                x: 0.0,
                y: 80.0 * k as f64,
            }],
            ..Default::default()
        };
        tracker.queue_packet(detection_packet(frame), arrival);
        tracker.process(arrival);

        let state = tracker.world_state(arrival);
        let ball = state.ball.expect("ball track lost");
        if let Some(prev) = last_x {
            assert!(
                ball.position.x <= prev + 1e-6,
                "ball position moved backwards"
            );
            assert!(
                (ball.position.x - prev).abs() < 0.15,
                "discontinuity at camera handover: {} -> {}",
                prev,
                ball.position.x
            );
        }
        assert!(ball.position.y.abs() < 0.02);
        last_x = Some(ball.position.x);
    }
    // the track followed the ball onto the second camera's half
    assert!(last_x.unwrap() < -0.7);
}

#[test]
fn snapshot_time_monotonic() {
    let mut tracker = Tracker::new(TrackerSettings::default());
    let mut last_time = i64::MIN;
    for k in 1i64..=5 {
        let now = k * 16 * MS;
        tracker.process(now);
        let state = tracker.world_state(now);
        assert!(state.time_ns > last_time);
        last_time = state.time_ns;
    }
}
