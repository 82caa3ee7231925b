mod ball_filter;
mod camera;
mod filter;
mod robot_filter;
mod tracker;

pub use ball_filter::{BallTracker, RobotInfo};
pub use camera::CameraRegistry;
pub use robot_filter::RobotFilter;
pub use tracker::{Team, Tracker};
