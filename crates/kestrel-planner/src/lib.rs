mod alpha_time;
mod obstacles;
mod planner;
mod profile;
mod rrt;
mod sampler;

pub use alpha_time::{
    calculate_trajectory_exact_end_speed, calculate_trajectory_fast_end_speed,
    find_trajectory_exact_end_speed, find_trajectory_fast_end_speed, min_time_exact_end_speed,
    min_time_fast_end_speed, min_time_pos,
};
pub use obstacles::{MovingCircle, MovingLine, Obstacle};
pub use planner::{PlanInput, TrajectoryPlanner};
pub use profile::{
    RobotState, SpeedProfile1D, Trajectory, TrajectoryPoint, SLOW_DOWN_TIME,
};
pub use rrt::{Spline, WaypointPlanner};
pub use sampler::{PrecomputationSegment, PrecomputedSample, SamplerPrecomputation};
