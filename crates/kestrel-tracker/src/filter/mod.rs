mod kalman;
mod lpf;

pub use kalman::ConstantVelocityFilter;
pub use lpf::AngleLowPassFilter;
