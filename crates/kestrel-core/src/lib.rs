mod angle;
mod commands;
mod coords;
mod field;
mod geom;
mod settings;
mod vec_map;
mod vision;
mod world;

pub use angle::*;
pub use commands::*;
pub use coords::*;
pub use field::*;
pub use geom::*;
pub use settings::*;
pub use vec_map::*;
pub use vision::*;
pub use world::*;

pub type Scalar = f64;
pub type Vector2 = nalgebra::Vector2<Scalar>;
pub type Vector3 = nalgebra::Vector3<Scalar>;
