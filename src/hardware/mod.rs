pub mod cup_sensor;

pub use cup_sensor::*;
