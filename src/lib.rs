pub mod catalog;
pub mod controller;
pub mod hardware;
pub mod machine;
pub mod resources;
pub mod runner;
pub mod system;
pub mod types;

pub use controller::*;
pub use types::*;
