pub mod states;
pub mod supervisor;
pub mod timer;

pub use states::*;
pub use supervisor::*;
pub use timer::*;
