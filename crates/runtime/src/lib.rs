pub mod event_bus;
pub mod task;

pub use event_bus::*;
pub use task::*;
