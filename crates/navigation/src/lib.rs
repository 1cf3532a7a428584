pub mod navigator;
pub mod observer;
pub mod state;

pub use navigator::*;
pub use observer::*;
pub use state::*;
