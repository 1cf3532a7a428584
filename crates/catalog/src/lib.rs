pub mod comment;
pub mod resolved;
pub mod risk;
pub mod seeds;
pub mod store;
pub mod thread;

pub use comment::*;
pub use resolved::*;
pub use risk::*;
pub use seeds::*;
pub use store::*;
pub use thread::*;
