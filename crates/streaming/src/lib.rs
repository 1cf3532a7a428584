pub mod cache;
pub mod fetch;
pub mod preloader;
pub mod request;
pub mod residency;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::*;
pub use fetch::*;
pub use preloader::*;
pub use request::*;
pub use residency::*;
