pub mod config;
pub mod path;
pub mod svg;

pub use config::*;
pub use path::*;
pub use svg::*;
