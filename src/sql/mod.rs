//! Safe SQL: identifiers from validated metadata only, values as parameters.

pub mod bridge;
mod builder;
pub mod dialect;
pub mod params;
pub use builder::*;
pub use dialect::{Dialect, Sqlite};
pub use params::*;
