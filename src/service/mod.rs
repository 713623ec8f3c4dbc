//! Engine, cursor and write planning over the SQL builder.

mod engine;
pub mod plan;
mod record_set;
pub use engine::{Engine, EngineState};
pub use record_set::{CursorState, RecordSet};
