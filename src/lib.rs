//! resmap: metadata-driven mapping of entity graphs onto SQLite tables, with an
//! identity cache keeping one live instance per row within a unit of work.

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod migration;
pub mod service;
pub mod sql;
pub mod store;
pub mod value;

pub use cache::IdentityCache;
pub use config::{load_from_path, resolve, DataType, Registry, RegistryConfig, ResourceConfig, ResourceMap};
pub use entity::Entity;
pub use error::{MetadataError, Phase, StoreError};
pub use migration::create_table_sql;
pub use service::{CursorState, Engine, EngineState, RecordSet};
pub use store::{Store, StoreConfig};
pub use value::{Datum, KeyValue, Reference, Value};
