//! Storage-facing types: notification models and the key-value repository.

pub mod models;
pub mod repository;

pub use models::*;
pub use repository::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
