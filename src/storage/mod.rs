//! Storage backends for tags and associations
//!
//! Backends implement the `TagStore` trait. `SqliteStore` is the persistent
//! implementation; `MemoryStore` keeps everything in process.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    AssociationCount, OpenStore, SlugFilter, StorageError, StorageResult, TagStore,
};
