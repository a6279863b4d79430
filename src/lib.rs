//! Tagging: free-text tags for arbitrary records
//!
//! Records are labeled with tags scoped to a department. A canonical
//! registry keeps one row per tag with a live usage counter, and an
//! association store keeps one join row per (record, tag).
//!
//! # Core Concepts
//!
//! - **Normalizer**: turns raw tag text into a canonical slug and a display name
//! - **Registry**: validated tags, unique per slug and department, with counters
//! - **Engine**: idempotent attach/detach/retag that keeps counters consistent
//! - **Scopes**: "has all of" / "has any of" filters over tagged records
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tagging::{MemoryStore, RecordRef, StaticPrincipal, TaggingConfig, TaggingEngine};
//!
//! let engine = TaggingEngine::new(Arc::new(MemoryStore::new()), TaggingConfig::default());
//! let ticket = RecordRef::new("ticket", "42");
//! let admin = StaticPrincipal::elevated("admin");
//!
//! engine.tag(&ticket, "Billing, Urgent", None, &admin).unwrap();
//! assert_eq!(engine.tag_slugs(&ticket).unwrap(), vec!["billing", "urgent"]);
//! ```

pub mod config;
pub mod normalize;
pub mod query;
pub mod storage;
mod tagging;

pub use config::{ConfigError, Settings, TaggingConfig};
pub use normalize::{split_tag_list, Displayer, Normalizer, Slugger, TagNames, TitleCase};
pub use query::{RecordQuery, TagScope};
pub use storage::{MemoryStore, OpenStore, SlugFilter, SqliteStore, StorageError, StorageResult, TagStore};
pub use tagging::{
    Association, CountCorrection, ExistingTag, Principal, RecordRef, StaticPrincipal, Tag,
    TagRegistry, Taggable, TaggingEngine, TaggingError, TaggingResult, ValidationError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
