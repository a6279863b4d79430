//! Tag registry, associations and the tagging engine

mod engine;
mod error;
mod principal;
mod record;
mod registry;
mod tag;


pub use engine::TaggingEngine;
pub use error::{TaggingError, TaggingResult, ValidationError};
pub use principal::{Principal, StaticPrincipal};
pub use record::{Association, RecordRef, Taggable};
pub use registry::TagRegistry;
pub use tag::{CountCorrection, ExistingTag, Tag};
