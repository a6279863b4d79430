//! Storage trait definitions

use crate::tagging::{Association, ExistingTag, RecordRef, Tag};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Tag already exists: {slug} in {department}")]
    DuplicateTag { slug: String, department: String },

    #[error("Storage failure after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Tag-membership filter over already-normalized slugs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlugFilter {
    /// Record has an association for every slug (empty: always true)
    All(Vec<String>),
    /// Record has an association for at least one slug (empty: always false)
    Any(Vec<String>),
}

impl SlugFilter {
    /// Evaluate against the full slug set of one record
    pub fn matches<S: AsRef<str>>(&self, record_slugs: &[S]) -> bool {
        let has = |slug: &String| record_slugs.iter().any(|s| s.as_ref() == slug);
        match self {
            SlugFilter::All(slugs) => slugs.iter().all(has),
            SlugFilter::Any(slugs) => slugs.iter().any(has),
        }
    }

    /// True when no record can ever match
    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, SlugFilter::Any(slugs) if slugs.is_empty())
    }
}

/// Live association count for one slug within one department
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationCount {
    pub slug: String,
    pub department: String,
    /// Most recent display name used for the slug
    pub name: String,
    pub count: u64,
}

/// Trait for tag storage backends
///
/// Implementations must be thread-safe (Send + Sync): the same tag counter
/// may be updated concurrently on behalf of unrelated records, so
/// `increment_count` and `decrement_count` must be atomic read-modify-writes.
pub trait TagStore: Send + Sync {
    // === Tag Operations ===

    /// Insert a new tag row; fails with `DuplicateTag` if slug+department exists
    fn insert_tag(&self, tag: &Tag) -> StorageResult<()>;

    /// Load a tag by slug and department
    fn load_tag(&self, slug: &str, department: &str) -> StorageResult<Option<Tag>>;

    /// Delete a tag row; associations are left untouched
    fn delete_tag(&self, slug: &str, department: &str) -> StorageResult<bool>;

    /// List tags ordered by department then slug, optionally in one department
    fn list_tags(&self, department: Option<&str>) -> StorageResult<Vec<Tag>>;

    /// Tags flagged as suggested, ordered by department then slug
    fn suggested_tags(&self) -> StorageResult<Vec<Tag>>;

    /// Set the suggested flag; returns false if the tag does not exist
    fn set_suggested(&self, slug: &str, department: &str, suggested: bool) -> StorageResult<bool>;

    /// Atomically add `delta` to the counter, inserting `template` with
    /// `count = delta` if the row does not exist. Returns the new count.
    fn increment_count(&self, template: &Tag, delta: u64) -> StorageResult<u64>;

    /// Atomically subtract `delta`, floored at zero. Returns the new count,
    /// or `None` if the tag does not exist. Never deletes the row.
    fn decrement_count(&self, slug: &str, department: &str, delta: u64) -> StorageResult<Option<u64>>;

    /// Overwrite the counter, inserting `template` if the row does not exist
    fn set_count(&self, template: &Tag, count: u64) -> StorageResult<()>;

    // === Association Operations ===

    /// Insert an association; returns false if (record, slug) already exists
    fn insert_association(&self, association: &Association) -> StorageResult<bool>;

    /// Whether the record has an association with this slug
    fn has_association(&self, record: &RecordRef, slug: &str) -> StorageResult<bool>;

    /// Delete every association of the record with this slug, returning the removed rows
    fn delete_associations(&self, record: &RecordRef, slug: &str) -> StorageResult<Vec<Association>>;

    /// Associations of one record in the order they were created
    fn load_associations(&self, record: &RecordRef) -> StorageResult<Vec<Association>>;

    /// Distinct tags in use by records of the type, ordered by slug.
    ///
    /// `name` is the lexically smallest denormalized `tag_name` among that
    /// type's associations; `count` is the registry counter summed over the
    /// departments those associations are filed under. Slugs missing from the
    /// registry are skipped.
    fn existing_tags(&self, record_type: &str) -> StorageResult<Vec<ExistingTag>>;

    /// Records of the type satisfying every filter, ordered by record id
    fn find_records(&self, record_type: &str, filters: &[SlugFilter]) -> StorageResult<Vec<RecordRef>>;

    /// Association counts grouped by slug and department
    fn association_counts(&self) -> StorageResult<Vec<AssociationCount>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: TagStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slugs(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn all_filter_requires_every_slug() {
        let f = SlugFilter::All(slugs(&["x", "y"]));
        assert!(f.matches(&["x", "y", "z"]));
        assert!(!f.matches(&["x"]));
    }

    #[test]
    fn any_filter_requires_one_slug() {
        let f = SlugFilter::Any(slugs(&["x", "y"]));
        assert!(f.matches(&["y"]));
        assert!(!f.matches(&["z"]));
    }

    #[test]
    fn empty_filters_follow_all_and_any_identities() {
        let none: [&str; 0] = [];
        assert!(SlugFilter::All(vec![]).matches(&none));
        assert!(!SlugFilter::Any(vec![]).matches(&["x"]));
        assert!(SlugFilter::Any(vec![]).is_unsatisfiable());
        assert!(!SlugFilter::All(vec![]).is_unsatisfiable());
    }

    #[test]
    fn busy_errors_are_transient() {
        let busy = StorageError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_transient());
        assert!(!StorageError::LockPoisoned.is_transient());
    }
}
