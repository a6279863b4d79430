//! Tagged records and their associations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Polymorphic reference to a tagged record: a type tag plus an id
///
/// The association store never owns the record; it only stores this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    pub record_type: String,
    pub record_id: String,
}

impl RecordRef {
    pub fn new(record_type: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            record_id: record_id.into(),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.record_type, self.record_id)
    }
}

/// A domain type that can carry tags
///
/// `untag_on_delete` overrides the configured cascade policy for this
/// record type; `None` defers to the configuration.
pub trait Taggable {
    fn record_ref(&self) -> RecordRef;

    fn untag_on_delete(&self) -> Option<bool> {
        None
    }
}

impl Taggable for RecordRef {
    fn record_ref(&self) -> RecordRef {
        self.clone()
    }
}

/// Join row linking one record to one tag
///
/// At most one association exists per (record, slug). Rows are created by
/// attach and removed by detach; they are never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub record: RecordRef,
    /// Display name at the time of tagging
    pub tag_name: String,
    /// Soft reference to `Tag::slug`
    pub tag_slug: String,
    /// Department whose counter this row is accounted under
    pub department: String,
    pub tagged_at: DateTime<Utc>,
}

impl Association {
    pub fn new(
        record: RecordRef,
        tag_name: impl Into<String>,
        tag_slug: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self {
            record,
            tag_name: tag_name.into(),
            tag_slug: tag_slug.into(),
            department: department.into(),
            tagged_at: Utc::now(),
        }
    }
}
