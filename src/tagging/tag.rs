//! Tag registry entries

use serde::{Deserialize, Serialize};

/// A canonical tag in the registry
///
/// `slug` is unique within `department`. `count` is the number of live
/// associations filed under this slug and department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Canonical identifier produced by the normalizer
    pub slug: String,
    /// Human-readable form produced by the display formatter
    pub name: String,
    /// Lower-cased department the tag is filed under
    pub department: String,
    /// Live association count
    pub count: u64,
    /// Editorial flag, independent of `count`
    pub suggested: bool,
}

impl Tag {
    pub fn new(
        slug: impl Into<String>,
        name: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            department: department.into(),
            count: 0,
            suggested: false,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn with_suggested(mut self, suggested: bool) -> Self {
        self.suggested = suggested;
        self
    }
}

/// A distinct tag in use by some record type, with its live registry count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingTag {
    pub slug: String,
    pub name: String,
    pub count: u64,
}

/// A counter that disagreed with the association rows during reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCorrection {
    pub slug: String,
    pub department: String,
    pub previous: u64,
    pub actual: u64,
}
