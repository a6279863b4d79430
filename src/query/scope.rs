//! Tag-membership scopes over tagged records

use crate::config::TaggingConfig;
use crate::normalize::TagNames;
use crate::storage::{SlugFilter, TagStore};
use crate::tagging::{RecordRef, TaggingResult};
use std::collections::HashSet;

/// A tag-membership condition, expressed in raw tag names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagScope {
    /// Record is tagged with every name (empty list: every record matches)
    WithAllTags(TagNames),
    /// Record is tagged with at least one name (empty list: nothing matches)
    WithAnyTag(TagNames),
}

impl TagScope {
    /// Normalize and dedupe the names into a slug filter
    pub fn to_filter(&self, config: &TaggingConfig) -> SlugFilter {
        match self {
            TagScope::WithAllTags(names) => SlugFilter::All(unique_slugs(names, config)),
            TagScope::WithAnyTag(names) => SlugFilter::Any(unique_slugs(names, config)),
        }
    }
}

fn unique_slugs(names: &TagNames, config: &TaggingConfig) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| config.slug(name.trim()))
        .filter(|slug| seen.insert(slug.clone()))
        .collect()
}

/// Query for records of one type, narrowed by tag scopes
///
/// Scopes are combined with AND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub record_type: String,
    pub scopes: Vec<TagScope>,
}

impl RecordQuery {
    /// Create a query over one record type (matches every tagged record)
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            scopes: Vec::new(),
        }
    }

    /// Require every one of the names
    pub fn with_all_tags(mut self, names: impl Into<TagNames>) -> Self {
        self.scopes.push(TagScope::WithAllTags(names.into()));
        self
    }

    /// Require at least one of the names
    pub fn with_any_tag(mut self, names: impl Into<TagNames>) -> Self {
        self.scopes.push(TagScope::WithAnyTag(names.into()));
        self
    }

    pub fn filters(&self, config: &TaggingConfig) -> Vec<SlugFilter> {
        self.scopes.iter().map(|s| s.to_filter(config)).collect()
    }

    /// Search the association store for matching records, ordered by id.
    ///
    /// Only records with at least one association are visible here; use
    /// `filter` to apply the scopes to a caller-supplied record set.
    pub fn execute(&self, store: &dyn TagStore, config: &TaggingConfig) -> TaggingResult<Vec<RecordRef>> {
        Ok(store.find_records(&self.record_type, &self.filters(config))?)
    }

    /// Keep the candidates of this record type that satisfy every scope,
    /// preserving their order.
    pub fn filter(
        &self,
        store: &dyn TagStore,
        config: &TaggingConfig,
        candidates: impl IntoIterator<Item = RecordRef>,
    ) -> TaggingResult<Vec<RecordRef>> {
        let filters = self.filters(config);
        if filters.iter().any(SlugFilter::is_unsatisfiable) {
            return Ok(Vec::new());
        }

        let mut matched = Vec::new();
        for record in candidates {
            if record.record_type != self.record_type {
                continue;
            }
            // Nothing to look up when every filter is an empty ALL
            if filters.iter().all(|f| matches!(f, SlugFilter::All(s) if s.is_empty())) {
                matched.push(record);
                continue;
            }
            let slugs: Vec<String> = store
                .load_associations(&record)?
                .into_iter()
                .map(|a| a.tag_slug)
                .collect();
            if filters.iter().all(|f| f.matches(&slugs)) {
                matched.push(record);
            }
        }
        Ok(matched)
    }
}
