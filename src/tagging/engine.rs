//! TaggingEngine: attach, detach and retag records

use super::error::{TaggingError, TaggingResult};
use super::principal::Principal;
use super::record::{Association, RecordRef, Taggable};
use super::registry::TagRegistry;
use super::tag::ExistingTag;
use crate::config::TaggingConfig;
use crate::normalize::TagNames;
use crate::query::RecordQuery;
use crate::storage::TagStore;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Orchestrates tag associations for records
///
/// Every (record, tag) pair is either absent or attached. Attaching an
/// attached tag and detaching an absent one are both no-ops, and each
/// transition moves the tag's registry counter by exactly one.
#[derive(Clone)]
pub struct TaggingEngine {
    store: Arc<dyn TagStore>,
    registry: TagRegistry,
}

impl TaggingEngine {
    /// Create an engine over a store with the given configuration
    pub fn new(store: Arc<dyn TagStore>, config: TaggingConfig) -> Self {
        let registry = TagRegistry::new(store.clone(), config);
        Self { store, registry }
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    pub fn config(&self) -> &TaggingConfig {
        self.registry.config()
    }

    // --- Attach / detach ---

    /// Attach every name to the record. `None` files new tags under the
    /// default department.
    pub fn tag(
        &self,
        record: &RecordRef,
        names: impl Into<TagNames>,
        department: Option<&str>,
        principal: &dyn Principal,
    ) -> TaggingResult<()> {
        for name in names.into().iter() {
            self.add_tag(record, name, department, principal)?;
        }
        Ok(())
    }

    /// Attach a single tag. Returns false if the record already had it.
    ///
    /// Tags outside the default department are always creatable. In the
    /// default department the tag must already exist, or the principal must
    /// hold the elevated tagging right; otherwise this fails with
    /// `ForbiddenTagCreation`.
    pub fn add_tag(
        &self,
        record: &RecordRef,
        name: &str,
        department: Option<&str>,
        principal: &dyn Principal,
    ) -> TaggingResult<bool> {
        let name = name.trim();
        let (slug, department) = self.check_creation(name, department, principal)?;

        if self.store.has_association(record, &slug)? {
            debug!(record = %record, slug = %slug, "tag already attached");
            return Ok(false);
        }

        let association = Association::new(
            record.clone(),
            self.config().display(name),
            slug.clone(),
            department.clone(),
        );
        if !self.store.insert_association(&association)? {
            // Lost a race with another attach of the same tag
            return Ok(false);
        }

        self.registry.increment(name, &department, &slug, 1)?;
        debug!(record = %record, slug = %slug, department = %department, "tag attached");
        Ok(true)
    }

    /// Detach a single tag, returning how many associations were removed.
    ///
    /// Counters are decremented under the department each removed
    /// association was attached in. Removing an absent tag is a no-op.
    pub fn remove_tag(&self, record: &RecordRef, name: &str, department: Option<&str>) -> TaggingResult<usize> {
        let slug = self.config().slug(name.trim());
        if slug.is_empty() {
            return Ok(0);
        }
        debug!(record = %record, slug = %slug, department = ?department, "detaching tag");
        self.detach_slug(record, &slug)
    }

    /// Detach the given names, or every current tag when `names` is `None`.
    /// Returns the number of associations removed.
    pub fn untag(
        &self,
        record: &RecordRef,
        names: Option<TagNames>,
        department: Option<&str>,
    ) -> TaggingResult<usize> {
        let mut removed = 0;
        match names {
            Some(names) => {
                for name in names.iter() {
                    removed += self.remove_tag(record, name, department)?;
                }
            }
            None => {
                for association in self.store.load_associations(record)? {
                    removed += self.detach_slug(record, &association.tag_slug)?;
                }
            }
        }
        Ok(removed)
    }

    /// Make the record's tag set exactly `names`.
    ///
    /// The diff is computed by slug, so respelling an attached tag leaves it
    /// (and its counter) untouched. Every name is validated and checked for
    /// creation rights before anything is detached.
    pub fn retag(
        &self,
        record: &RecordRef,
        names: impl Into<TagNames>,
        department: Option<&str>,
        principal: &dyn Principal,
    ) -> TaggingResult<()> {
        let names = names.into();

        let mut wanted: Vec<(String, &str)> = Vec::new();
        let mut wanted_slugs = HashSet::new();
        for name in names.iter() {
            let name = name.trim();
            let slug = self.registry.slug_for(name)?;
            if wanted_slugs.insert(slug.clone()) {
                wanted.push((slug, name));
            }
        }

        let current = self.store.load_associations(record)?;
        let current_slugs: HashSet<&str> = current.iter().map(|a| a.tag_slug.as_str()).collect();

        let additions: Vec<&str> = wanted
            .iter()
            .filter(|(slug, _)| !current_slugs.contains(slug.as_str()))
            .map(|(_, name)| *name)
            .collect();
        for name in &additions {
            self.check_creation(name, department, principal)?;
        }

        for association in current.iter().filter(|a| !wanted_slugs.contains(&a.tag_slug)) {
            self.detach_slug(record, &association.tag_slug)?;
        }
        for name in additions {
            self.add_tag(record, name, department, principal)?;
        }
        Ok(())
    }

    /// Untag the record ahead of its deletion if its policy (or the
    /// configuration) asks for it. Returns whether the cascade ran.
    pub fn before_delete<T: Taggable + ?Sized>(&self, record: &T) -> TaggingResult<bool> {
        let cascade = record
            .untag_on_delete()
            .unwrap_or(self.config().settings.untag_on_delete);
        if !cascade {
            return Ok(false);
        }

        let record = record.record_ref();
        let removed = self.untag(&record, None, None)?;
        debug!(record = %record, removed, "untagged record before delete");
        Ok(true)
    }

    // --- Reads ---

    /// Display names of the record's tags, in attach order
    pub fn tag_names(&self, record: &RecordRef) -> TaggingResult<Vec<String>> {
        Ok(self
            .store
            .load_associations(record)?
            .into_iter()
            .map(|a| a.tag_name)
            .collect())
    }

    /// Slugs of the record's tags, in attach order
    pub fn tag_slugs(&self, record: &RecordRef) -> TaggingResult<Vec<String>> {
        Ok(self
            .store
            .load_associations(record)?
            .into_iter()
            .map(|a| a.tag_slug)
            .collect())
    }

    pub fn associations(&self, record: &RecordRef) -> TaggingResult<Vec<Association>> {
        Ok(self.store.load_associations(record)?)
    }

    /// Distinct tags in use by any record of the type, ordered by slug
    pub fn existing_tags(&self, record_type: &str) -> TaggingResult<Vec<ExistingTag>> {
        Ok(self.store.existing_tags(record_type)?)
    }

    /// Tagged records matching the query's scopes
    pub fn find(&self, query: &RecordQuery) -> TaggingResult<Vec<RecordRef>> {
        query.execute(self.store.as_ref(), self.config())
    }

    /// Keep only the candidates that match the query's scopes
    pub fn filter(
        &self,
        query: &RecordQuery,
        candidates: impl IntoIterator<Item = RecordRef>,
    ) -> TaggingResult<Vec<RecordRef>> {
        query.filter(self.store.as_ref(), self.config(), candidates)
    }

    /// Delete the record's associations for an already-normalized slug and
    /// decrement each removed row's department counter.
    ///
    /// Stored associations are detached through here by their stored slug;
    /// the display name need not normalize back to it.
    fn detach_slug(&self, record: &RecordRef, slug: &str) -> TaggingResult<usize> {
        let removed = self.store.delete_associations(record, slug)?;
        if removed.is_empty() {
            debug!(record = %record, slug, "tag not attached");
            return Ok(0);
        }

        let mut per_department: BTreeMap<&str, (&str, u64)> = BTreeMap::new();
        for association in &removed {
            per_department
                .entry(association.department.as_str())
                .or_insert((association.tag_name.as_str(), 0))
                .1 += 1;
        }
        for (dept, (name, n)) in per_department {
            self.registry.decrement(name, dept, slug, n)?;
        }

        debug!(record = %record, slug, removed = removed.len(), "tag detached");
        Ok(removed.len())
    }

    /// Validate a name, resolve its department and enforce creation rights.
    fn check_creation(
        &self,
        name: &str,
        department: Option<&str>,
        principal: &dyn Principal,
    ) -> TaggingResult<(String, String)> {
        let slug = self.registry.slug_for(name)?;
        let department = self.registry.resolve_department(department)?;

        if self.config().is_default_department(&department)
            && !principal.has_elevated_tagging_right()
            && self.registry.get_by_slug(&slug, &department)?.is_none()
        {
            debug!(principal = principal.id(), slug = %slug, "tag creation forbidden");
            return Err(TaggingError::ForbiddenTagCreation {
                name: name.trim().to_string(),
                department,
            });
        }

        Ok((slug, department))
    }
}
