//! Tag registry: validation, slug uniqueness and usage counters

use super::error::{TaggingResult, ValidationError};
use super::tag::{CountCorrection, Tag};
use crate::config::TaggingConfig;
use crate::storage::{StorageError, StorageResult, TagStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Canonical list of tags, shared by every tagged record
///
/// Counter updates are delegated to the store's atomic increment/decrement
/// and retried on transient failures.
#[derive(Clone)]
pub struct TagRegistry {
    store: Arc<dyn TagStore>,
    config: TaggingConfig,
}

impl TagRegistry {
    pub fn new(store: Arc<dyn TagStore>, config: TaggingConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &TaggingConfig {
        &self.config
    }

    /// Lower-case and validate a department.
    ///
    /// Blank input resolves to the default department unless departments are
    /// required. Departments outside the allowed set are replaced with the
    /// default department rather than rejected.
    pub fn resolve_department(&self, department: Option<&str>) -> Result<String, ValidationError> {
        let settings = &self.config.settings;
        let department = department.map(|d| d.trim().to_lowercase()).unwrap_or_default();

        if department.is_empty() {
            if settings.require_department {
                return Err(ValidationError::MissingDepartment);
            }
            return Ok(self.config.default_department().to_string());
        }

        if settings.allowed_departments.contains(&department) {
            Ok(department)
        } else {
            debug!(
                department = %department,
                fallback = self.config.default_department(),
                "department not allowed, using default"
            );
            Ok(self.config.default_department().to_string())
        }
    }

    /// Trim a name and compute its slug, rejecting blank names.
    pub fn slug_for(&self, name: &str) -> Result<String, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let slug = self.config.slug(name);
        if slug.is_empty() {
            return Err(ValidationError::EmptySlug(name.to_string()));
        }
        Ok(slug)
    }

    /// Validate and insert a brand-new tag.
    ///
    /// Fails with `Duplicate` if the slug already exists in the department;
    /// callers that only want the tag to exist should use `increment`.
    pub fn validate_and_create(&self, name: &str, department: Option<&str>) -> TaggingResult<Tag> {
        let slug = self.slug_for(name)?;
        let department = self.resolve_department(department)?;
        let tag = Tag::new(slug, self.config.display(name.trim()), department);

        self.store.insert_tag(&tag)?;
        debug!(slug = %tag.slug, department = %tag.department, "created tag");
        Ok(tag)
    }

    /// Whether a tag with the normalized name exists in the department
    pub fn exists(&self, name: &str, department: Option<&str>) -> TaggingResult<bool> {
        Ok(self.get(name, department)?.is_some())
    }

    /// Look up a tag by raw name
    pub fn get(&self, name: &str, department: Option<&str>) -> TaggingResult<Option<Tag>> {
        let slug = self.slug_for(name)?;
        let department = self.resolve_department(department)?;
        Ok(self.store.load_tag(&slug, &department)?)
    }

    /// Look up a tag by slug in an already-resolved department
    pub fn get_by_slug(&self, slug: &str, department: &str) -> TaggingResult<Option<Tag>> {
        Ok(self.store.load_tag(slug, department)?)
    }

    /// Add `delta` to the tag's counter, creating the tag with `count = delta`
    /// if it does not exist yet. Returns the new count.
    pub fn increment(&self, name: &str, department: &str, slug: &str, delta: u64) -> TaggingResult<u64> {
        let template = Tag::new(slug, self.config.display(name.trim()), department);
        let count = self.with_retry("increment", || self.store.increment_count(&template, delta))?;
        debug!(slug, department, delta, count, "incremented tag count");
        Ok(count)
    }

    /// Subtract `delta` from the tag's counter, floored at zero. The tag row is
    /// never removed. Returns `None` if the tag is not in the registry.
    pub fn decrement(&self, name: &str, department: &str, slug: &str, delta: u64) -> TaggingResult<Option<u64>> {
        let count = self.with_retry("decrement", || self.store.decrement_count(slug, department, delta))?;
        match count {
            Some(count) => debug!(slug, department, delta, count, "decremented tag count"),
            None => debug!(name, slug, department, "decrement on tag missing from registry"),
        }
        Ok(count)
    }

    /// Tags flagged as suggested
    pub fn suggested(&self) -> TaggingResult<Vec<Tag>> {
        Ok(self.store.suggested_tags()?)
    }

    /// Set or clear the suggested flag; returns false if the tag does not exist
    pub fn set_suggested(&self, name: &str, department: Option<&str>, suggested: bool) -> TaggingResult<bool> {
        let slug = self.slug_for(name)?;
        let department = self.resolve_department(department)?;
        Ok(self.store.set_suggested(&slug, &department, suggested)?)
    }

    /// All tags, optionally restricted to one department
    pub fn list(&self, department: Option<&str>) -> TaggingResult<Vec<Tag>> {
        match department {
            Some(d) => {
                let department = self.resolve_department(Some(d))?;
                Ok(self.store.list_tags(Some(&department))?)
            }
            None => Ok(self.store.list_tags(None)?),
        }
    }

    /// Remove a tag from the registry. Associations referencing it are kept.
    pub fn delete(&self, name: &str, department: Option<&str>) -> TaggingResult<bool> {
        let slug = self.slug_for(name)?;
        let department = self.resolve_department(department)?;
        Ok(self.store.delete_tag(&slug, &department)?)
    }

    /// Recount associations per slug and department and rewrite every counter
    /// that drifted. Tags referenced by associations but missing from the
    /// registry are recreated. Returns the corrections made.
    pub fn reconcile(&self) -> TaggingResult<Vec<CountCorrection>> {
        let mut actual: HashMap<(String, String), (String, u64)> = self
            .store
            .association_counts()?
            .into_iter()
            .map(|c| ((c.department, c.slug), (c.name, c.count)))
            .collect();

        let mut corrections = Vec::new();

        for tag in self.store.list_tags(None)? {
            let live = actual
                .remove(&(tag.department.clone(), tag.slug.clone()))
                .map_or(0, |(_, count)| count);
            if live != tag.count {
                self.with_retry("reconcile", || self.store.set_count(&tag, live))?;
                corrections.push(CountCorrection {
                    slug: tag.slug.clone(),
                    department: tag.department.clone(),
                    previous: tag.count,
                    actual: live,
                });
            }
        }

        for ((department, slug), (name, live)) in actual {
            let template = Tag::new(slug.clone(), name, department.clone());
            self.with_retry("reconcile", || self.store.set_count(&template, live))?;
            corrections.push(CountCorrection {
                slug,
                department,
                previous: 0,
                actual: live,
            });
        }

        corrections.sort_by(|a, b| (&a.department, &a.slug).cmp(&(&b.department, &b.slug)));
        for c in &corrections {
            info!(
                slug = %c.slug,
                department = %c.department,
                previous = c.previous,
                actual = c.actual,
                "corrected tag count"
            );
        }
        Ok(corrections)
    }

    /// Run a counter operation, retrying transient storage failures with
    /// linear backoff up to `max_retries` extra attempts.
    fn with_retry<T>(&self, op: &str, mut f: impl FnMut() -> StorageResult<T>) -> StorageResult<T> {
        let max_retries = self.config.settings.max_retries;
        let mut retries = 0;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retries < max_retries => {
                    retries += 1;
                    warn!(op, attempt = retries, error = %e, "transient storage failure, retrying");
                    std::thread::sleep(self.config.settings.backoff(retries));
                }
                Err(e) if e.is_transient() => {
                    return Err(StorageError::RetriesExhausted {
                        attempts: retries + 1,
                        source: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::storage::MemoryStore;
    use crate::tagging::{Association, RecordRef, TaggingError};

    fn registry() -> TagRegistry {
        let settings = Settings::default().with_department("sales");
        TagRegistry::new(Arc::new(MemoryStore::new()), TaggingConfig::new(settings))
    }

    #[test]
    fn create_computes_slug_and_display_name() {
        let registry = registry();
        let tag = registry
            .validate_and_create("  machine   LEARNING ", Some("Sales"))
            .unwrap();
        assert_eq!(tag.slug, "machine-learning");
        assert_eq!(tag.name, "Machine Learning");
        assert_eq!(tag.department, "sales");
        assert_eq!(tag.count, 0);
        assert!(!tag.suggested);
    }

    #[test]
    fn create_rejects_blank_names() {
        let registry = registry();
        let err = registry.validate_and_create("   ", None).unwrap_err();
        assert!(matches!(err, TaggingError::Validation(ValidationError::EmptyName)));

        let err = registry.validate_and_create("?!", None).unwrap_err();
        assert!(matches!(
            err,
            TaggingError::Validation(ValidationError::EmptySlug(_))
        ));
    }

    #[test]
    fn create_rejects_equivalent_slug() {
        let registry = registry();
        registry.validate_and_create("Rust Lang", None).unwrap();
        let err = registry.validate_and_create("rust-lang", None).unwrap_err();
        assert!(matches!(err, TaggingError::Duplicate { .. }));
    }

    #[test]
    fn unknown_department_falls_back_to_default() {
        let registry = registry();
        let tag = registry.validate_and_create("Foo", Some("bogus")).unwrap();
        assert_eq!(tag.department, "support");
    }

    #[test]
    fn missing_department_uses_default_unless_required() {
        let registry = registry();
        assert_eq!(registry.resolve_department(None).unwrap(), "support");
        assert_eq!(registry.resolve_department(Some("  ")).unwrap(), "support");

        let mut settings = Settings::default();
        settings.require_department = true;
        let strict = TagRegistry::new(Arc::new(MemoryStore::new()), TaggingConfig::new(settings));
        assert_eq!(
            strict.resolve_department(Some(" ")).unwrap_err(),
            ValidationError::MissingDepartment
        );
        assert_eq!(strict.resolve_department(Some("SUPPORT")).unwrap(), "support");
    }

    #[test]
    fn mixed_case_default_department_still_matches_input() {
        let settings = Settings {
            default_department: "Support".to_string(),
            ..Settings::default()
        };
        let registry = TagRegistry::new(Arc::new(MemoryStore::new()), TaggingConfig::new(settings));

        assert_eq!(registry.resolve_department(Some("bogus")).unwrap(), "support");
        assert_eq!(registry.resolve_department(Some("SUPPORT")).unwrap(), "support");
        let tag = registry.validate_and_create("Foo", None).unwrap();
        assert!(registry.exists("foo", Some("support")).unwrap());
        assert_eq!(tag.department, "support");
    }

    #[test]
    fn exists_uses_normalized_slug() {
        let registry = registry();
        registry.validate_and_create("Café Au Lait", None).unwrap();
        assert!(registry.exists("cafe au lait", None).unwrap());
        assert!(!registry.exists("cafe au lait", Some("sales")).unwrap());
    }

    #[test]
    fn increment_creates_then_accumulates() {
        let registry = registry();
        assert_eq!(registry.increment("Rust", "support", "rust", 1).unwrap(), 1);
        assert_eq!(registry.increment("rust", "support", "rust", 2).unwrap(), 3);

        let tag = registry.get("rust", None).unwrap().unwrap();
        assert_eq!(tag.name, "Rust");
        assert_eq!(tag.count, 3);
    }

    #[test]
    fn decrement_floors_at_zero_and_keeps_tag() {
        let registry = registry();
        registry.increment("Rust", "support", "rust", 1).unwrap();
        assert_eq!(registry.decrement("Rust", "support", "rust", 3).unwrap(), Some(0));
        assert!(registry.exists("Rust", None).unwrap());
        assert_eq!(registry.decrement("Go", "support", "go", 1).unwrap(), None);
    }

    #[test]
    fn suggested_filters_on_flag() {
        let registry = registry();
        registry.validate_and_create("Alpha", None).unwrap();
        registry.validate_and_create("Beta", None).unwrap();
        assert!(registry.set_suggested("beta", None, true).unwrap());
        assert!(!registry.set_suggested("gamma", None, true).unwrap());

        let suggested = registry.suggested().unwrap();
        assert_eq!(suggested.len(), 1);
        assert_eq!(suggested[0].slug, "beta");
    }

    #[test]
    fn delete_leaves_tag_recreatable() {
        let registry = registry();
        registry.validate_and_create("Alpha", None).unwrap();
        assert!(registry.delete("alpha", None).unwrap());
        assert!(!registry.delete("alpha", None).unwrap());
        registry.validate_and_create("ALPHA", None).unwrap();
    }

    #[test]
    fn reconcile_repairs_drift_and_missing_rows() {
        let store = Arc::new(MemoryStore::new());
        let registry = TagRegistry::new(store.clone(), TaggingConfig::default());

        let r1 = RecordRef::new("ticket", "1");
        let r2 = RecordRef::new("ticket", "2");
        store
            .insert_association(&Association::new(r1.clone(), "Rust", "rust", "support"))
            .unwrap();
        store
            .insert_association(&Association::new(r2, "Rust", "rust", "support"))
            .unwrap();
        store
            .insert_association(&Association::new(r1, "Go", "go", "support"))
            .unwrap();

        // rust drifted, go never counted, zig counted with no associations
        registry.increment("Rust", "support", "rust", 5).unwrap();
        registry.increment("Zig", "support", "zig", 1).unwrap();

        let corrections = registry.reconcile().unwrap();
        assert_eq!(corrections.len(), 3);

        assert_eq!(registry.get("rust", None).unwrap().unwrap().count, 2);
        assert_eq!(registry.get("go", None).unwrap().unwrap().count, 1);
        assert_eq!(registry.get("go", None).unwrap().unwrap().name, "Go");
        assert_eq!(registry.get("zig", None).unwrap().unwrap().count, 0);

        // Second pass finds nothing to fix
        assert!(registry.reconcile().unwrap().is_empty());
    }
}
