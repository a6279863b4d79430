//! In-process storage backend

use super::traits::{AssociationCount, SlugFilter, StorageError, StorageResult, TagStore};
use crate::tagging::{Association, ExistingTag, RecordRef, Tag};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};

/// Registry key: (department, slug)
type TagKey = (String, String);

/// Tag store held entirely in memory
///
/// Counter updates go through DashMap's entry API, which holds the shard
/// lock for the whole read-modify-write. Nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tags: DashMap<TagKey, Tag>,
    associations: DashMap<RecordRef, Vec<Association>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(slug: &str, department: &str) -> TagKey {
        (department.to_string(), slug.to_string())
    }

    fn sorted(mut tags: Vec<Tag>) -> Vec<Tag> {
        tags.sort_by(|a, b| (&a.department, &a.slug).cmp(&(&b.department, &b.slug)));
        tags
    }
}

impl TagStore for MemoryStore {
    // === Tag Operations ===

    fn insert_tag(&self, tag: &Tag) -> StorageResult<()> {
        match self.tags.entry(Self::key(&tag.slug, &tag.department)) {
            Entry::Occupied(_) => Err(StorageError::DuplicateTag {
                slug: tag.slug.clone(),
                department: tag.department.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(tag.clone());
                Ok(())
            }
        }
    }

    fn load_tag(&self, slug: &str, department: &str) -> StorageResult<Option<Tag>> {
        Ok(self
            .tags
            .get(&Self::key(slug, department))
            .map(|r| r.clone()))
    }

    fn delete_tag(&self, slug: &str, department: &str) -> StorageResult<bool> {
        Ok(self.tags.remove(&Self::key(slug, department)).is_some())
    }

    fn list_tags(&self, department: Option<&str>) -> StorageResult<Vec<Tag>> {
        let tags = self
            .tags
            .iter()
            .filter(|r| department.map_or(true, |d| r.department == d))
            .map(|r| r.value().clone())
            .collect();
        Ok(Self::sorted(tags))
    }

    fn suggested_tags(&self) -> StorageResult<Vec<Tag>> {
        let tags = self
            .tags
            .iter()
            .filter(|r| r.suggested)
            .map(|r| r.value().clone())
            .collect();
        Ok(Self::sorted(tags))
    }

    fn set_suggested(&self, slug: &str, department: &str, suggested: bool) -> StorageResult<bool> {
        match self.tags.get_mut(&Self::key(slug, department)) {
            Some(mut tag) => {
                tag.suggested = suggested;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn increment_count(&self, template: &Tag, delta: u64) -> StorageResult<u64> {
        let entry = self
            .tags
            .entry(Self::key(&template.slug, &template.department))
            .and_modify(|tag| tag.count = tag.count.saturating_add(delta))
            .or_insert_with(|| template.clone().with_count(delta));
        Ok(entry.count)
    }

    fn decrement_count(&self, slug: &str, department: &str, delta: u64) -> StorageResult<Option<u64>> {
        Ok(self.tags.get_mut(&Self::key(slug, department)).map(|mut tag| {
            tag.count = tag.count.saturating_sub(delta);
            tag.count
        }))
    }

    fn set_count(&self, template: &Tag, count: u64) -> StorageResult<()> {
        self.tags
            .entry(Self::key(&template.slug, &template.department))
            .and_modify(|tag| tag.count = count)
            .or_insert_with(|| template.clone().with_count(count));
        Ok(())
    }

    // === Association Operations ===

    fn insert_association(&self, association: &Association) -> StorageResult<bool> {
        let mut rows = self.associations.entry(association.record.clone()).or_default();
        if rows.iter().any(|a| a.tag_slug == association.tag_slug) {
            return Ok(false);
        }
        rows.push(association.clone());
        Ok(true)
    }

    fn has_association(&self, record: &RecordRef, slug: &str) -> StorageResult<bool> {
        Ok(self
            .associations
            .get(record)
            .map_or(false, |rows| rows.iter().any(|a| a.tag_slug == slug)))
    }

    fn delete_associations(&self, record: &RecordRef, slug: &str) -> StorageResult<Vec<Association>> {
        let Some(mut rows) = self.associations.get_mut(record) else {
            return Ok(Vec::new());
        };
        let (removed, kept): (Vec<_>, Vec<_>) =
            rows.drain(..).partition(|a| a.tag_slug == slug);
        *rows = kept;
        let now_empty = rows.is_empty();
        drop(rows);

        if now_empty {
            self.associations.remove_if(record, |_, rows| rows.is_empty());
        }
        Ok(removed)
    }

    fn load_associations(&self, record: &RecordRef) -> StorageResult<Vec<Association>> {
        Ok(self
            .associations
            .get(record)
            .map(|rows| rows.clone())
            .unwrap_or_default())
    }

    fn existing_tags(&self, record_type: &str) -> StorageResult<Vec<ExistingTag>> {
        // Collect from associations first so no association shard lock is
        // held while reading the registry.
        let mut in_use: HashSet<TagKey> = HashSet::new();
        let mut names: BTreeMap<String, String> = BTreeMap::new();
        for rows in self.associations.iter().filter(|r| r.key().record_type == record_type) {
            for a in rows.value() {
                in_use.insert((a.department.clone(), a.tag_slug.clone()));
                names
                    .entry(a.tag_slug.clone())
                    .and_modify(|name| {
                        if a.tag_name < *name {
                            *name = a.tag_name.clone();
                        }
                    })
                    .or_insert_with(|| a.tag_name.clone());
            }
        }

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for key in in_use {
            if let Some(tag) = self.tags.get(&key) {
                *counts.entry(tag.slug.clone()).or_default() += tag.count;
            }
        }

        Ok(counts
            .into_iter()
            .filter_map(|(slug, count)| {
                let name = names.remove(&slug)?;
                Some(ExistingTag { slug, name, count })
            })
            .collect())
    }

    fn find_records(&self, record_type: &str, filters: &[SlugFilter]) -> StorageResult<Vec<RecordRef>> {
        if filters.iter().any(SlugFilter::is_unsatisfiable) {
            return Ok(Vec::new());
        }

        let mut records: Vec<RecordRef> = self
            .associations
            .iter()
            .filter(|r| r.key().record_type == record_type && !r.value().is_empty())
            .filter(|r| {
                let slugs: Vec<&str> = r.value().iter().map(|a| a.tag_slug.as_str()).collect();
                filters.iter().all(|f| f.matches(&slugs))
            })
            .map(|r| r.key().clone())
            .collect();

        records.sort_by(|a, b| a.record_id.cmp(&b.record_id));
        Ok(records)
    }

    fn association_counts(&self) -> StorageResult<Vec<AssociationCount>> {
        let mut counts: BTreeMap<TagKey, AssociationCount> = BTreeMap::new();

        for rows in self.associations.iter() {
            for a in rows.value() {
                counts
                    .entry((a.department.clone(), a.tag_slug.clone()))
                    .and_modify(|c| {
                        c.count += 1;
                        c.name = a.tag_name.clone();
                    })
                    .or_insert_with(|| AssociationCount {
                        slug: a.tag_slug.clone(),
                        department: a.department.clone(),
                        name: a.tag_name.clone(),
                        count: 1,
                    });
            }
        }

        Ok(counts.into_values().collect())
    }
}
