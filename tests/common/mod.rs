//! Shared helpers for tagging integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tagging::{
    OpenStore, RecordRef, Settings, SqliteStore, StaticPrincipal, TaggingConfig, TaggingEngine,
};
use tempfile::TempDir;

/// A scratch database file that lives as long as the returned guard
pub struct TempDb {
    _dir: TempDir,
    pub path: PathBuf,
}

impl TempDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("tags.db");
        Self { _dir: dir, path }
    }

    /// Open a fresh engine (and connection) on this file
    pub fn engine(&self) -> TaggingEngine {
        engine_at(&self.path, settings())
    }
}

/// Default settings with a second department and no retry sleeps
pub fn settings() -> Settings {
    let mut settings = Settings::default().with_department("sales");
    settings.retry_backoff_ms = 0;
    settings
}

pub fn engine_at(path: &Path, settings: Settings) -> TaggingEngine {
    let store = SqliteStore::open(path).expect("open sqlite store");
    TaggingEngine::new(Arc::new(store), TaggingConfig::new(settings))
}

pub fn ticket(id: impl Into<String>) -> RecordRef {
    RecordRef::new("ticket", id)
}

pub fn admin() -> StaticPrincipal {
    StaticPrincipal::elevated("admin")
}

pub fn agent() -> StaticPrincipal {
    StaticPrincipal::regular("agent")
}

/// Registry count for a tag, 0 when the tag is missing
pub fn count(engine: &TaggingEngine, name: &str, department: Option<&str>) -> u64 {
    engine
        .registry()
        .get(name, department)
        .expect("registry lookup")
        .map_or(0, |t| t.count)
}
