//! Tagging configuration
//!
//! `Settings` is the serializable part (loaded from YAML). `TaggingConfig`
//! is the object injected into the registry and the engine at construction:
//! settings plus the active normalizer and display formatter.

use crate::normalize::{Displayer, Normalizer, Slugger, TitleCase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serializable tagging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Department used when none is given or the given one is not allowed
    pub default_department: String,
    /// Departments tags may be filed under (the default is always allowed)
    pub allowed_departments: BTreeSet<String>,
    /// Reject blank departments instead of substituting the default
    pub require_department: bool,
    /// Remove a record's associations before the record is deleted
    pub untag_on_delete: bool,
    /// Extra attempts for counter updates that hit a transient storage failure
    pub max_retries: u32,
    /// Base backoff between counter retries, multiplied by the attempt number
    pub retry_backoff_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_department: "support".to_string(),
            allowed_departments: BTreeSet::from(["support".to_string()]),
            require_department: false,
            untag_on_delete: true,
            max_retries: 3,
            retry_backoff_ms: 10,
        }
    }
}

impl Settings {
    /// Parse settings from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.canonicalize()
    }

    /// Load settings from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Allow an additional department
    pub fn with_department(mut self, department: &str) -> Self {
        self.allowed_departments
            .insert(department.trim().to_lowercase());
        self
    }

    /// Trim and lower-case department names, make sure the default is allowed.
    pub fn canonicalize(self) -> Result<Self, ConfigError> {
        let settings = self.normalize_departments();
        if settings.default_department.is_empty() {
            return Err(ConfigError::Invalid(
                "default_department must not be empty".to_string(),
            ));
        }
        Ok(settings)
    }

    fn normalize_departments(mut self) -> Self {
        self.default_department = self.default_department.trim().to_lowercase();
        self.allowed_departments = self
            .allowed_departments
            .iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        if !self.default_department.is_empty() {
            self.allowed_departments
                .insert(self.default_department.clone());
        }
        self
    }

    /// Backoff to wait before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempt as u64))
    }
}

/// Configuration injected into the registry and the engine
#[derive(Clone)]
pub struct TaggingConfig {
    pub settings: Settings,
    normalizer: Arc<dyn Normalizer>,
    displayer: Arc<dyn Displayer>,
}

impl TaggingConfig {
    /// Create a configuration with the default `Slugger` and `TitleCase`.
    ///
    /// Department names in `settings` are trimmed and lower-cased, and the
    /// default department is added to the allowed set. An empty default
    /// department is only rejected by `Settings::canonicalize`.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: settings.normalize_departments(),
            normalizer: Arc::new(Slugger),
            displayer: Arc::new(TitleCase),
        }
    }

    /// Substitute the slug normalizer
    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Substitute the display formatter
    pub fn with_displayer(mut self, displayer: Arc<dyn Displayer>) -> Self {
        self.displayer = displayer;
        self
    }

    pub fn slug(&self, text: &str) -> String {
        self.normalizer.slug(text)
    }

    pub fn display(&self, text: &str) -> String {
        self.displayer.display(text)
    }

    pub fn default_department(&self) -> &str {
        &self.settings.default_department
    }

    pub fn is_default_department(&self, department: &str) -> bool {
        department == self.default_department()
    }
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl fmt::Debug for TaggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggingConfig")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
