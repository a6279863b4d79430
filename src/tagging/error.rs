//! Tagging errors

use crate::storage::StorageError;
use thiserror::Error;

/// Malformed tag input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Tag name is required")]
    EmptyName,

    #[error("Tag name '{0}' has no characters usable in a slug")]
    EmptySlug(String),

    #[error("Department is required")]
    MissingDepartment,
}

/// Errors that can occur in tagging operations
#[derive(Debug, Error)]
pub enum TaggingError {
    #[error("Invalid tag: {0}")]
    Validation(#[from] ValidationError),

    /// The principal may not create a new tag in this department
    #[error("Not allowed to create tag '{name}' in department '{department}'")]
    ForbiddenTagCreation { name: String, department: String },

    #[error("Tag already exists: {slug} in {department}")]
    Duplicate { slug: String, department: String },

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for TaggingError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateTag { slug, department } => {
                TaggingError::Duplicate { slug, department }
            }
            other => TaggingError::Storage(other),
        }
    }
}

/// Result type for tagging operations
pub type TaggingResult<T> = Result<T, TaggingError>;
