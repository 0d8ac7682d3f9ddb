//! Error types for spatial index operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in spatial indexing operations
#[derive(Debug, Error)]
pub enum SpatialError {
    /// A constructor or query argument was outside its valid range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The reader/writer lock could not be acquired within its bounded wait.
    #[error("timed out after {0:?} waiting for the index lock")]
    LockTimeout(Duration),

    /// The item handed to `delete` is not present in the index.
    #[error("item not found in index")]
    ItemNotFound,

    /// The item handed to `add` is already present in the index.
    #[error("item is already present in index")]
    DuplicateItem,
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;
