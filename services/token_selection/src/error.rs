//! Error types for token selection
//!
//! Concurrency conflicts are not errors: stores report them as `Ok(false)`.
//! Everything here is either a validation failure raised before a store is
//! touched, or a defect that surfaces as a platform-error response.

use selection_types::ValidationError;
use thiserror::Error;

/// Failures reported by a backing state manager
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateManagerError {
    #[error("State manager unavailable: {0}")]
    Unavailable(String),

    #[error("State manager rejected request: {0}")]
    Rejected(String),
}

/// Fatal claim state store failures
///
/// Cloneable so the batching store can deliver one failure to every request
/// of a batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store has no entry for a key that must exist
    #[error("No stored claim state for pool {key}")]
    MissingState { key: String },

    #[error("Failed to serialize claim state for pool {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Failed to deserialize claim state for pool {key}: {reason}")]
    Deserialization { key: String, reason: String },

    #[error(transparent)]
    StateManager(#[from] StateManagerError),

    /// The store's flush task is gone
    #[error("Claim state store for pool {key} is closed")]
    Closed { key: String },

    /// A transform panicked; only the request that supplied it fails
    #[error("Claim state transform for pool {key} failed: {reason}")]
    TransformFailed { key: String, reason: String },
}

/// Failures of the token and balance collaborators
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Token repository query failed: {0}")]
    QueryFailed(String),

    #[error("Token amount overflow: {0}")]
    Overflow(String),
}

/// Top-level error for processing a pool event
#[derive(Debug, Error)]
pub enum TokenSelectionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Event handler failed: {0}")]
    Handler(String),
}

impl TokenSelectionError {
    /// Short type name carried in platform-error responses
    pub fn error_type(&self) -> &'static str {
        match self {
            TokenSelectionError::Validation(_) => "ValidationError",
            TokenSelectionError::Store(StoreError::MissingState { .. }) => "ConfigurationError",
            TokenSelectionError::Store(_) => "StoreError",
            TokenSelectionError::Repository(_) => "RepositoryError",
            TokenSelectionError::Handler(_) => "HandlerError",
        }
    }
}
