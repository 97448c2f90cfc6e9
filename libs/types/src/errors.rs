//! Validation errors for pool keys, queries and inbound events
//!
//! Everything here is raised before a request touches a claim state store.

use thiserror::Error;

/// Errors raised while validating inbound selection requests
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A pool key component is empty
    #[error("Pool key field '{field}' must not be empty")]
    EmptyPoolKeyField { field: &'static str },

    /// A request field is empty where a value is required
    #[error("Field '{field}' must not be empty")]
    EmptyField { field: &'static str },

    /// Target amount is zero or negative
    #[error("Target amount must be positive, got {amount}")]
    NonPositiveAmount { amount: String },

    /// Tag regex failed to compile
    #[error("Invalid tag regex '{pattern}': {reason}")]
    InvalidTagRegex { pattern: String, reason: String },

    /// Event routed to a pool other than the one it names
    #[error("Event pool key {event} does not match routed pool key {routed}")]
    PoolKeyMismatch { routed: String, event: String },
}
