// Copyright 2025 Cowboy AI, LLC.

//! Error types for domain operations

use crate::infrastructure::TransportError;
use thiserror::Error;

/// Errors that can occur in domain operations
///
/// Ordering anomalies and lifecycle rejections are NOT errors; they are
/// detected conditions modeled as values ([`crate::SequenceClassification`],
/// [`crate::ValidationOutcome`]). This enum covers the failures that stop an
/// operation: bad configuration, malformed input, and transport trouble.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid configuration, rejected at setup time
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Event type name outside the closed enumeration
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// Failure in the underlying transport; the caller decides retry policy
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
