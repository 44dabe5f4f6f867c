//! Error types for Shutter operations
//!
//! A cache miss is not an error anywhere in this taxonomy; it is reported as
//! `None` by the cache layer.

use crate::{EntityId, EntityKind};
use std::time::Duration;
use thiserror::Error;

/// Durable store errors. Always surfaced to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Entity not found: {kind} with id {id}")]
    NotFound { kind: EntityKind, id: EntityId },

    #[error("Conflict on {kind}: {reason}")]
    Conflict { kind: EntityKind, reason: String },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Query on {kind} failed: {reason}")]
    Query { kind: EntityKind, reason: String },
}

/// Cache backend errors. Callers absorb these and fall back to the store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend error: {reason}")]
    Backend { reason: String },

    #[error("Failed to serialize {kind}: {reason}")]
    Serialization { kind: EntityKind, reason: String },

    #[error("Failed to deserialize cache entry {key}: {reason}")]
    Deserialization { key: String, reason: String },
}

/// Failures produced by the task coordinator itself.
///
/// An error returned by a task is propagated unchanged; these variants only
/// describe what the coordinator observed about the task's execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task in slot {slot} panicked: {reason}")]
    Panicked { slot: usize, reason: String },

    #[error("Task in slot {slot} was cancelled")]
    Cancelled { slot: usize },
}

/// Pacing gate errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("Timed out after {waited:?} waiting for an admission slot on gate '{gate}'")]
    Timeout { gate: String, waited: Duration },

    #[error("Wait for an admission slot on gate '{gate}' was cancelled")]
    Cancelled { gate: String },
}

/// Request validation errors raised by the services.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Not authorized to {action} {kind} {id}")]
    Forbidden {
        action: String,
        kind: EntityKind,
        id: EntityId,
    },
}

/// Authentication failures.
///
/// Login answers `InvalidCredentials` for both an unknown email and a wrong
/// password.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Password hashing failed: {reason}")]
    Hashing { reason: String },

    #[error("Token error: {reason}")]
    Token { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Shutter errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShutterError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

impl ShutterError {
    /// Whether the caller may reasonably retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShutterError::Gate(GateError::Timeout { .. })
                | ShutterError::Store(StoreError::Unavailable { .. })
        )
    }

    /// Whether this is a cancellation (of a task or of a gate wait).
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ShutterError::Task(TaskError::Cancelled { .. })
                | ShutterError::Gate(GateError::Cancelled { .. })
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ShutterError::Store(StoreError::NotFound { .. }))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ShutterError::Store(StoreError::Conflict { .. }))
    }

    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, ShutterError::Auth(AuthError::InvalidCredentials))
    }
}

/// Result type alias for Shutter operations.
pub type ShutterResult<T> = Result<T, ShutterError>;

// =============================================================================
// TESTS
// =============================================================================
