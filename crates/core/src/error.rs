//! Domain error taxonomy.

use thiserror::Error;

/// Result alias used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic domain-level failure.
///
/// Only business/domain outcomes live here (malformed input, broken rules,
/// conflicts). Infrastructure failures have their own error types and are
/// mapped at the boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Structurally invalid input (e.g. empty lines, negative amount).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A business rule rejected an otherwise well-formed request
    /// (e.g. posting into a closed period, cancelling a completed run).
    #[error("business rule violated: {0}")]
    BusinessRule(String),

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The referenced resource does not exist for this tenant.
    #[error("not found")]
    NotFound,

    /// A concurrent or duplicate operation got there first
    /// (stale version, in-flight run for the same group/period).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn business_rule(msg: impl Into<String>) -> Self {
        Self::BusinessRule(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
