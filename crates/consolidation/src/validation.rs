//! Validation issues collected by pipeline steps.

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One finding from a validation/matching/aggregation pass.
///
/// Errors fail the step they occur in; warnings accumulate on the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub entity_reference: Option<String>,
}

impl ValidationIssue {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.into(),
            message: message.into(),
            entity_reference: None,
        }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.into(),
            message: message.into(),
            entity_reference: None,
        }
    }

    pub fn with_reference(mut self, entity: impl Into<String>) -> Self {
        self.entity_reference = Some(entity.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Escalate a warning to an error (continue_on_warnings == false).
    pub fn escalated(mut self) -> Self {
        self.severity = Severity::Error;
        self
    }

    /// Demote an error to a warning (caller accepted degraded output).
    pub fn demoted(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }
}

/// True when any issue in the slice is an error.
pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(ValidationIssue::is_error)
}

/// Single-line summary for step/run error messages.
pub fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| match &i.entity_reference {
            Some(entity) => format!("{} [{}]: {}", i.code, entity, i.message),
            None => format!("{}: {}", i.code, i.message),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
