//! Planner error types

use thiserror::Error;

/// Planner error with classification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PlannerError {
    pub kind: PlannerErrorKind,
    pub message: String,
}

impl PlannerError {
    pub fn new(kind: PlannerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn schema_invalid(message: impl Into<String>) -> Self {
        Self::new(PlannerErrorKind::SchemaInvalid, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(PlannerErrorKind::Timeout, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(PlannerErrorKind::Unavailable, message)
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorKind {
    /// Output did not match the decision schema - retried once with a correction
    SchemaInvalid,
    /// Call exceeded its time budget
    Timeout,
    /// Model endpoint unreachable, overloaded or misconfigured
    Unavailable,
}

impl PlannerErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::SchemaInvalid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SchemaInvalid => "schema_invalid",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
        }
    }
}
