//! Error types for the analysis sync layer
//!
//! - `SyncError`: fetch and mutation failures
//! - `ValidationErrors`: field-level configuration problems
//! - `TransitionError`: illegal lifecycle edges
//! - `InvariantViolation`: malformed analysis snapshots

use crate::status::AnalyzeStatus;
use crate::types::AnalysisId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure of a fetch or mutation against the backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    /// Backend has no record of the analysis
    #[error("analysis not found: {0}")]
    NotFound(AnalysisId),

    /// Connection failure or timeout; retryable
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("http {status}: {message}")]
    Http {
        /// Status code
        status: u16,
        /// Backend message, or the canonical reason
        message: String,
    },

    /// Backend answered with `success: false`
    #[error("rejected by backend: {0}")]
    Rejected(String),

    /// Request payload failed local validation
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Client misconfiguration
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Check if error is transient and worth retrying
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Check if the analysis does not exist
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Message shown to the user
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(_) => "Analysis not found".to_string(),
            Self::Rejected(message) | Self::Http { message, .. } => message.clone(),
            Self::Validation(errors) => errors.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ValidationErrors> for SyncError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// A single rejected field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path of the offending field
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl FieldError {
    /// Create new field error
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every field error found in one payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    /// Record a field error
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    /// No errors recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Errors recorded
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    /// `Ok(())` when empty
    ///
    /// # Errors
    /// Returns `self` when at least one field error was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Lifecycle transition errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// `to` is not reachable from `from`
    #[error("illegal status transition: {from} -> {to}")]
    Illegal {
        /// Current status
        from: AnalyzeStatus,
        /// Requested status
        to: AnalyzeStatus,
    },
}

/// Snapshot violating a data-model invariant
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// Configuration present before the analysis was configured
    #[error("analysis {0} carries configuration while pending")]
    ConfigWhilePending(AnalysisId),

    /// Configuration missing after configuration
    #[error("analysis {id} is {status} without configuration")]
    MissingConfig {
        /// Offending analysis
        id: AnalysisId,
        /// Its status
        status: AnalyzeStatus,
    },

    /// `error_message` present without error status, or vice versa
    #[error("analysis {id} has status {status} with mismatched error message")]
    ErrorMessageMismatch {
        /// Offending analysis
        id: AnalysisId,
        /// Its status
        status: AnalyzeStatus,
    },
}
