//! Analysis status state machine and presentation
//!
//! - `AnalyzeStatus`: the authoritative remote lifecycle status
//! - `validate_transition` / `allowed_transitions`: legal lifecycle edges
//! - `StatusView`: total mapping from status to the panel the UI renders
//! - `ViewState`: local reconfigure override, distinct from remote status

use crate::error::TransitionError;
use crate::types::{Analysis, ModuleName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzeStatus {
    /// Created, awaiting configuration
    Pending,
    /// Parameters saved, ready to run
    Configured,
    /// Running on the compute backend
    InProgress,
    /// Finished successfully; results are immutable
    Completed,
    /// Failed; retryable by a new run request
    Error,
    /// Any status this client does not recognise
    #[serde(other)]
    Unknown,
}

impl AnalyzeStatus {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Configured => "configured",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Completed or error: the remote job will not progress on its own
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Observers keep polling anything that is not terminal
    #[inline]
    #[must_use]
    pub fn should_poll(&self) -> bool {
        !self.is_terminal()
    }

    /// Only completed snapshots may be cached; errors are always re-fetched
    #[inline]
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for AnalyzeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a lifecycle transition.
///
/// Self-transitions other than `configured -> configured` are not transitions
/// and are reported as illegal; callers comparing snapshots should skip equal
/// statuses before asking.
///
/// # Errors
/// Returns `TransitionError::Illegal` if `to` is not reachable from `from`.
pub fn validate_transition(from: AnalyzeStatus, to: AnalyzeStatus) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::Illegal { from, to })
    }
}

/// Statuses reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: AnalyzeStatus) -> Vec<AnalyzeStatus> {
    use AnalyzeStatus::{Completed, Configured, Error, InProgress, Pending, Unknown};
    match from {
        Pending => vec![Configured],
        Configured => vec![Configured, InProgress],
        InProgress => vec![Completed, Error],
        Error => vec![InProgress, Configured],
        Completed | Unknown => vec![],
    }
}

/// Broad category of a remote job failure, derived from its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Memory,
    Data,
    Model,
    Unknown,
}

impl FailureKind {
    /// Classify a failure message; first matching pattern wins
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

        if has(&["timeout"]) {
            Self::Timeout
        } else if has(&["memory"]) {
            Self::Memory
        } else if has(&["data", "missing", "invalid"]) {
            Self::Data
        } else if has(&["model", "convergence"]) {
            Self::Model
        } else {
            Self::Unknown
        }
    }

    /// Panel heading
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::Timeout => "Analysis Timeout",
            Self::Memory => "Memory Limit Exceeded",
            Self::Data => "Data Error",
            Self::Model => "Model Error",
            Self::Unknown => "Analysis Failed",
        }
    }
}

/// Panel the UI renders for an analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum StatusView {
    /// Configuration wizard
    Configure,
    /// Ready-to-run summary with a run action
    Configured,
    /// Progress panel for the executing stage
    InProgress { module: ModuleName },
    /// Result summary
    Summary,
    /// Failure panel with the backend's message and a retry action
    Failure { message: String, kind: FailureKind },
    /// Fallback for unrecognised statuses
    Unknown,
}

impl StatusView {
    /// Derive the view for an analysis snapshot
    #[must_use]
    pub fn for_analysis(analysis: &Analysis) -> Self {
        Self::for_status(
            analysis.status,
            analysis.current_module,
            analysis.error_message.as_deref(),
        )
    }

    /// Total mapping from status to view
    #[must_use]
    pub fn for_status(
        status: AnalyzeStatus,
        module: ModuleName,
        error_message: Option<&str>,
    ) -> Self {
        match status {
            AnalyzeStatus::Pending => Self::Configure,
            AnalyzeStatus::Configured => Self::Configured,
            AnalyzeStatus::InProgress => Self::InProgress { module },
            AnalyzeStatus::Completed => Self::Summary,
            AnalyzeStatus::Error => {
                let message = error_message
                    .unwrap_or("An unexpected error occurred during analysis")
                    .to_string();
                let kind = FailureKind::classify(&message);
                Self::Failure { message, kind }
            }
            AnalyzeStatus::Unknown => Self::Unknown,
        }
    }

    /// Whether the panel offers a retry action
    #[inline]
    #[must_use]
    pub fn offers_retry(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Local override of the authoritative view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewState {
    /// Render whatever the remote status dictates
    #[default]
    Authoritative,
    /// User asked to re-enter configuration; the remote status is unchanged
    Reconfiguring,
}

impl ViewState {
    /// Resolve the presented view for a snapshot under this override
    #[must_use]
    pub fn present(&self, analysis: &Analysis) -> StatusView {
        match self {
            Self::Reconfiguring => StatusView::Configure,
            Self::Authoritative => StatusView::for_analysis(analysis),
        }
    }

    /// State after a new snapshot is accepted.
    ///
    /// A reconfigure override survives only while the backend still reports
    /// the failure it was raised from.
    #[must_use]
    pub fn after_snapshot(self, incoming: AnalyzeStatus) -> Self {
        match (self, incoming) {
            (Self::Reconfiguring, AnalyzeStatus::Error) => Self::Reconfiguring,
            _ => Self::Authoritative,
        }
    }
}
