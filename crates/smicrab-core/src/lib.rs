//! SMICRAB Core - analysis lifecycle model
//!
//! Shared vocabulary of the sync layer:
//! - The `Analysis` snapshot and its wire types
//! - The status state machine and total view derivation
//! - The uniform `ActionResponse` result shape and `SyncError` taxonomy
//! - The `StatusSource` / `AnalysisBackend` seams implemented by transports
//!
//! # Example
//!
//! ```rust
//! use smicrab_core::{AnalyzeStatus, StatusView, ModuleName};
//!
//! let view = StatusView::for_status(AnalyzeStatus::InProgress, ModuleName::EstimateModule, None);
//! assert_eq!(view, StatusView::InProgress { module: ModuleName::EstimateModule });
//! assert!(AnalyzeStatus::Completed.is_cacheable());
//! assert!(!AnalyzeStatus::Error.is_cacheable());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod api;
pub mod envelope;
pub mod error;
pub mod requests;
pub mod status;
pub mod types;
mod validate;

// Re-exports for convenience
pub use api::{AnalysisBackend, AuthContext, AuthScope, BearerToken, StatusSource};
pub use envelope::{ActionResponse, ApiEnvelope};
pub use error::{
    FieldError, InvariantViolation, SyncError, TransitionError, ValidationErrors,
};
pub use requests::{
    CreateAnalysisRequest, DeleteAnalysisResponse, RunAnalysisRequest, RunAnalysisResponse,
    SaveParametersRequest, UserAnalyses, VectorOptions,
};
pub use status::{
    allowed_transitions, validate_transition, AnalyzeStatus, FailureKind, StatusView, ViewState,
};
pub use types::{
    Analysis, AnalysisContext, AnalysisId, AnalysisVariable, Coordinates, ModelConfig, ModelType,
    ModuleName, SummaryStat, UserId,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with analysis snapshots
    pub use crate::{
        ActionResponse, Analysis, AnalysisBackend, AnalysisId, AnalyzeStatus, AuthContext,
        StatusSource, StatusView, SyncError, UserId,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
