//! SMICRAB Sync - analysis lifecycle synchronization
//!
//! Keeps long-running remote analyses observable and consistent:
//! - `PollingController`: interval-driven bypass fetching with self-termination
//! - `MutationCoordinator`: create / configure / run / delete with cache invalidation
//! - `LiveAnalysis`: one analysis kept on screen without stale regressions
//! - `HttpBackend`: reqwest transport for the REST backend
//!
//! # Example
//!
//! ```rust,ignore
//! use smicrab_sync::{EnvCredentials, SmicrabClient, SyncConfig};
//! use std::sync::Arc;
//!
//! # async fn example(id: smicrab_core::AnalysisId) -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::load(None)?;
//! let client = SmicrabClient::connect(&config, Arc::new(EnvCredentials::new()))?;
//!
//! let live = client.live(id);
//! let response = live.load().await;
//! println!("{:?}", live.view());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod client;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod http;
pub mod live;
pub mod poller;

// Re-exports for convenience
pub use client::SmicrabClient;
pub use config::{ConfigError, SyncConfig};
pub use coordinator::{MutationCoordinator, MutationOutcome, Refetch};
pub use credentials::{CredentialSource, EnvCredentials, StaticCredentials};
pub use http::HttpBackend;
pub use live::{Applied, LiveAnalysis};
pub use poller::{BackendFetcher, FnObserver, PollObserver, PollStats, PollingController};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the sync layer
    pub use crate::{
        CredentialSource, LiveAnalysis, MutationCoordinator, PollingController, SmicrabClient,
        SyncConfig,
    };
    pub use smicrab_core::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
