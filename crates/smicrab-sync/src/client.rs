//! Client façade wiring backend, cache and credentials together

use crate::config::SyncConfig;
use crate::coordinator::MutationCoordinator;
use crate::credentials::CredentialSource;
use crate::http::HttpBackend;
use crate::live::LiveAnalysis;
use crate::poller::{BackendFetcher, PollingController};
use smicrab_cache::{SmartFetcher, StatusCache};
use smicrab_core::{AnalysisBackend, AnalysisId, AuthContext, SyncError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Entry point to the sync layer
///
/// Every component it hands out shares one status cache, so mutations made
/// through [`coordinator`](Self::coordinator) invalidate what
/// [`fetcher`](Self::fetcher) serves.
#[derive(Clone)]
pub struct SmicrabClient {
    backend: Arc<dyn AnalysisBackend>,
    cache: StatusCache,
    credentials: Arc<dyn CredentialSource>,
    poll_interval: Duration,
}

impl fmt::Debug for SmicrabClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmicrabClient")
            .field("cache", &self.cache)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl SmicrabClient {
    /// Create new client over any backend
    #[must_use]
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        credentials: Arc<dyn CredentialSource>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            backend,
            cache: StatusCache::new(config.cache_capacity),
            credentials,
            poll_interval: config.poll_interval(),
        }
    }

    /// Create new client talking HTTP to `config.api_url`
    ///
    /// # Errors
    /// `SyncError::Config` if the HTTP client cannot be built.
    pub fn connect(
        config: &SyncConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, SyncError> {
        let backend = HttpBackend::new(config)?;
        Ok(Self::new(Arc::new(backend), credentials, config))
    }

    /// Override the polling interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Credentials for the next request
    #[must_use]
    pub fn auth_context(&self) -> AuthContext {
        self.credentials.auth_context()
    }

    /// Shared status cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    /// Polling interval handed to observers
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Smart fetcher over the shared cache
    #[must_use]
    pub fn fetcher(&self) -> BackendFetcher {
        SmartFetcher::new(Arc::clone(&self.backend), self.cache.clone())
    }

    /// Mutation coordinator over the shared cache
    #[must_use]
    pub fn coordinator(&self) -> MutationCoordinator {
        MutationCoordinator::new(
            Arc::clone(&self.backend),
            self.cache.clone(),
            Arc::clone(&self.credentials),
        )
    }

    /// Idle polling controller
    #[must_use]
    pub fn poller(&self) -> PollingController {
        PollingController::new(self.fetcher())
    }

    /// Live observer for one analysis
    #[must_use]
    pub fn live(&self, id: AnalysisId) -> LiveAnalysis {
        LiveAnalysis::new(
            id,
            self.fetcher(),
            self.coordinator(),
            Arc::clone(&self.credentials),
            self.poll_interval,
        )
    }
}
