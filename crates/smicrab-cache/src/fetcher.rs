//! Smart Fetcher
//!
//! Chooses per request between the status cache and the remote source:
//! - `fetch`: cache first, remote on miss, cache the result if completed
//! - `fetch_bypass`: always remote, never reads the cache

use crate::store::{CacheKey, StatusCache, StoreOutcome};
use smicrab_core::{
    ActionResponse, Analysis, AnalysisContext, AnalysisId, AuthContext, StatusSource, SyncError,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Analysis plus whether an observer should keep polling it
#[derive(Debug, Clone, PartialEq)]
pub struct PollingInfo {
    pub analysis: Option<Arc<Analysis>>,
    pub should_continue_polling: bool,
}

/// Cache-aware status reader
pub struct SmartFetcher<S: ?Sized = dyn StatusSource> {
    source: Arc<S>,
    cache: StatusCache,
}

impl<S: ?Sized> Clone for SmartFetcher<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            cache: self.cache.clone(),
        }
    }
}

impl<S: ?Sized> fmt::Debug for SmartFetcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartFetcher")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<S: StatusSource + ?Sized> SmartFetcher<S> {
    /// Create new fetcher over a source and a shared cache
    #[must_use]
    pub fn new(source: Arc<S>, cache: StatusCache) -> Self {
        Self { source, cache }
    }

    /// Shared cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    /// Underlying source
    #[inline]
    #[must_use]
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Cache-preferring read.
    ///
    /// A cached snapshot is returned without a remote call. Otherwise the
    /// remote source is asked and a completed result is cached before it is
    /// returned. Failures are never cached.
    ///
    /// # Errors
    /// `SyncError::NotFound` if the analysis does not exist, or the
    /// transport error from the remote source.
    pub async fn fetch(
        &self,
        id: &AnalysisId,
        auth: &AuthContext,
    ) -> Result<Arc<Analysis>, SyncError> {
        let key = CacheKey::new(*id, auth.scope());
        if let Some(cached) = self.cache.get(&key).await {
            debug!(%key, "status cache hit");
            return Ok(cached);
        }
        debug!(%key, "status cache miss");

        self.fetch_remote(id, auth).await
    }

    /// Remote read that skips the cache lookup.
    ///
    /// Used for polling and explicit refreshes. A completed result is still
    /// stored so later cache-preferring reads need no round-trip.
    ///
    /// # Errors
    /// Same as [`fetch`](Self::fetch).
    pub async fn fetch_bypass(
        &self,
        id: &AnalysisId,
        auth: &AuthContext,
    ) -> Result<Arc<Analysis>, SyncError> {
        self.fetch_remote(id, auth).await
    }

    /// Reduced projection through the cache-preferring path
    ///
    /// # Errors
    /// Same as [`fetch`](Self::fetch).
    pub async fn fetch_context(
        &self,
        id: &AnalysisId,
        auth: &AuthContext,
    ) -> Result<AnalysisContext, SyncError> {
        self.fetch(id, auth).await.map(|analysis| analysis.context())
    }

    /// Cache-preferring read plus the polling decision.
    ///
    /// A missing analysis is not an error here; it yields no snapshot and
    /// no polling.
    ///
    /// # Errors
    /// Transport and protocol failures from the remote source.
    pub async fn fetch_with_polling_info(
        &self,
        id: &AnalysisId,
        auth: &AuthContext,
    ) -> Result<PollingInfo, SyncError> {
        match self.fetch(id, auth).await {
            Ok(analysis) => Ok(PollingInfo {
                should_continue_polling: analysis.should_poll(),
                analysis: Some(analysis),
            }),
            Err(SyncError::NotFound(_)) => Ok(PollingInfo {
                analysis: None,
                should_continue_polling: false,
            }),
            Err(e) => Err(e),
        }
    }

    /// Status read as a uniform response; `fresh` bypasses the cache
    pub async fn status_response(
        &self,
        id: &AnalysisId,
        auth: &AuthContext,
        fresh: bool,
    ) -> ActionResponse<Arc<Analysis>> {
        let (result, message) = if fresh {
            (
                self.fetch_bypass(id, auth).await,
                "Real-time analysis status retrieved successfully",
            )
        } else {
            (
                self.fetch(id, auth).await,
                "Analysis status retrieved successfully",
            )
        };
        match result {
            Ok(analysis) => ActionResponse::ok(analysis, message),
            Err(e) => e.into(),
        }
    }

    async fn fetch_remote(
        &self,
        id: &AnalysisId,
        auth: &AuthContext,
    ) -> Result<Arc<Analysis>, SyncError> {
        let observed = self.cache.generation();
        let analysis = Arc::new(self.remote(id, auth).await?);

        let scope = auth.scope();
        if self
            .cache
            .insert_observed(Arc::clone(&analysis), scope, observed)
            .await
            == StoreOutcome::Stored
        {
            debug!(key = %CacheKey::new(*id, scope), "stored completed analysis");
        }
        Ok(analysis)
    }

    async fn remote(&self, id: &AnalysisId, auth: &AuthContext) -> Result<Analysis, SyncError> {
        match self.source.fetch_status(id, auth).await {
            Ok(analysis) => {
                if let Err(violation) = analysis.check_invariants() {
                    warn!(%id, %violation, "backend snapshot violates data model");
                }
                Ok(analysis)
            }
            Err(e) => {
                if e.is_not_found() {
                    debug!(%id, "analysis not found");
                } else {
                    warn!(%id, error = %e, "status fetch failed");
                }
                Err(e)
            }
        }
    }
}
