//! Completed-analysis status cache using moka
//!
//! Holds the last known snapshot of an analysis only once it is completed:
//! - No time-based expiry; completed results are immutable
//! - Keyed by analysis and auth scope so credentialed reads never leak
//! - Erased by tag-addressed invalidation, capacity eviction, or a fresher
//!   snapshot that is no longer completed

use crate::tags::{CacheTag, TagIndex};
use moka::future::Cache;
use moka::notification::RemovalCause;
use smicrab_core::{Analysis, AnalysisId, AuthScope};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Default maximum number of cached snapshots
pub const DEFAULT_CAPACITY: u64 = 10_000;

/// Cache key: analysis plus the auth scope it was read with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub id: AnalysisId,
    pub scope: AuthScope,
}

impl CacheKey {
    /// Create new key
    #[inline]
    #[must_use]
    pub fn new(id: AnalysisId, scope: AuthScope) -> Self {
        Self { id, scope }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "completed-analysis-{}-{}", self.id, self.scope)
    }
}

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Approximate number of entries
    pub entry_count: u64,
    pub hits: u64,
    pub misses: u64,
    /// Snapshots written
    pub stores: u64,
    /// Writes refused because the snapshot was not completed
    pub refused: u64,
    /// Keys dropped by invalidation
    pub invalidations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    refused: AtomicU64,
    invalidations: AtomicU64,
}

/// Outcome of a cache write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Snapshot is now cached
    Stored,
    /// Snapshot was not completed
    NotCacheable,
    /// An invalidation ran while the snapshot was in flight
    Superseded,
}

/// Completed-analysis cache
///
/// Cloning is cheap; clones share entries, tags and counters.
#[derive(Clone)]
pub struct StatusCache {
    inner: Cache<CacheKey, Arc<Analysis>>,
    tags: TagIndex,
    generation: Arc<AtomicU64>,
    counters: Arc<Counters>,
}

impl fmt::Debug for StatusCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusCache")
            .field("entry_count", &self.inner.entry_count())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl StatusCache {
    /// Create new cache with max capacity
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let tags = TagIndex::new();
        let evicted = tags.clone();
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .eviction_listener(move |key: Arc<CacheKey>, _, cause: RemovalCause| {
                // Explicit removals maintain the index themselves
                if cause.was_evicted() {
                    evicted.forget(&key);
                }
            })
            .build();
        Self {
            inner,
            tags,
            generation: Arc::new(AtomicU64::new(0)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Current invalidation generation.
    ///
    /// Read it before fetching a snapshot and pass it to
    /// [`insert_observed`](Self::insert_observed).
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Get cached snapshot
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<Analysis>> {
        let hit = self.inner.get(key).await;
        let counter = if hit.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        hit
    }

    /// Store a snapshot if it is completed
    pub async fn insert(&self, analysis: Arc<Analysis>, scope: AuthScope) -> StoreOutcome {
        let observed = self.generation();
        self.insert_observed(analysis, scope, observed).await
    }

    /// Store a snapshot fetched while the generation was `observed`.
    ///
    /// If any invalidation ran since `observed`, the write is undone and
    /// `Superseded` is returned. A snapshot that is no longer completed
    /// evicts the cached entry for its key unless that entry is newer.
    pub async fn insert_observed(
        &self,
        analysis: Arc<Analysis>,
        scope: AuthScope,
        observed: u64,
    ) -> StoreOutcome {
        let key = CacheKey::new(analysis.id, scope);
        if !analysis.status.is_cacheable() {
            self.counters.refused.fetch_add(1, Ordering::Relaxed);
            trace!(id = %analysis.id, status = %analysis.status, "refusing non-completed snapshot");
            let stale = self
                .inner
                .get(&key)
                .await
                .is_some_and(|cached| cached.updated_at <= analysis.updated_at);
            if stale {
                self.invalidate(&key).await;
                debug!(%key, status = %analysis.status, "dropped snapshot that left completed");
            }
            return StoreOutcome::NotCacheable;
        }

        // Tag after inserting, check the generation last: a racing
        // invalidation either resolves this key or is seen by the check.
        self.inner.insert(key, analysis).await;
        self.tags.register(key);

        if self.generation() != observed {
            self.tags.forget(&key);
            self.inner.invalidate(&key).await;
            debug!(%key, "discarded snapshot fetched before invalidation");
            return StoreOutcome::Superseded;
        }

        self.counters.stores.fetch_add(1, Ordering::Relaxed);
        debug!(%key, "cached completed analysis");
        StoreOutcome::Stored
    }

    /// Invalidate a single key
    pub async fn invalidate(&self, key: &CacheKey) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.tags.forget(key);
        self.inner.invalidate(key).await;
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Invalidate every key registered under `tag`; returns how many
    pub async fn invalidate_tag(&self, tag: &CacheTag) -> usize {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let keys = self.tags.take(tag);
        for key in &keys {
            self.inner.invalidate(key).await;
        }
        // The index may lag an eviction racing a re-insert; cover the
        // keys a tag can address without it.
        match tag {
            CacheTag::Analysis(id) => {
                for scope in [AuthScope::Anonymous, AuthScope::Authenticated] {
                    self.inner.invalidate(&CacheKey::new(*id, scope)).await;
                }
            }
            CacheTag::AllAnalyses => self.inner.invalidate_all(),
        }
        self.counters
            .invalidations
            .fetch_add(keys.len() as u64, Ordering::Relaxed);
        debug!(%tag, dropped = keys.len(), "invalidated cache tag");
        keys.len()
    }

    /// Invalidate one analysis in every auth scope
    pub async fn invalidate_analysis(&self, id: AnalysisId) -> usize {
        self.invalidate_tag(&CacheTag::Analysis(id)).await
    }

    /// Revalidate one analysis, or everything when `id` is `None`
    pub async fn revalidate(&self, id: Option<AnalysisId>) -> usize {
        match id {
            Some(id) => self.invalidate_analysis(id).await,
            None => self.invalidate_tag(&CacheTag::AllAnalyses).await,
        }
    }

    /// Invalidate all entries
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.tags.clear();
        self.inner.invalidate_all();
    }

    /// Check if cache holds `key`, without touching hit counters
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.contains_key(key)
    }

    /// Keys `tag` would invalidate
    #[must_use]
    pub fn keys_for(&self, tag: &CacheTag) -> std::collections::HashSet<CacheKey> {
        self.tags.resolve(tag)
    }

    /// Get approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Apply pending maintenance so counts are exact
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            refused: self.counters.refused.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl Default for StatusCache {
    /// Create cache with default capacity (10,000 entries)
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smicrab_core::AnalyzeStatus;
    use smicrab_test_utils::analysis_with_status;

    #[tokio::test]
    async fn test_cache_stores_completed() {
        let cache = StatusCache::default();
        let analysis = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
        let key = CacheKey::new(analysis.id, AuthScope::Authenticated);

        assert_eq!(
            cache.insert(Arc::clone(&analysis), AuthScope::Authenticated).await,
            StoreOutcome::Stored
        );
        assert_eq!(cache.get(&key).await, Some(analysis));
        // Scopes are not conflated
        assert!(cache
            .get(&CacheKey::new(key.id, AuthScope::Anonymous))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_cache_refuses_non_completed() {
        let cache = StatusCache::default();
        for status in [
            AnalyzeStatus::Pending,
            AnalyzeStatus::Configured,
            AnalyzeStatus::InProgress,
            AnalyzeStatus::Error,
            AnalyzeStatus::Unknown,
        ] {
            let analysis = Arc::new(analysis_with_status(status));
            let key = CacheKey::new(analysis.id, AuthScope::Anonymous);
            assert_eq!(
                cache.insert(analysis, AuthScope::Anonymous).await,
                StoreOutcome::NotCacheable
            );
            assert!(!cache.contains(&key));
        }
        assert_eq!(cache.stats().refused, 5);
    }

    #[tokio::test]
    async fn test_invalidate_analysis_drops_every_scope() {
        let cache = StatusCache::default();
        let analysis = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
        let other = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
        cache.insert(Arc::clone(&analysis), AuthScope::Anonymous).await;
        cache.insert(Arc::clone(&analysis), AuthScope::Authenticated).await;
        cache.insert(Arc::clone(&other), AuthScope::Anonymous).await;

        assert_eq!(cache.invalidate_analysis(analysis.id).await, 2);
        assert!(!cache.contains(&CacheKey::new(analysis.id, AuthScope::Anonymous)));
        assert!(!cache.contains(&CacheKey::new(analysis.id, AuthScope::Authenticated)));
        assert!(cache.contains(&CacheKey::new(other.id, AuthScope::Anonymous)));
    }

    #[tokio::test]
    async fn test_revalidate_without_id_sweeps_everything() {
        let cache = StatusCache::default();
        let a = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
        let b = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
        cache.insert(Arc::clone(&a), AuthScope::Anonymous).await;
        cache.insert(Arc::clone(&b), AuthScope::Authenticated).await;

        assert_eq!(cache.revalidate(None).await, 2);
        assert!(!cache.contains(&CacheKey::new(a.id, AuthScope::Anonymous)));
        assert!(!cache.contains(&CacheKey::new(b.id, AuthScope::Authenticated)));
        assert!(cache.keys_for(&CacheTag::AllAnalyses).is_empty());
    }

    #[tokio::test]
    async fn test_write_racing_invalidation_is_discarded() {
        let cache = StatusCache::default();
        let analysis = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
        let observed = cache.generation();

        // Mutation lands while the read is in flight
        cache.invalidate_analysis(analysis.id).await;

        let outcome = cache
            .insert_observed(Arc::clone(&analysis), AuthScope::Anonymous, observed)
            .await;
        assert_eq!(outcome, StoreOutcome::Superseded);
        assert!(!cache.contains(&CacheKey::new(analysis.id, AuthScope::Anonymous)));
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let cache = StatusCache::default();
        let analysis = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
        let key = CacheKey::new(analysis.id, AuthScope::Anonymous);

        assert!(cache.get(&key).await.is_none());
        cache.insert(analysis, AuthScope::Anonymous).await;
        assert!(cache.get(&key).await.is_some());
        cache.sync().await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.stores, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_snapshot_leaving_completed_evicts_entry() {
        let cache = StatusCache::default();
        let completed = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
        let key = CacheKey::new(completed.id, AuthScope::Anonymous);
        cache.insert(Arc::clone(&completed), AuthScope::Anonymous).await;

        let mut reconfigured = (*completed).clone();
        reconfigured.status = AnalyzeStatus::Configured;
        reconfigured.updated_at += chrono::Duration::seconds(1);
        assert_eq!(
            cache.insert(Arc::new(reconfigured), AuthScope::Anonymous).await,
            StoreOutcome::NotCacheable
        );
        assert!(!cache.contains(&key));
        assert!(cache.keys_for(&CacheTag::Analysis(completed.id)).is_empty());
    }

    #[tokio::test]
    async fn test_older_non_completed_snapshot_keeps_entry() {
        let cache = StatusCache::default();
        let completed = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
        cache.insert(Arc::clone(&completed), AuthScope::Anonymous).await;

        // A slow poll answered with the state from before completion
        let mut running = (*completed).clone();
        running.status = AnalyzeStatus::InProgress;
        running.updated_at -= chrono::Duration::seconds(5);
        cache.insert(Arc::new(running), AuthScope::Anonymous).await;

        assert!(cache.contains(&CacheKey::new(completed.id, AuthScope::Anonymous)));
    }

    #[tokio::test]
    async fn test_tag_index_follows_capacity_eviction() {
        let capacity = 2;
        let cache = StatusCache::new(capacity);
        for _ in 0..50 {
            let analysis = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
            cache.insert(analysis, AuthScope::Anonymous).await;
            cache.sync().await;
        }
        cache.sync().await;

        assert!(cache.entry_count() <= capacity);
        assert!(cache.keys_for(&CacheTag::AllAnalyses).len() as u64 <= capacity);
    }

    #[tokio::test]
    async fn test_invalidate_all_clears_tag_index() {
        let cache = StatusCache::default();
        for scope in [AuthScope::Anonymous, AuthScope::Authenticated] {
            let analysis = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
            cache.insert(analysis, scope).await;
        }

        cache.invalidate_all();
        cache.sync().await;

        assert!(cache.keys_for(&CacheTag::AllAnalyses).is_empty());
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_key_display() {
        let id: AnalysisId = "0b5f7a36-2f0a-4c55-9f1d-0d6c1c7e9a10".parse().unwrap();
        assert_eq!(
            CacheKey::new(id, AuthScope::Anonymous).to_string(),
            "completed-analysis-0b5f7a36-2f0a-4c55-9f1d-0d6c1c7e9a10-no-auth"
        );
    }
}
