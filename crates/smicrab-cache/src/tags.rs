//! Tag index for cache invalidation
//!
//! Every cached key is registered under the tags that may invalidate it.
//! Invalidation is then a lookup from tag to the set of keys to drop.

use crate::store::CacheKey;
use dashmap::DashMap;
use smicrab_core::AnalysisId;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Invalidation tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTag {
    /// Entries for one analysis, any auth scope
    Analysis(AnalysisId),
    /// Every entry
    AllAnalyses,
}

impl CacheTag {
    /// Tags a key is registered under
    #[inline]
    #[must_use]
    pub fn for_key(key: &CacheKey) -> [CacheTag; 2] {
        [CacheTag::Analysis(key.id), CacheTag::AllAnalyses]
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analysis(id) => write!(f, "analysis:{id}"),
            Self::AllAnalyses => f.write_str("analyses:all"),
        }
    }
}

/// Concurrent tag -> keys index
///
/// Keys leave the index on invalidation and on capacity eviction.
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    by_tag: Arc<DashMap<CacheTag, HashSet<CacheKey>>>,
}

impl TagIndex {
    /// Create empty index
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key under all of its tags
    pub fn register(&self, key: CacheKey) {
        for tag in CacheTag::for_key(&key) {
            self.by_tag.entry(tag).or_default().insert(key);
        }
    }

    /// Keys a tag invalidates
    #[must_use]
    pub fn resolve(&self, tag: &CacheTag) -> HashSet<CacheKey> {
        self.by_tag
            .get(tag)
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }

    /// Resolve a tag and forget the keys it covered.
    ///
    /// Only the resolved keys are removed; a key registered concurrently
    /// stays indexed.
    pub fn take(&self, tag: &CacheTag) -> HashSet<CacheKey> {
        let keys = self.resolve(tag);
        for key in &keys {
            self.forget(key);
        }
        keys
    }

    /// Remove a key from every tag it is registered under
    pub fn forget(&self, key: &CacheKey) {
        for tag in CacheTag::for_key(key) {
            if let Some(mut keys) = self.by_tag.get_mut(&tag) {
                keys.remove(key);
            }
            self.by_tag.remove_if(&tag, |_, keys| keys.is_empty());
        }
    }

    /// Forget every key
    pub fn clear(&self) {
        self.by_tag.clear();
    }

    /// Number of tags with registered keys
    #[inline]
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.by_tag.len()
    }
}
