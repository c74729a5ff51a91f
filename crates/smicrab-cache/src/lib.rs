//! SMICRAB Cache - completed-analysis status cache
//!
//! Provides:
//! - `StatusCache`: moka-backed store that only ever holds completed analyses
//! - `TagIndex`: explicit tag -> keys dependency graph for invalidation
//! - `SmartFetcher`: cache-preferring and bypass status reads

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod fetcher;
pub mod store;
pub mod tags;

pub use fetcher::{PollingInfo, SmartFetcher};
pub use store::{CacheKey, CacheStats, StatusCache, StoreOutcome, DEFAULT_CAPACITY};
pub use tags::{CacheTag, TagIndex};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
