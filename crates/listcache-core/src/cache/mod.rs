//! In-memory request cache.
//!
//! This module provides the `RequestCache` which memoizes gateway calls by
//! structured `CacheKey`, collapses concurrent identical requests into one
//! load, expires entries after the configured TTL (5 minutes by default) and
//! supports list-wide and per-item invalidation after writes.
//!
//! Nothing is persisted; the store lives as long as the owning service.

pub mod key;
pub mod manager;
pub mod stats;

pub use key::CacheKey;
pub use manager::{CachedValue, RequestCache};
pub use stats::{CacheCounters, CacheStats};
