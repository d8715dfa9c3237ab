//! listcache-core - cached access to a list-oriented REST API.
//!
//! This crate contains the non-UI logic:
//! - `api` - gateway for list, item, user and write calls, with snapshot fallback
//! - `auth` - request digest acquisition and reuse
//! - `cache` - in-memory request cache with coalescing, TTL and invalidation
//! - `config` - JSON configuration
//! - `models` - records, query options, response envelopes
//! - `preload` - startup batch, named slots and parent/requirement relationships
//! - `service` - the `ListService` facade tying them together

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod preload;
pub mod service;

pub use api::{DataError, ListClient};
pub use cache::{CacheKey, CacheStats, RequestCache};
pub use config::AppConfig;
pub use models::{ListQueryOptions, Record};
pub use preload::{DataSlots, PreloadSummary};
pub use service::ListService;
