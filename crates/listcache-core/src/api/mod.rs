//! Remote data gateway for the list-oriented REST API.
//!
//! This module provides the `ListClient` for fetching list items, single
//! items and user records, performing digest-authorized writes, and falling
//! back to static JSON snapshots when the live backend is unreachable.
//!
//! Reads use the `application/json;odata=nometadata` format, so collections
//! arrive as `{ value: [...] }` and single records bare or `{ d: {...} }`.

pub mod client;
pub mod error;
pub mod fallback;

pub use client::ListClient;
pub use error::DataError;
