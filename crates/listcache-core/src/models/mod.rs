//! Data models for list content.
//!
//! This module contains the structures that flow between the gateway,
//! the request cache and consumers:
//!
//! - `Record`: one list item (or user), an open map of field name to value
//! - `ListQueryOptions`: select/filter/orderby/top/skip/expand for a fetch
//! - `envelope`: normalization of `{value: [...]}` and `{d: ...}` responses

pub mod envelope;
pub mod query;
pub mod record;

pub use query::ListQueryOptions;
pub use record::Record;
