//! Request digest handling.
//!
//! Mutating requests carry an `X-RequestDigest` header. The digest is a
//! short-lived token obtained from the backend's `contextinfo` endpoint,
//! held only in process memory and refetched once it is within a minute of
//! expiry.

pub mod digest;

pub use digest::{Digest, DigestStore};
