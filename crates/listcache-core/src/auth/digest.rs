use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::DataError;

/// Subtracted from the backend-reported timeout so a digest is never
/// presented in the last minute of its life.
const DIGEST_SAFETY_MARGIN_SECS: i64 = 60;

/// Lifetime assumed for a snapshot digest that carries no timeout.
const SNAPSHOT_DIGEST_LIFETIME_SECS: i64 = 1800;

/// Upper bound on a backend-reported digest lifetime.
const MAX_DIGEST_LIFETIME_SECS: i64 = u32::MAX as i64;

/// A request digest and the instant after which it must be refetched.
#[derive(Debug, Clone)]
pub struct Digest {
    pub value: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Digest {
    /// Build a digest from a backend-reported timeout, applying the safety margin.
    pub fn from_timeout(value: String, timeout_secs: i64) -> Self {
        let acquired_at = Utc::now();
        let usable = timeout_secs
            .saturating_sub(DIGEST_SAFETY_MARGIN_SECS)
            .clamp(0, MAX_DIGEST_LIFETIME_SECS);
        let expires_at = Duration::try_seconds(usable)
            .and_then(|lifetime| acquired_at.checked_add_signed(lifetime))
            .unwrap_or_else(|| {
                debug!(timeout_secs, "Digest timeout out of range, using default lifetime");
                acquired_at + Duration::seconds(SNAPSHOT_DIGEST_LIFETIME_SECS)
            });
        Self {
            value,
            acquired_at,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn seconds_until_expiry(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

/// Parse a `contextinfo` response:
/// `{ d: { GetContextWebInformation: { FormDigestValue, FormDigestTimeoutSeconds } } }`
pub fn parse_context_info(body: &Value, target: &str) -> Result<Digest, DataError> {
    let info = body
        .get("d")
        .and_then(|d| d.get("GetContextWebInformation"))
        .ok_or_else(|| DataError::EnvelopeMismatch {
            target: target.to_string(),
            message: "missing d.GetContextWebInformation".to_string(),
        })?;

    let value = info
        .get("FormDigestValue")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DataError::EnvelopeMismatch {
            target: target.to_string(),
            message: "missing FormDigestValue".to_string(),
        })?;

    let timeout = info
        .get("FormDigestTimeoutSeconds")
        .and_then(Value::as_i64)
        .ok_or_else(|| DataError::EnvelopeMismatch {
            target: target.to_string(),
            message: "missing FormDigestTimeoutSeconds".to_string(),
        })?;

    Ok(Digest::from_timeout(value.to_string(), timeout))
}

/// Parse a digest snapshot: either `{ digest: "..." }` or the live
/// `contextinfo` shape.
pub fn parse_digest_snapshot(body: &Value, target: &str) -> Result<Digest, DataError> {
    if let Some(value) = body.get("digest").and_then(Value::as_str) {
        if value.is_empty() {
            return Err(DataError::fallback(target, "empty digest"));
        }
        return Ok(Digest::from_timeout(
            value.to_string(),
            SNAPSHOT_DIGEST_LIFETIME_SECS + DIGEST_SAFETY_MARGIN_SECS,
        ));
    }
    parse_context_info(body, target)
        .map_err(|e| DataError::fallback(target, format!("invalid digest snapshot: {}", e)))
}

/// Process-memory holder for the current digest.
///
/// The async mutex is held across a refresh so concurrent writers share a
/// single acquisition.
#[derive(Debug, Default)]
pub struct DigestStore {
    current: Mutex<Option<Digest>>,
}

impl DigestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the held digest if still valid, otherwise acquire and store a new one.
    pub async fn get_or_refresh<F, Fut>(&self, acquire: F) -> Result<String, DataError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Digest, DataError>>,
    {
        let mut current = self.current.lock().await;
        if let Some(ref digest) = *current {
            if !digest.is_expired() {
                debug!(expires_in = digest.seconds_until_expiry(), "Using cached digest value");
                return Ok(digest.value.clone());
            }
        }

        debug!("Digest expired or not available, requesting new one");
        let digest = acquire().await?;
        let value = digest.value.clone();
        *current = Some(digest);
        Ok(value)
    }

    pub async fn current(&self) -> Option<Digest> {
        self.current.lock().await.clone()
    }

    pub async fn clear(&self) {
        *self.current.lock().await = None;
    }
}
