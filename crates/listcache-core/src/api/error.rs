use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by the gateway, the request cache and the preload cycle.
///
/// `Clone` so that one failed load can be delivered to every caller that was
/// coalesced onto it.
#[derive(Error, Debug, Clone)]
pub enum DataError {
    #[error("Network failure for {target}: {source}")]
    NetworkFailure {
        target: String,
        #[source]
        source: Arc<reqwest::Error>,
    },

    #[error("Unauthorized for {target} - credentials may be expired")]
    Unauthorized { target: String },

    #[error("Access denied for {target}: {body}")]
    AccessDenied { target: String, body: String },

    #[error("Not found: {target}: {body}")]
    NotFound { target: String, body: String },

    #[error("Rate limited on {target} - please wait before retrying")]
    RateLimited { target: String },

    #[error("Server error for {target}: {body}")]
    ServerError { target: String, body: String },

    #[error("Unexpected status {status} for {target}: {body}")]
    HttpStatus {
        target: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {target}: {message}")]
    InvalidResponse { target: String, message: String },

    #[error("Unexpected response envelope from {target}: {message}")]
    EnvelopeMismatch { target: String, message: String },

    #[error("Fallback unavailable for {target}: {reason}")]
    FallbackUnavailable { target: String, reason: String },

    #[error("Could not obtain request digest: {0}")]
    CredentialFailure(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Preload failed loading {slot}: {source}")]
    Preload {
        slot: String,
        #[source]
        source: Box<DataError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl DataError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(target: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let target = target.to_string();
        let body = Self::truncate_body(body);
        match status.as_u16() {
            401 => DataError::Unauthorized { target },
            403 => DataError::AccessDenied { target, body },
            404 => DataError::NotFound { target, body },
            429 => DataError::RateLimited { target },
            500..=599 => DataError::ServerError { target, body },
            code => DataError::HttpStatus {
                target,
                status: code,
                body,
            },
        }
    }

    pub fn network(target: &str, source: reqwest::Error) -> Self {
        DataError::NetworkFailure {
            target: target.to_string(),
            source: Arc::new(source),
        }
    }

    pub fn fallback(target: &str, reason: impl Into<String>) -> Self {
        DataError::FallbackUnavailable {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    pub fn preload(slot: &str, source: DataError) -> Self {
        DataError::Preload {
            slot: slot.to_string(),
            source: Box::new(source),
        }
    }

    /// True for transport and HTTP failures of the live backend.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            DataError::NetworkFailure { .. }
                | DataError::Unauthorized { .. }
                | DataError::AccessDenied { .. }
                | DataError::NotFound { .. }
                | DataError::RateLimited { .. }
                | DataError::ServerError { .. }
                | DataError::HttpStatus { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            DataError::from_status("x", StatusCode::UNAUTHORIZED, ""),
            DataError::Unauthorized { .. }
        ));
        assert!(matches!(
            DataError::from_status("x", StatusCode::NOT_FOUND, "gone"),
            DataError::NotFound { .. }
        ));
        assert!(matches!(
            DataError::from_status("x", StatusCode::BAD_GATEWAY, ""),
            DataError::ServerError { .. }
        ));
        assert!(matches!(
            DataError::from_status("x", StatusCode::IM_A_TEAPOT, ""),
            DataError::HttpStatus { status: 418, .. }
        ));
    }

    #[test]
    fn test_body_truncated() {
        let body = "é".repeat(400);
        let err = DataError::from_status("x", StatusCode::FORBIDDEN, &body);
        let DataError::AccessDenied { body, .. } = err else {
            panic!("expected AccessDenied");
        };
        assert!(body.contains("truncated, 800 total bytes"));
    }

    #[test]
    fn test_preload_wraps_source() {
        let err = DataError::preload("siteUsers", DataError::Cancelled("k".into()));
        assert_eq!(
            err.to_string(),
            "Preload failed loading siteUsers: Request cancelled: k"
        );
        assert!(!err.is_network());
    }
}
