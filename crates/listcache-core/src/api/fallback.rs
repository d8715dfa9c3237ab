//! Static snapshot loading.
//!
//! A snapshot mirrors the live response for one list or user endpoint. Paths
//! starting with `http://` or `https://` are fetched over HTTP; anything else
//! is read from disk relative to the configured fallback root.

use std::path::PathBuf;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::DataError;

#[derive(Clone)]
pub struct SnapshotLoader {
    client: Client,
    root: PathBuf,
}

impl SnapshotLoader {
    pub fn new(client: Client, root: PathBuf) -> Self {
        Self { client, root }
    }

    pub fn is_remote(location: &str) -> bool {
        location.starts_with("http://") || location.starts_with("https://")
    }

    /// Resolve a local snapshot path against the fallback root.
    pub fn resolve(&self, location: &str) -> PathBuf {
        let path = PathBuf::from(location);
        if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        }
    }

    /// Load and parse a snapshot. Every failure is `FallbackUnavailable`.
    pub async fn load(&self, location: &str) -> Result<Value, DataError> {
        debug!(snapshot = location, "Loading fallback snapshot");
        if Self::is_remote(location) {
            self.load_remote(location).await
        } else {
            self.load_local(location).await
        }
    }

    async fn load_local(&self, location: &str) -> Result<Value, DataError> {
        let path = self.resolve(location);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DataError::fallback(location, format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| DataError::fallback(location, format!("invalid JSON: {}", e)))
    }

    async fn load_remote(&self, location: &str) -> Result<Value, DataError> {
        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|e| DataError::fallback(location, e.to_string()))?;
        if !response.status().is_success() {
            return Err(DataError::fallback(
                location,
                format!("status {}", response.status()),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| DataError::fallback(location, format!("invalid JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loader(root: PathBuf) -> SnapshotLoader {
        SnapshotLoader::new(Client::new(), root)
    }

    #[tokio::test]
    async fn test_load_local_relative() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("FallbackData")).expect("mkdir");
        std::fs::write(
            dir.path().join("FallbackData/Widgets.json"),
            r#"{"value": [{"Id": 1}]}"#,
        )
        .expect("write");

        let value = loader(dir.path().to_path_buf())
            .load("FallbackData/Widgets.json")
            .await
            .expect("snapshot");
        assert_eq!(value, json!({"value": [{"Id": 1}]}));
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_fallback_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = loader(dir.path().to_path_buf())
            .load("nope.json")
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::FallbackUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_invalid_json_is_fallback_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("bad.json"), "{not json").expect("write");
        let err = loader(dir.path().to_path_buf())
            .load("bad.json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_remote_detection() {
        assert!(SnapshotLoader::is_remote("https://cdn/x.json"));
        assert!(!SnapshotLoader::is_remote("../SiteAssets/x.json"));
    }
}
