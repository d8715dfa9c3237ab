//! Application configuration management.
//!
//! This module handles loading the JSON configuration that describes the
//! backend endpoint, cache timeout, page size, the lists to preload (keyed
//! by alias, each with an optional fallback snapshot), the user endpoints
//! and the parent/requirement relationship.
//!
//! The default location is `~/.config/listcache/config.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::ListQueryOptions;

/// Application name used for config directory paths
const APP_NAME: &str = "listcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default cache timeout. Short enough that edits made by other users show
/// up within a few navigations.
const DEFAULT_CACHE_TIMEOUT_MINUTES: u64 = 5;

/// Default `$top` when a fetch does not set one.
const DEFAULT_PAGE_SIZE: u32 = 100;

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_CURRENT_USER_ENDPOINT: &str = "Web/currentuser";
const DEFAULT_SITE_USERS_ENDPOINT: &str = "Web/siteusers";

fn default_cache_timeout_minutes() -> u64 {
    DEFAULT_CACHE_TIMEOUT_MINUTES
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_request_timeout_seconds() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Base REST endpoint, e.g. `https://tenant.example.com/sites/ops/_api/`
    #[serde(default)]
    pub api_endpoint: String,
    #[serde(default = "default_cache_timeout_minutes")]
    pub cache_timeout_minutes: u64,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Serve configured snapshots without calling the backend
    #[serde(default)]
    pub use_fallback_data: bool,
    /// Directory that relative snapshot paths resolve against
    #[serde(default)]
    pub fallback_root: Option<PathBuf>,
    #[serde(default)]
    pub digest_fallback_file: Option<String>,
    #[serde(default)]
    pub lists: BTreeMap<String, ListConfig>,
    #[serde(default)]
    pub users: UsersConfig,
    #[serde(default)]
    pub relationships: RelationshipConfig,
}

/// One preloaded list, keyed by alias in `AppConfig::lists`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConfig {
    /// List title on the backend
    pub name: String,
    #[serde(default)]
    pub fallback_file: Option<String>,
    /// Default query used when preloading this list
    #[serde(flatten)]
    pub query: ListQueryOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    /// Path relative to `apiEndpoint`
    pub endpoint: String,
    #[serde(default)]
    pub fallback_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersConfig {
    #[serde(default = "UsersConfig::default_current_user")]
    pub current_user: EndpointConfig,
    #[serde(default = "UsersConfig::default_site_users")]
    pub site_users: EndpointConfig,
}

impl UsersConfig {
    fn default_current_user() -> EndpointConfig {
        EndpointConfig {
            endpoint: DEFAULT_CURRENT_USER_ENDPOINT.to_string(),
            fallback_file: None,
        }
    }

    fn default_site_users() -> EndpointConfig {
        EndpointConfig {
            endpoint: DEFAULT_SITE_USERS_ENDPOINT.to_string(),
            fallback_file: None,
        }
    }
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            current_user: Self::default_current_user(),
            site_users: Self::default_site_users(),
        }
    }
}

/// Which list aliases hold parents and requirements, and the link field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelationshipConfig {
    pub parent_list: String,
    pub requirement_list: String,
    pub link_field: String,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            parent_list: "osseParentList".to_string(),
            requirement_list: "osseRequirementList".to_string(),
            link_field: "ParentId".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `explicit_path`, or from the default location.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_json_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        // Snapshot paths are relative to the config file unless told otherwise.
        if config.fallback_root.is_none() {
            config.fallback_root = path.parent().map(Path::to_path_buf);
        }
        Ok(config)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_endpoint.trim().is_empty() && !self.use_fallback_data {
            bail!("apiEndpoint is required unless useFallbackData is set");
        }
        if self.cache_timeout_minutes == 0 {
            bail!("cacheTimeoutMinutes must be positive");
        }
        if self.default_page_size == 0 {
            bail!("defaultPageSize must be positive");
        }
        for (alias, list) in &self.lists {
            if list.name.trim().is_empty() {
                bail!("list '{}' has an empty name", alias);
            }
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Base endpoint without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api_endpoint.trim().trim_end_matches('/')
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_timeout_minutes.saturating_mul(60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn fallback_root(&self) -> PathBuf {
        self.fallback_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Find the alias and configuration for a backend list title.
    pub fn list_by_name(&self, name: &str) -> Option<(&str, &ListConfig)> {
        self.lists
            .iter()
            .find(|(_, list)| list.name == name)
            .map(|(alias, list)| (alias.as_str(), list))
    }

    /// Fallback snapshot configured for a backend list title, if any.
    pub fn list_fallback(&self, name: &str) -> Option<&str> {
        self.list_by_name(name)
            .and_then(|(_, list)| list.fallback_file.as_deref())
    }
}
