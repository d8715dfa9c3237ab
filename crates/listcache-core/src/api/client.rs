//! Gateway for the list-oriented REST API.
//!
//! This module provides the `ListClient` struct which turns domain-level
//! requests (list items, a single item, users, writes) into REST calls,
//! normalizes the response envelopes and falls back to static snapshots
//! when the live backend cannot be reached.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, Response};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::auth::digest::{self, Digest, DigestStore};
use crate::config::AppConfig;
use crate::models::{envelope, ListQueryOptions, Record};

use super::fallback::SnapshotLoader;
use super::DataError;

// ============================================================================
// Constants
// ============================================================================

/// Accept header for reads and writes; yields `{value: [...]}` collections.
const ACCEPT_JSON_LIGHT: &str = "application/json;odata=nometadata";

/// Accept header for `contextinfo`, whose documented shape is the verbose one.
const ACCEPT_JSON_VERBOSE: &str = "application/json;odata=verbose";

const REQUEST_DIGEST_HEADER: &str = "X-RequestDigest";
const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Default field selection for the site list catalogue.
const LIST_CATALOG_SELECT: [&str; 4] = ["Id", "Title", "ItemCount", "LastItemModifiedDate"];

/// Gateway to the remote list API.
/// Clone is cheap - the reqwest client, configuration and digest are shared.
#[derive(Clone)]
pub struct ListClient {
    client: Client,
    config: Arc<AppConfig>,
    snapshots: SnapshotLoader,
    digest: Arc<DigestStore>,
}

/// Quote a value for use inside an OData string literal.
fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn item_target(list: &str, id: i64) -> String {
    format!("{}({})", list, id)
}

impl ListClient {
    pub fn new(config: Arc<AppConfig>) -> Result<Self, DataError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DataError::Config(format!("failed to build HTTP client: {}", e)))?;
        let snapshots = SnapshotLoader::new(client.clone(), config.fallback_root());

        Ok(Self {
            client,
            config,
            snapshots,
            digest: Arc::new(DigestStore::new()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn digest_store(&self) -> &DigestStore {
        &self.digest
    }

    // ===== URL construction =====

    pub fn list_items_url(&self, list: &str) -> String {
        format!(
            "{}/Web/Lists/GetByTitle('{}')/items",
            self.config.base_url(),
            odata_literal(list)
        )
    }

    pub fn list_item_url(&self, list: &str, id: i64) -> String {
        format!("{}({})", self.list_items_url(list), id)
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url(), path.trim_start_matches('/'))
    }

    // ===== Transport helpers =====

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response, target: &str) -> Result<Response, DataError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DataError::from_status(target, status, &body))
        }
    }

    async fn read_json(response: Response, target: &str) -> Result<Value, DataError> {
        let response = Self::check_response(response, target).await?;
        let text = response
            .text()
            .await
            .map_err(|e| DataError::network(target, e))?;
        serde_json::from_str(&text).map_err(|e| DataError::InvalidResponse {
            target: target.to_string(),
            message: format!("body is not JSON: {}", e),
        })
    }

    async fn get_json(
        &self,
        url: &str,
        params: &[(&'static str, String)],
        target: &str,
    ) -> Result<Value, DataError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .header(header::ACCEPT, ACCEPT_JSON_LIGHT)
                .query(params)
                .send()
                .await
                .map_err(|e| DataError::network(target, e))?;

            if response.status().as_u16() != 429 {
                return Self::read_json(response, target).await;
            }

            // Rate limited
            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(DataError::RateLimited {
                    target: target.to_string(),
                });
            }
            warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2; // Exponential backoff
        }
    }

    /// Run a live read, falling back to a snapshot on failure.
    ///
    /// In fallback-only mode the snapshot is used without touching the
    /// backend. When both fail, the live error is the one returned.
    async fn read_with_fallback<T, Fut>(
        &self,
        target: &str,
        fallback: Option<&str>,
        live: Fut,
        from_live: impl FnOnce(Value) -> T,
        from_snapshot: impl FnOnce(Value, &str) -> Result<T, DataError>,
    ) -> Result<T, DataError>
    where
        Fut: Future<Output = Result<Value, DataError>>,
    {
        if self.config.use_fallback_data {
            if let Some(location) = fallback {
                info!(endpoint = target, snapshot = location, "Using fallback data instead of API");
                let body = self.snapshots.load(location).await?;
                return from_snapshot(body, location);
            }
        }

        let live_error = match live.await {
            Ok(body) => return Ok(from_live(body)),
            Err(e) => e,
        };

        let Some(location) = fallback else {
            error!(endpoint = target, error = %live_error, "API request failed and no fallback file configured");
            return Err(live_error);
        };

        warn!(endpoint = target, snapshot = location, error = %live_error, "API request failed, trying fallback file");
        let snapshot = match self.snapshots.load(location).await {
            Ok(body) => from_snapshot(body, location),
            Err(e) => Err(e),
        };
        snapshot.map_err(|fallback_error| {
            error!(
                endpoint = target,
                error = %live_error,
                fallback_error = %fallback_error,
                "Both API request and fallback file failed"
            );
            live_error
        })
    }

    // ===== Reads =====

    /// Fetch the items of a list.
    pub async fn fetch_collection(
        &self,
        list: &str,
        options: &ListQueryOptions,
    ) -> Result<Vec<Record>, DataError> {
        let url = self.list_items_url(list);
        let params = options.collection_params(self.config.default_page_size);
        debug!(list = list, query = %options.describe(), "Fetching list items");

        let records = self
            .read_with_fallback(
                list,
                self.config.list_fallback(list),
                self.get_json(&url, &params, list),
                |body| envelope::collection(body, list),
                |body, location| Ok(envelope::collection(body, location)),
            )
            .await?;

        debug!(list = list, count = records.len(), "Fetched list items");
        Ok(records)
    }

    /// Fetch one item by id. The fallback is the list snapshot, searched by `Id`.
    pub async fn fetch_item(
        &self,
        list: &str,
        id: i64,
        options: &ListQueryOptions,
    ) -> Result<Record, DataError> {
        let url = self.list_item_url(list, id);
        let params = options.item_params();
        let target = item_target(list, id);

        self.read_with_fallback(
            &target,
            self.config.list_fallback(list),
            self.get_json(&url, &params, &target),
            |body| envelope::item(body, &target),
            |body, location| {
                envelope::collection(body, location)
                    .into_iter()
                    .find(|record| record.id() == Some(id))
                    .ok_or_else(|| {
                        DataError::fallback(location, format!("item {} not in snapshot", id))
                    })
            },
        )
        .await
    }

    pub async fn fetch_current_user(&self, options: &ListQueryOptions) -> Result<Record, DataError> {
        let endpoint = &self.config.users.current_user;
        let url = self.endpoint_url(&endpoint.endpoint);
        let params = options.item_params();

        self.read_with_fallback(
            "currentUser",
            endpoint.fallback_file.as_deref(),
            self.get_json(&url, &params, "currentUser"),
            |body| envelope::item(body, "currentUser"),
            |body, location| Ok(envelope::item(body, location)),
        )
        .await
    }

    pub async fn fetch_site_users(
        &self,
        options: &ListQueryOptions,
    ) -> Result<Vec<Record>, DataError> {
        let endpoint = &self.config.users.site_users;
        let url = self.endpoint_url(&endpoint.endpoint);
        let params = options.params(None);

        let users = self
            .read_with_fallback(
                "siteUsers",
                endpoint.fallback_file.as_deref(),
                self.get_json(&url, &params, "siteUsers"),
                |body| envelope::collection(body, "siteUsers"),
                |body, location| Ok(envelope::collection(body, location)),
            )
            .await?;

        debug!(count = users.len(), "Fetched site users");
        Ok(users)
    }

    /// Fetch the site's list catalogue. No fallback.
    pub async fn fetch_lists(&self, options: &ListQueryOptions) -> Result<Vec<Record>, DataError> {
        let url = self.endpoint_url("Web/Lists");
        let options = if options.select.is_some() {
            options.clone()
        } else {
            options.clone().select(LIST_CATALOG_SELECT)
        };
        let body = self.get_json(&url, &options.params(None), "lists").await?;
        Ok(envelope::collection(body, "lists"))
    }

    /// Fetch user profile properties for an account name. No fallback.
    pub async fn fetch_user_profile(&self, login_name: &str) -> Result<Record, DataError> {
        let url = self.endpoint_url("SP.UserProfiles.PeopleManager/GetPropertiesFor(accountName=@v)");
        let params = [("@v", format!("'{}'", odata_literal(login_name)))];
        let target = format!("userProfile({})", login_name);
        let body = self.get_json(&url, &params, &target).await?;
        Ok(envelope::item(body, &target))
    }

    // ===== Writes =====

    /// Create an item. Returns the created record as echoed by the backend.
    pub async fn create_item(&self, list: &str, fields: &Record) -> Result<Record, DataError> {
        let url = self.list_items_url(list);
        let body = self
            .send_write(Method::POST, &url, None, Some(fields), list)
            .await?;
        info!(list = list, "Created list item");
        Ok(body
            .map(|b| envelope::item(b, list))
            .unwrap_or_default())
    }

    /// Merge `fields` into an existing item.
    pub async fn update_item(&self, list: &str, id: i64, fields: &Record) -> Result<(), DataError> {
        let url = self.list_item_url(list, id);
        let target = item_target(list, id);
        let merge = Method::from_bytes(b"MERGE")
            .map_err(|e| DataError::Config(format!("invalid method: {}", e)))?;
        self.send_write(merge, &url, Some("MERGE"), Some(fields), &target)
            .await?;
        info!(list = list, id = id, "Updated list item");
        Ok(())
    }

    pub async fn delete_item(&self, list: &str, id: i64) -> Result<(), DataError> {
        let url = self.list_item_url(list, id);
        let target = item_target(list, id);
        self.send_write(Method::DELETE, &url, Some("DELETE"), None, &target)
            .await?;
        info!(list = list, id = id, "Deleted list item");
        Ok(())
    }

    /// Send a mutating request with a valid digest. Never falls back.
    async fn send_write(
        &self,
        method: Method,
        url: &str,
        method_override: Option<&str>,
        body: Option<&Record>,
        target: &str,
    ) -> Result<Option<Value>, DataError> {
        let digest = self.get_credential().await?;

        let mut request = self
            .client
            .request(method, url)
            .header(header::ACCEPT, ACCEPT_JSON_LIGHT)
            .header(REQUEST_DIGEST_HEADER, digest);
        if let Some(method_override) = method_override {
            request = request
                .header(METHOD_OVERRIDE_HEADER, method_override)
                .header(header::IF_MATCH, "*");
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DataError::network(target, e))?;
        let response = match Self::check_response(response, target).await {
            Ok(response) => response,
            Err(e) => {
                if matches!(e, DataError::Unauthorized { .. } | DataError::AccessDenied { .. }) {
                    // A rejected digest must not be reused.
                    self.digest.clear().await;
                }
                return Err(e);
            }
        };

        let text = response
            .text()
            .await
            .map_err(|e| DataError::network(target, e))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| DataError::InvalidResponse {
                target: target.to_string(),
                message: format!("body is not JSON: {}", e),
            })
    }

    // ===== Credential =====

    /// Return a valid request digest, acquiring a new one when needed.
    pub async fn get_credential(&self) -> Result<String, DataError> {
        self.digest.get_or_refresh(|| self.acquire_digest()).await
    }

    async fn acquire_digest(&self) -> Result<Digest, DataError> {
        let fallback = self.config.digest_fallback_file.as_deref();

        if self.config.use_fallback_data {
            let location = fallback.ok_or_else(|| {
                DataError::CredentialFailure(
                    "fallback-only mode and no digestFallbackFile configured".to_string(),
                )
            })?;
            info!(snapshot = location, "Using fallback data instead of API for digest");
            return self
                .load_digest_snapshot(location)
                .await
                .map_err(|e| DataError::CredentialFailure(e.to_string()));
        }

        let live_error = match self.request_context_info().await {
            Ok(digest) => {
                info!(expires_in = digest.seconds_until_expiry(), "Obtained request digest");
                return Ok(digest);
            }
            Err(e) => e,
        };

        warn!(error = %live_error, "Error getting request digest");
        let Some(location) = fallback else {
            return Err(DataError::CredentialFailure(live_error.to_string()));
        };
        match self.load_digest_snapshot(location).await {
            Ok(digest) => {
                warn!(snapshot = location, "Using fallback digest");
                Ok(digest)
            }
            Err(fallback_error) => Err(DataError::CredentialFailure(format!(
                "{}; fallback: {}",
                live_error, fallback_error
            ))),
        }
    }

    async fn request_context_info(&self) -> Result<Digest, DataError> {
        let url = self.endpoint_url("contextinfo");
        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, ACCEPT_JSON_VERBOSE)
            .send()
            .await
            .map_err(|e| DataError::network("contextinfo", e))?;
        let body = Self::read_json(response, "contextinfo").await?;
        digest::parse_context_info(&body, "contextinfo")
    }

    async fn load_digest_snapshot(&self, location: &str) -> Result<Digest, DataError> {
        let body = self.snapshots.load(location).await?;
        digest::parse_digest_snapshot(&body, location)
    }
}
