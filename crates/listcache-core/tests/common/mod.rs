//! Throwaway HTTP backend for integration tests.
//!
//! Routes are keyed by method and path below `/_api`; every request is
//! recorded so tests can assert on headers, query strings and call counts.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use listcache_core::AppConfig;

pub const DIGEST: &str = "0xDIGEST,16 Oct 2026 10:00:00 -0000";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

#[derive(Clone)]
struct Canned {
    status: u16,
    body: Option<Value>,
    delay: Duration,
}

#[derive(Default)]
struct StubState {
    routes: Mutex<HashMap<(String, String), Vec<Canned>>>,
    requests: Mutex<Vec<Recorded>>,
}

pub struct StubServer {
    pub addr: SocketAddr,
    state: Arc<StubState>,
}

pub fn items_path(list: &str) -> String {
    format!("/Web/Lists/GetByTitle('{}')/items", list)
}

pub fn item_path(list: &str, id: i64) -> String {
    format!("{}({})", items_path(list), id)
}

fn decode_path(path: &str) -> String {
    path.replace("%27", "'").replace("%20", " ")
}

async fn handle(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = decode_path(uri.path());
    let path = path.strip_prefix("/_api").unwrap_or(&path).to_string();
    let recorded = Recorded {
        method: method.to_string(),
        path: path.clone(),
        query,
        headers: headers
            .iter()
            .map(|(k, v)| (k.as_str().to_lowercase(), v.to_str().unwrap_or("").to_string()))
            .collect(),
        body: String::from_utf8_lossy(&body).to_string(),
    };
    state.requests.lock().unwrap().push(recorded);

    let canned = {
        let mut routes = state.routes.lock().unwrap();
        match routes.get_mut(&(method.to_string(), path.clone())) {
            // Queued responses are consumed in order; the last one repeats.
            Some(queue) if queue.len() > 1 => Some(queue.remove(0)),
            Some(queue) => queue.first().cloned(),
            None => None,
        }
    };

    let Some(canned) = canned else {
        return (StatusCode::NOT_FOUND, format!("no stub for {} {}", method, path)).into_response();
    };
    if !canned.delay.is_zero() {
        tokio::time::sleep(canned.delay).await;
    }
    let status = StatusCode::from_u16(canned.status).unwrap();
    match canned.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    }
}

impl StubServer {
    pub async fn start() -> Self {
        let state = Arc::new(StubState::default());
        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service()).await;
        });
        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/_api/", self.addr)
    }

    fn push(&self, method: &str, path: &str, canned: Canned, replace: bool) {
        let mut routes = self.state.routes.lock().unwrap();
        let queue = routes
            .entry((method.to_string(), path.to_string()))
            .or_default();
        if replace {
            queue.clear();
        }
        queue.push(canned);
    }

    /// Answer `method path` with `status` and `body` from now on.
    pub fn route(&self, method: &str, path: &str, status: u16, body: Value) {
        let canned = Canned {
            status,
            body: Some(body),
            delay: Duration::ZERO,
        };
        self.push(method, path, canned, true);
    }

    /// Answer with an empty body.
    pub fn route_empty(&self, method: &str, path: &str, status: u16) {
        let canned = Canned {
            status,
            body: None,
            delay: Duration::ZERO,
        };
        self.push(method, path, canned, true);
    }

    pub fn route_delayed(&self, method: &str, path: &str, body: Value, delay: Duration) {
        let canned = Canned {
            status: 200,
            body: Some(body),
            delay,
        };
        self.push(method, path, canned, true);
    }

    /// Queue another response behind the ones already routed.
    pub fn route_then(&self, method: &str, path: &str, status: u16, body: Value) {
        let canned = Canned {
            status,
            body: Some(body),
            delay: Duration::ZERO,
        };
        self.push(method, path, canned, false);
    }

    /// Queue a one-off response ahead of the current one.
    pub fn route_once_then(&self, method: &str, path: &str, status: u16, body: Value) {
        let mut routes = self.state.routes.lock().unwrap();
        let queue = routes
            .entry((method.to_string(), path.to_string()))
            .or_default();
        queue.insert(
            0,
            Canned {
                status,
                body: Some(body),
                delay: Duration::ZERO,
            },
        );
    }

    pub fn route_context_info(&self) {
        self.route(
            "POST",
            "/contextinfo",
            200,
            json!({"d": {"GetContextWebInformation": {
                "FormDigestValue": DIGEST,
                "FormDigestTimeoutSeconds": 1800
            }}}),
        );
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn last(&self, method: &str, path: &str) -> Option<Recorded> {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.method == method && r.path == path)
    }
}

/// Configuration pointing at `base` with extra top-level JSON members.
pub fn config(base: &str, extra: Value) -> AppConfig {
    let mut value = json!({
        "apiEndpoint": base,
        "requestTimeoutSeconds": 5,
    });
    if let (Some(target), Value::Object(extra)) = (value.as_object_mut(), extra) {
        target.extend(extra);
    }
    AppConfig::from_json_str(&value.to_string()).expect("config")
}

/// Routes for a complete preload: digest, users, parents and requirements.
pub fn route_preload_backend(server: &StubServer) {
    server.route_context_info();
    server.route(
        "GET",
        "/Web/currentuser",
        200,
        json!({"Id": 7, "Title": "Ada Lovelace", "LoginName": "i:0#.f|membership|ada@example.com"}),
    );
    server.route(
        "GET",
        "/Web/siteusers",
        200,
        json!({"value": [
            {"Id": 7, "Title": "Ada Lovelace"},
            {"Id": 9, "Title": "Grace Hopper"}
        ]}),
    );
    server.route(
        "GET",
        &items_path("Parents"),
        200,
        json!({"value": [{"Id": 1, "Title": "Alpha"}, {"Id": 2, "Title": "Beta"}]}),
    );
    server.route(
        "GET",
        &items_path("Requirements"),
        200,
        json!({"value": [
            {"Id": 10, "Title": "R10", "ParentId": 1},
            {"Id": 11, "Title": "R11", "ParentId": 1},
            {"Id": 12, "Title": "R12", "ParentId": 99}
        ]}),
    );
}

/// List and relationship configuration matching `route_preload_backend`.
pub fn preload_lists() -> Value {
    json!({
        "lists": {
            "parents": {"name": "Parents", "orderBy": "Title"},
            "requirements": {"name": "Requirements"}
        },
        "relationships": {
            "parentList": "parents",
            "requirementList": "requirements",
            "linkField": "ParentId"
        }
    })
}
