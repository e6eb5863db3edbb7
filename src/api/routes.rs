//! Request routing.
//!
//! Routing is a plain function of method, path, query and body so it can be
//! exercised without a socket. The server module only moves bytes.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hyper::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::metrics::PrometheusExporter;
use crate::cache::{Cache, EnqueueOutcome, MAX_KEY_LEN, MAX_VALUE_LEN};
use crate::error::{Error, Result};

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Body of `POST /api/v1/cache`
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: String,
    /// Seconds; absent or zero uses the cache default
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Body of the node management endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct NodeRequest {
    pub node: String,
}

#[derive(Serialize)]
struct StatusMessage<'a> {
    status: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct Message<'a> {
    message: &'a str,
}

#[derive(Serialize)]
struct KeyValue<'a> {
    status: &'a str,
    key: &'a str,
    value: Cow<'a, str>,
}

#[derive(Serialize)]
struct NodeList {
    nodes: Vec<String>,
}

/// A fully formed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Bytes,
}

impl ApiResponse {
    fn text(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: TEXT,
            body: body.into(),
        }
    }

    fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: JSON,
                body: Bytes::from(body),
            },
            Err(e) => Self::text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to encode response: {}", e),
            ),
        }
    }

    fn status_message(status: StatusCode, outcome: &str, message: &str) -> Self {
        Self::json(
            status,
            &StatusMessage {
                status: outcome,
                message,
            },
        )
    }

    fn from_error(error: &Error) -> Self {
        if error.is_client_error() {
            debug!("Rejected request: {}", error);
            let message = match error {
                Error::InvalidRequest(message) => message.as_str(),
                _ => "Invalid request.",
            };
            Self::status_message(StatusCode::BAD_REQUEST, "ERROR", message)
        } else {
            warn!("Request failed: {}", error);
            Self::status_message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERROR",
                "Internal server error.",
            )
        }
    }
}

/// Shared state behind every request
#[derive(Debug)]
pub struct ApiState {
    cache: Arc<Cache>,
    exporter: PrometheusExporter,
}

impl ApiState {
    pub fn new(cache: Arc<Cache>) -> Result<Self> {
        Ok(Self {
            cache,
            exporter: PrometheusExporter::new()?,
        })
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }
}

/// Route one request
pub fn handle(
    state: &ApiState,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
) -> ApiResponse {
    let result = match (method, path) {
        (&Method::POST, "/api/v1/cache") => set_key(state, body),
        (&Method::GET, "/api/v1/cache") => get_key(state, query),
        (&Method::GET, "/api/v1/nodes") => Ok(list_nodes(state)),
        (&Method::POST, "/api/v1/nodes") => add_node(state, body),
        (&Method::DELETE, "/api/v1/nodes") => remove_node(state, body),
        (&Method::GET, "/healthz") | (&Method::GET, "/livez") => {
            Ok(ApiResponse::text(StatusCode::OK, "ok"))
        }
        (&Method::GET, "/metrics") => render_metrics(state),
        (_, "/api/v1/cache" | "/api/v1/nodes" | "/healthz" | "/livez" | "/metrics") => {
            Ok(ApiResponse::status_message(
                StatusCode::METHOD_NOT_ALLOWED,
                "ERROR",
                "Method not allowed.",
            ))
        }
        _ => Ok(ApiResponse::status_message(
            StatusCode::NOT_FOUND,
            "ERROR",
            "Route not found.",
        )),
    };
    result.unwrap_or_else(|e| ApiResponse::from_error(&e))
}

fn decode<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| Error::InvalidRequest(format!("Invalid request body: {}", e)))
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidRequest("Key is required.".into()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(Error::InvalidRequest(format!(
            "Key length exceeds {} characters.",
            MAX_KEY_LEN
        )));
    }
    Ok(())
}

fn set_key(state: &ApiState, body: &[u8]) -> Result<ApiResponse> {
    let request: SetRequest = decode(body)?;
    check_key(&request.key)?;
    if request.value.is_empty() {
        return Err(Error::InvalidRequest("Value is required.".into()));
    }
    if request.value.len() > MAX_VALUE_LEN {
        return Err(Error::InvalidRequest(format!(
            "Value length exceeds {} characters.",
            MAX_VALUE_LEN
        )));
    }

    let ttl = request.ttl.map(Duration::from_secs);
    match state.cache.set(request.key, request.value, ttl) {
        EnqueueOutcome::Queued | EnqueueOutcome::QueueFull => Ok(ApiResponse::status_message(
            StatusCode::OK,
            "OK",
            "Key inserted/updated successfully.",
        )),
        EnqueueOutcome::Closed => Ok(ApiResponse::status_message(
            StatusCode::SERVICE_UNAVAILABLE,
            "ERROR",
            "Cache is shutting down.",
        )),
    }
}

fn get_key(state: &ApiState, query: Option<&str>) -> Result<ApiResponse> {
    let key = query_param(query, "key")?.unwrap_or_default();
    if key.is_empty() {
        // Same body the cache returns for an absent key
        return Ok(ApiResponse::status_message(
            StatusCode::BAD_REQUEST,
            "ERROR",
            "Key not found.",
        ));
    }
    check_key(&key)?;

    match state.cache.get(&key) {
        Some(value) => Ok(ApiResponse::json(
            StatusCode::OK,
            &KeyValue {
                status: "OK",
                key: &key,
                value: String::from_utf8_lossy(&value),
            },
        )),
        None => Ok(ApiResponse::status_message(
            StatusCode::NOT_FOUND,
            "ERROR",
            "Key not found.",
        )),
    }
}

fn list_nodes(state: &ApiState) -> ApiResponse {
    ApiResponse::json(
        StatusCode::OK,
        &NodeList {
            nodes: state.cache.nodes(),
        },
    )
}

fn node_from(body: &[u8]) -> Result<String> {
    let request: NodeRequest = decode(body)?;
    if request.node.is_empty() {
        return Err(Error::InvalidRequest("Node is required.".into()));
    }
    Ok(request.node)
}

fn add_node(state: &ApiState, body: &[u8]) -> Result<ApiResponse> {
    let node = node_from(body)?;
    state.cache.add_node(&node);
    Ok(ApiResponse::json(
        StatusCode::OK,
        &Message {
            message: "Node added successfully",
        },
    ))
}

fn remove_node(state: &ApiState, body: &[u8]) -> Result<ApiResponse> {
    let node = node_from(body)?;
    state.cache.remove_node(&node);
    Ok(ApiResponse::json(
        StatusCode::OK,
        &Message {
            message: "Node removed successfully",
        },
    ))
}

fn render_metrics(state: &ApiState) -> Result<ApiResponse> {
    let text = state.exporter.render(&state.cache.metrics())?;
    Ok(ApiResponse {
        status: StatusCode::OK,
        content_type: state.exporter.content_type(),
        body: Bytes::from(text),
    })
}

/// First value of `name` in a query string, percent-decoded.
///
/// `+` is read as a space, as in form encoding.
fn query_param(query: Option<&str>, name: &str) -> Result<Option<String>> {
    let Some(query) = query else {
        return Ok(None);
    };

    for pair in query.split('&') {
        let (field, value) = pair.split_once('=').unwrap_or((pair, ""));
        if field != name {
            continue;
        }
        let value = value.replace('+', " ");
        let decoded = urlencoding::decode(&value)
            .map_err(|e| Error::InvalidRequest(format!("Invalid query string: {}", e)))?;
        return Ok(Some(decoded.into_owned()));
    }
    Ok(None)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use serde_json::Value;

    fn state() -> ApiState {
        let cache = Cache::start(CacheConfig::default()).unwrap();
        cache.add_node("node-1");
        ApiState::new(cache).unwrap()
    }

    fn json(response: &ApiResponse) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let state = state();

        let response = handle(
            &state,
            &Method::POST,
            "/api/v1/cache",
            None,
            br#"{"key":"user 1","value":"alice","ttl":60}"#,
        );
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type, JSON);
        assert_eq!(
            json(&response),
            serde_json::json!({"status": "OK", "message": "Key inserted/updated successfully."})
        );

        let response = handle(&state, &Method::GET, "/api/v1/cache", Some("key=user%201"), b"");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            json(&response),
            serde_json::json!({"status": "OK", "key": "user 1", "value": "alice"})
        );

        let response = handle(&state, &Method::GET, "/api/v1/cache", Some("key=user+1"), b"");
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_missing_key_is_404() {
        let state = state();
        let response = handle(&state, &Method::GET, "/api/v1/cache", Some("key=nope"), b"");
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(
            json(&response),
            serde_json::json!({"status": "ERROR", "message": "Key not found."})
        );
    }

    #[tokio::test]
    async fn test_get_without_key_is_400() {
        let state = state();
        for query in [None, Some(""), Some("key="), Some("other=1")] {
            let response = handle(&state, &Method::GET, "/api/v1/cache", query, b"");
            assert_eq!(response.status, StatusCode::BAD_REQUEST, "query {:?}", query);
        }
    }

    #[tokio::test]
    async fn test_oversized_key_and_value_rejected() {
        let state = state();
        let long = "x".repeat(MAX_KEY_LEN + 1);

        let query = format!("key={}", long);
        let response = handle(&state, &Method::GET, "/api/v1/cache", Some(&query), b"");
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&response)["message"], "Key length exceeds 256 characters.");

        let body = serde_json::json!({"key": long, "value": "v"}).to_string();
        let response = handle(&state, &Method::POST, "/api/v1/cache", None, body.as_bytes());
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let body = serde_json::json!({"key": "k", "value": long}).to_string();
        let response = handle(&state, &Method::POST, "/api/v1/cache", None, body.as_bytes());
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(state.cache().get("k").is_none());
    }

    #[tokio::test]
    async fn test_bad_json_is_400() {
        let state = state();
        let bodies: [&[u8]; 4] = [b"not json", br#"{"key":"k"}"#, br#"{"value":"v"}"#, b""];
        for body in bodies {
            let response = handle(&state, &Method::POST, "/api/v1/cache", None, body);
            assert_eq!(response.status, StatusCode::BAD_REQUEST);
            assert_eq!(json(&response)["status"], "ERROR");
        }
    }

    #[tokio::test]
    async fn test_node_management() {
        let state = state();

        let response = handle(&state, &Method::POST, "/api/v1/nodes", None, br#"{"node":"node-2"}"#);
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(json(&response)["message"], "Node added successfully");

        let response = handle(&state, &Method::GET, "/api/v1/nodes", None, b"");
        assert_eq!(json(&response)["nodes"], serde_json::json!(["node-1", "node-2"]));

        let response =
            handle(&state, &Method::DELETE, "/api/v1/nodes", None, br#"{"node":"node-1"}"#);
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(json(&response)["message"], "Node removed successfully");
        assert_eq!(state.cache().nodes(), vec!["node-2".to_string()]);

        let response = handle(&state, &Method::POST, "/api/v1/nodes", None, br#"{"node":""}"#);
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_metrics_and_unknown_route() {
        let state = state();

        let response = handle(&state, &Method::GET, "/healthz", None, b"");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"ok"));

        handle(&state, &Method::GET, "/api/v1/cache", Some("key=missing"), b"");
        let response = handle(&state, &Method::GET, "/metrics", None, b"");
        assert_eq!(response.status, StatusCode::OK);
        let text = String::from_utf8(response.body.to_vec()).unwrap();
        assert!(text.contains("ringcache_shard_misses_total 1"));
        assert!(text.contains("ringcache_nodes 1"));

        let response = handle(&state, &Method::GET, "/nope", None, b"");
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let response = handle(&state, &Method::PUT, "/api/v1/cache", None, b"");
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        let response = handle(&state, &Method::DELETE, "/metrics", None, b"");
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_set_with_huge_ttl_is_accepted() {
        let state = state();

        let response = handle(
            &state,
            &Method::POST,
            "/api/v1/cache",
            None,
            br#"{"key":"k","value":"v","ttl":18446744073709551615}"#,
        );
        assert_eq!(response.status, StatusCode::OK);

        let response = handle(&state, &Method::GET, "/api/v1/cache", Some("key=k"), b"");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            json(&response),
            serde_json::json!({"status": "OK", "key": "k", "value": "v"})
        );
    }

    #[test]
    fn test_query_param() {
        assert_eq!(query_param(Some("a=1&key=x%2Fy"), "key").unwrap().as_deref(), Some("x/y"));
        assert_eq!(query_param(Some("key"), "key").unwrap().as_deref(), Some(""));
        assert_eq!(query_param(None, "key").unwrap(), None);
        assert!(query_param(Some("key=%FF"), "key").is_err());
    }
}
