use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::auth::AuthManager;
use super::protocol::*;
use super::ControlConfig;
use crate::clipboard::detector::ClipboardEvent;
use crate::clipboard::scheduler::HostEvent;
use crate::service::ClipboardService;
use crate::{ClipdeckError, Result};

#[derive(Clone)]
pub struct ControlState {
    pub service: Arc<ClipboardService>,
    pub auth_manager: Arc<AuthManager>,
}

#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    token: Option<String>,
}

pub struct ControlServer {
    state: ControlState,
    addr: String,
}

impl ControlServer {
    pub fn new(service: Arc<ClipboardService>, auth_manager: AuthManager, config: &ControlConfig) -> Self {
        Self {
            state: ControlState {
                service,
                auth_manager: Arc::new(auth_manager),
            },
            addr: config.bind_addr(),
        }
    }

    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr).await.map_err(|e| {
            ClipdeckError::Server(format!("Failed to bind to {}: {e}", self.addr))
        })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("Control server listening on http://{}", addr);
        }

        axum::serve(listener, router(self.state))
            .await
            .map_err(|e| ClipdeckError::Server(e.to_string()))
    }
}

pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/rpc", post(jsonrpc_handler))
        .route("/events", get(events_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn provided_token<'a>(headers: &'a HeaderMap, query: &'a AuthQuery) -> Option<&'a str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .or(query.token.as_deref())
}

async fn health_handler(State(state): State<ControlState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "platform": std::env::consts::OS,
        "monitoring": state.service.is_monitoring(),
        "auth_required": state.auth_manager.is_required(),
    }))
}

async fn jsonrpc_handler(
    State(state): State<ControlState>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    Json(request): Json<Value>,
) -> Response {
    if !state.auth_manager.validate_token(provided_token(&headers, &query)) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(create_error_response(
                None,
                UNAUTHORIZED,
                "Authentication required".to_string(),
            )),
        )
            .into_response();
    }

    if let Value::Array(requests) = request {
        let mut responses = Vec::with_capacity(requests.len());
        for raw in requests {
            responses.push(handle_raw_request(&state, raw).await);
        }
        return Json(responses).into_response();
    }

    Json(handle_raw_request(&state, request).await).into_response()
}

async fn handle_raw_request(state: &ControlState, raw: Value) -> JsonRpcResponse {
    match serde_json::from_value::<JsonRpcRequest>(raw) {
        Ok(request) if request.jsonrpc == JSONRPC_VERSION => dispatch(state, request).await,
        Ok(request) => create_error_response(
            request.id,
            INVALID_REQUEST,
            format!("Unsupported jsonrpc version: {}", request.jsonrpc),
        ),
        Err(_) => create_error_response(None, PARSE_ERROR, "Invalid JSON-RPC request".to_string()),
    }
}

async fn dispatch(state: &ControlState, request: JsonRpcRequest) -> JsonRpcResponse {
    let JsonRpcRequest {
        method, params, id, ..
    } = request;
    debug!("Control request: {}", method);
    let service = &state.service;

    match method.as_str() {
        CLIPBOARD_READ => success(id, json!({ "text": service.read_from_clipboard() })),

        CLIPBOARD_WRITE => match parse_params::<WriteParams>(params) {
            Ok(p) => match service.write_to_clipboard(&p.text) {
                Ok(()) => success(id, json!({ "written": true })),
                Err(e) => create_error_response(id, INTERNAL_ERROR, format!("Failed to write clipboard: {e}")),
            },
            Err(e) => invalid_params(id, e),
        },

        HISTORY_GET => success(id, service.get_history().await),

        HISTORY_TOGGLE_PIN => match parse_params::<IdParams>(params) {
            Ok(p) => success(id, json!({ "pinned": service.toggle_pin(&p.id).await })),
            Err(e) => invalid_params(id, e),
        },

        HISTORY_REMOVE => match parse_params::<IdParams>(params) {
            Ok(p) => success(id, json!({ "removed": service.remove_item(&p.id).await })),
            Err(e) => invalid_params(id, e),
        },

        HISTORY_CLEAR => {
            service.clear_history().await;
            success(id, json!({}))
        }

        HISTORY_SET_MAX_SIZE => match parse_params::<MaxSizeParams>(params) {
            Ok(p) => {
                service.set_max_history_size(p.max_size).await;
                let max_size = service.history().read().await.max_history_size();
                success(id, json!({ "maxSize": max_size }))
            }
            Err(e) => invalid_params(id, e),
        },

        HISTORY_COPY => match parse_params::<IdParams>(params) {
            Ok(p) => match service.copy_entry(&p.id).await {
                Ok(copied) => success(id, json!({ "copied": copied })),
                Err(e) => create_error_response(id, INTERNAL_ERROR, format!("Failed to copy entry: {e}")),
            },
            Err(e) => invalid_params(id, e),
        },

        HISTORY_ADD_TAG => match parse_params::<TagParams>(params) {
            Ok(p) => success(id, json!({ "changed": service.add_tag(&p.id, &p.tag).await })),
            Err(e) => invalid_params(id, e),
        },

        HISTORY_REMOVE_TAG => match parse_params::<TagParams>(params) {
            Ok(p) => success(id, json!({ "changed": service.remove_tag(&p.id, &p.tag).await })),
            Err(e) => invalid_params(id, e),
        },

        MONITOR_START => {
            service.start_monitoring();
            success(id, json!({ "monitoring": service.is_monitoring() }))
        }

        MONITOR_STOP => {
            service.stop_monitoring();
            success(id, json!({ "monitoring": service.is_monitoring() }))
        }

        MONITOR_STATUS => {
            let entries = service.history().read().await.len();
            success(
                id,
                json!({ "monitoring": service.is_monitoring(), "entries": entries }),
            )
        }

        HOST_EVENT => match parse_params::<HostEvent>(params) {
            Ok(event) => {
                service.handle_host_event(&event);
                success(id, json!({ "accepted": true }))
            }
            Err(e) => invalid_params(id, e),
        },

        _ => create_error_response(id, METHOD_NOT_FOUND, format!("Method not found: {method}")),
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> std::result::Result<T, String> {
    let params = params.unwrap_or(Value::Null);
    serde_json::from_value(params).map_err(|e| format!("Invalid parameters: {e}"))
}

fn invalid_params(id: Option<Value>, message: String) -> JsonRpcResponse {
    create_error_response(id, INVALID_PARAMS, message)
}

fn success<T: Serialize>(id: Option<Value>, result: T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => create_success_response(id, value),
        Err(e) => create_error_response(id, INTERNAL_ERROR, format!("Serialization failed: {e}")),
    }
}

// Server-sent events for clipboard changes and history edits
async fn events_handler(
    State(state): State<ControlState>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
) -> std::result::Result<impl IntoResponse, StatusCode> {
    if !state.auth_manager.validate_token(provided_token(&headers, &query)) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let mut event_rx = state.service.subscribe();

    let stream = async_stream::stream! {
        loop {
            let event = match event_rx.recv().await {
                Ok(ClipboardEvent::Changed(entry)) => {
                    match Event::default().event(EVENT_CLIPBOARD_CHANGED).json_data(&entry) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("Failed to encode clipboard event: {}", e);
                            continue;
                        }
                    }
                }
                Ok(ClipboardEvent::HistoryUpdated) => {
                    Event::default().event(EVENT_HISTORY_UPDATED).data("{}")
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Event stream lagged by {} event(s)", skipped);
                    Event::default().event(EVENT_HISTORY_UPDATED).data("{}")
                }
                Err(RecvError::Closed) => break,
            };
            yield Ok::<_, Infallible>(event);
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::{ClipboardBackend, MemoryClipboard};
    use crate::config::AppConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const TOKEN_FILE_TOKEN: &str = "test-token";

    async fn state(require_auth: bool) -> (ControlState, Arc<MemoryClipboard>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let clipboard = Arc::new(MemoryClipboard::new());
        let service = Arc::new(ClipboardService::new(clipboard.clone(), &AppConfig::default()));

        let auth_manager = if require_auth {
            let token_path = dir.path().join("auth.token");
            std::fs::write(&token_path, TOKEN_FILE_TOKEN).unwrap();
            AuthManager::new(crate::control::auth::AuthConfig {
                token_path,
                require_auth: true,
            })
            .await
            .unwrap()
        } else {
            AuthManager::disabled()
        };

        let state = ControlState {
            service,
            auth_manager: Arc::new(auth_manager),
        };
        (state, clipboard, dir)
    }

    async fn rpc(state: &ControlState, body: Value) -> Value {
        let response = router(state.clone())
            .oneshot(
                Request::post("/rpc")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn call(method: &str, params: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params })
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let (state, _clipboard, _dir) = state(true).await;
        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["auth_required"], true);
    }

    #[tokio::test]
    async fn test_rpc_requires_token() {
        let (state, _clipboard, _dir) = state(true).await;
        let request = || {
            Request::post("/rpc")
                .header(header::CONTENT_TYPE, "application/json")
        };
        let body = call(MONITOR_STATUS, Value::Null).to_string();

        let denied = router(state.clone())
            .oneshot(request().body(Body::from(body.clone())).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = router(state.clone())
            .oneshot(
                request()
                    .header(header::AUTHORIZATION, format!("Bearer {TOKEN_FILE_TOKEN}"))
                    .body(Body::from(body.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        let via_query = router(state)
            .oneshot(
                Request::post(format!("/rpc?token={TOKEN_FILE_TOKEN}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(via_query.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_events_require_token() {
        let (state, _clipboard, _dir) = state(true).await;
        let response = router(state)
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_history_methods() {
        let (state, clipboard, _dir) = state(false).await;
        clipboard.write_text("https://example.com").unwrap();
        state.service.check_now().await;
        clipboard.write_text("second").unwrap();
        state.service.check_now().await;

        let history = rpc(&state, call(HISTORY_GET, Value::Null)).await;
        let entries = history["result"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["type"], "url");
        let url_id = entries[1]["id"].as_str().unwrap().to_string();

        let pinned = rpc(&state, call(HISTORY_TOGGLE_PIN, json!({ "id": url_id }))).await;
        assert_eq!(pinned["result"]["pinned"], true);

        let tagged = rpc(
            &state,
            call(HISTORY_ADD_TAG, json!({ "id": url_id, "tag": "docs" })),
        )
        .await;
        assert_eq!(tagged["result"]["changed"], true);

        rpc(&state, call(HISTORY_CLEAR, Value::Null)).await;
        let history = rpc(&state, call(HISTORY_GET, Value::Null)).await;
        let entries = history["result"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["isPinned"], true);
        assert_eq!(entries[0]["tags"], json!(["docs"]));

        let copied = rpc(&state, call(HISTORY_COPY, json!({ "id": url_id }))).await;
        assert_eq!(copied["result"]["copied"], true);
        assert_eq!(clipboard.read_text().unwrap(), "https://example.com");

        let resized = rpc(&state, call(HISTORY_SET_MAX_SIZE, json!({ "maxSize": 0 }))).await;
        assert_eq!(resized["result"]["maxSize"], 1);
    }

    #[tokio::test]
    async fn test_clipboard_write_is_not_recorded() {
        let (state, clipboard, _dir) = state(false).await;
        let written = rpc(&state, call(CLIPBOARD_WRITE, json!({ "text": "from rpc" }))).await;
        assert_eq!(written["result"]["written"], true);
        assert_eq!(clipboard.read_text().unwrap(), "from rpc");

        let read = rpc(&state, call(CLIPBOARD_READ, Value::Null)).await;
        assert_eq!(read["result"]["text"], "from rpc");

        state.service.check_now().await;
        assert!(state.service.get_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_monitor_and_host_events() {
        let (state, _clipboard, _dir) = state(false).await;
        let started = rpc(&state, call(MONITOR_START, Value::Null)).await;
        assert_eq!(started["result"]["monitoring"], true);

        let accepted = rpc(
            &state,
            call(HOST_EVENT, json!({ "type": "key", "key": "c", "control": true })),
        )
        .await;
        assert_eq!(accepted["result"]["accepted"], true);

        let stopped = rpc(&state, call(MONITOR_STOP, Value::Null)).await;
        assert_eq!(stopped["result"]["monitoring"], false);
    }

    #[tokio::test]
    async fn test_errors() {
        let (state, _clipboard, _dir) = state(false).await;

        let unknown = rpc(&state, call("history.explode", Value::Null)).await;
        assert_eq!(unknown["error"]["code"], METHOD_NOT_FOUND);

        let missing = rpc(&state, call(HISTORY_REMOVE, Value::Null)).await;
        assert_eq!(missing["error"]["code"], INVALID_PARAMS);

        let garbage = rpc(&state, json!({ "nope": true })).await;
        assert_eq!(garbage["error"]["code"], PARSE_ERROR);

        let old = rpc(&state, json!({ "jsonrpc": "1.0", "id": 3, "method": HISTORY_GET })).await;
        assert_eq!(old["error"]["code"], INVALID_REQUEST);
        assert_eq!(old["id"], 3);
    }

    #[tokio::test]
    async fn test_batch_request() {
        let (state, _clipboard, _dir) = state(false).await;
        let responses = rpc(
            &state,
            json!([call(MONITOR_STATUS, Value::Null), call(HISTORY_GET, Value::Null)]),
        )
        .await;
        let responses = responses.as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["entries"], 0);
    }
}
