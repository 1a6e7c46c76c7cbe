use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

// Standard JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const UNAUTHORIZED: i32 = -32000;

// Methods
pub const CLIPBOARD_READ: &str = "clipboard.read";
pub const CLIPBOARD_WRITE: &str = "clipboard.write";
pub const HISTORY_GET: &str = "history.get";
pub const HISTORY_TOGGLE_PIN: &str = "history.togglePin";
pub const HISTORY_REMOVE: &str = "history.remove";
pub const HISTORY_CLEAR: &str = "history.clear";
pub const HISTORY_SET_MAX_SIZE: &str = "history.setMaxSize";
pub const HISTORY_COPY: &str = "history.copy";
pub const HISTORY_ADD_TAG: &str = "history.addTag";
pub const HISTORY_REMOVE_TAG: &str = "history.removeTag";
pub const MONITOR_START: &str = "monitor.start";
pub const MONITOR_STOP: &str = "monitor.stop";
pub const MONITOR_STATUS: &str = "monitor.status";
pub const HOST_EVENT: &str = "host.event";

// SSE event names
pub const EVENT_CLIPBOARD_CHANGED: &str = "clipboard-changed";
pub const EVENT_HISTORY_UPDATED: &str = "history-updated";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Parameter shapes

#[derive(Debug, Deserialize)]
pub struct IdParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct TagParams {
    pub id: String,
    pub tag: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteParams {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxSizeParams {
    pub max_size: usize,
}

pub fn create_success_response(id: Option<Value>, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        result: Some(result),
        error: None,
        id,
    }
}

pub fn create_error_response(id: Option<Value>, code: i32, message: String) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        result: None,
        error: Some(JsonRpcError {
            code,
            message,
            data: None,
        }),
        id,
    }
}
