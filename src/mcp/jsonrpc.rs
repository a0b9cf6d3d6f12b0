//! JSON-RPC 2.0 envelopes and their encoding.
//!
//! Payloads (`params`, `result`, `error.data`) stay as [`serde_json::Value`]
//! here; the provider façade decodes them into MCP schema types per method.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::mcp::error::McpError;

pub const JSONRPC_VERSION: &str = "2.0";

pub type RequestId = i64;

/// Per-provider id source. Ids start at 1 and are never reused.
#[derive(Debug)]
pub struct RequestIdGenerator {
    next: AtomicI64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    pub fn next_id(&self) -> RequestId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn encode(&self) -> Result<String, McpError> {
        encode(self)
    }

    /// Named string parameter, if present.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params
            .as_ref()
            .and_then(|params| params.get(name))
            .and_then(Value::as_str)
    }
}

impl Serialize for JsonRpcRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Envelope {
            id: Some(self.id),
            method: Some(&self.method),
            params: self.params.as_ref(),
            ..Envelope::new()
        }
        .serialize(serializer)
    }
}

/// A request without an id. No reply is expected.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcNotification {
    pub method: String,
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    pub fn encode(&self) -> Result<String, McpError> {
        encode(self)
    }
}

impl Serialize for JsonRpcNotification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Envelope {
            method: Some(&self.method),
            params: self.params.as_ref(),
            ..Envelope::new()
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcResponse {
    Success {
        id: RequestId,
        result: Value,
    },
    Failure {
        id: RequestId,
        error: JsonRpcErrorObject,
    },
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        JsonRpcResponse::Success { id, result }
    }

    pub fn failure(id: RequestId, code: i64, message: impl Into<String>) -> Self {
        JsonRpcResponse::Failure {
            id,
            error: JsonRpcErrorObject {
                code,
                message: message.into(),
                data: None,
            },
        }
    }

    /// Maps an [`McpError::Protocol`] onto an error envelope; other errors
    /// become internal errors (-32603).
    pub fn from_error(id: RequestId, err: McpError) -> Self {
        match err {
            McpError::Protocol {
                code,
                message,
                data,
            } => JsonRpcResponse::Failure {
                id,
                error: JsonRpcErrorObject {
                    code,
                    message,
                    data,
                },
            },
            other => JsonRpcResponse::failure(id, INTERNAL_ERROR, other.to_string()),
        }
    }

    pub fn id(&self) -> RequestId {
        match self {
            JsonRpcResponse::Success { id, .. } | JsonRpcResponse::Failure { id, .. } => *id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JsonRpcResponse::Success { .. })
    }

    pub fn into_result(self) -> Result<Value, McpError> {
        match self {
            JsonRpcResponse::Success { result, .. } => Ok(result),
            JsonRpcResponse::Failure { error, .. } => Err(McpError::Protocol {
                code: error.code,
                message: error.message,
                data: error.data,
            }),
        }
    }

    pub fn encode(&self) -> Result<String, McpError> {
        encode(self)
    }
}

impl Serialize for JsonRpcResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let envelope = match self {
            JsonRpcResponse::Success { id, result } => Envelope {
                id: Some(*id),
                result: Some(result),
                ..Envelope::new()
            },
            JsonRpcResponse::Failure { id, error } => Envelope {
                id: Some(*id),
                error: Some(error),
                ..Envelope::new()
            },
        };
        envelope.serialize(serializer)
    }
}

/// Error reply for input whose id could not be determined. JSON-RPC answers
/// these with `"id": null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcAnonymousError {
    jsonrpc: &'static str,
    id: (),
    pub error: JsonRpcErrorObject,
}

impl JsonRpcAnonymousError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: (),
            error: JsonRpcErrorObject {
                code,
                message: message.into(),
                data: None,
            },
        }
    }

    pub fn encode(&self) -> Result<String, McpError> {
        encode(self)
    }
}

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const RESOURCE_NOT_FOUND: i64 = -32002;

/// Outbound wire form. Absent members are left out rather than sent as null.
#[derive(Serialize)]
struct Envelope<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a JsonRpcErrorObject>,
}

impl Envelope<'_> {
    fn new() -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        }
    }
}

/// Inbound wire form. Unknown members are ignored.
#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default, deserialize_with = "present")]
    params: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    error: Option<Value>,
}

/// Keeps an explicit `null` member distinct from an absent one.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

fn encode<T: Serialize>(message: &T) -> Result<String, McpError> {
    Ok(serde_json::to_string(message)?)
}

/// Any inbound JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    pub fn decode(bytes: &[u8]) -> Result<Self, McpError> {
        Self::classify(serde_json::from_slice(bytes)?)
    }

    pub fn decode_str(text: &str) -> Result<Self, McpError> {
        Self::decode(text.as_bytes())
    }

    /// Classifies a parsed JSON value.
    ///
    /// An absent `id` marks a notification; an explicit `"id": null` is
    /// rejected. An object with neither `method`, `result`, nor `error` is an
    /// invalid protocol response.
    pub fn from_value(value: Value) -> Result<Self, McpError> {
        Self::classify(serde_json::from_value(value)?)
    }

    fn classify(raw: RawMessage) -> Result<Self, McpError> {
        if let Some(version) = raw.jsonrpc.as_deref() {
            if version != JSONRPC_VERSION {
                return Err(McpError::Parse(format!(
                    "Unsupported jsonrpc version: {version}"
                )));
            }
        }

        let id = raw.id.map(request_id).transpose()?;

        if let Some(method) = raw.method {
            let params = raw.params;
            return Ok(match id {
                Some(id) => JsonRpcMessage::Request(JsonRpcRequest { id, method, params }),
                None => JsonRpcMessage::Notification(JsonRpcNotification { method, params }),
            });
        }

        let Some(id) = id else {
            let detail = if raw.result.is_none() && raw.error.is_none() {
                "message has no method, result, or error"
            } else {
                "response is missing its id"
            };
            return Err(McpError::InvalidResponse(detail.to_string()));
        };

        match (raw.result, raw.error) {
            (Some(_), Some(_)) => Err(McpError::InvalidResponse(format!(
                "response {id} carries both result and error"
            ))),
            (Some(result), None) => Ok(JsonRpcMessage::Response(JsonRpcResponse::Success {
                id,
                result,
            })),
            (None, Some(error)) => {
                let error = serde_json::from_value(error).map_err(|err| {
                    McpError::InvalidResponse(format!("malformed error in response {id}: {err}"))
                })?;
                Ok(JsonRpcMessage::Response(JsonRpcResponse::Failure { id, error }))
            }
            (None, None) => Err(McpError::InvalidResponse(format!(
                "response {id} has neither result nor error"
            ))),
        }
    }

    pub fn into_response(self) -> Option<JsonRpcResponse> {
        match self {
            JsonRpcMessage::Response(response) => Some(response),
            _ => None,
        }
    }
}

fn request_id(id: Value) -> Result<RequestId, McpError> {
    match id {
        Value::Null => Err(McpError::InvalidResponse(
            "JSON-RPC id must not be null".to_string(),
        )),
        Value::Number(number) => number.as_i64().ok_or_else(|| {
            McpError::InvalidResponse(format!("Unsupported JSON-RPC id: {number}"))
        }),
        other => Err(McpError::InvalidResponse(format!(
            "Unsupported JSON-RPC id: {other}"
        ))),
    }
}

/// True when `value` is an object carrying `result` or `error`, i.e. a
/// JSON-RPC reply rather than a status placeholder.
pub fn looks_like_response(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.contains_key("result") || object.contains_key("error"))
}
