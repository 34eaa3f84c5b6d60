//! JSON-RPC 2.0 envelopes and the rendering of progress frames.
//!
//! Non-final frames become `notifications/progress` messages carrying the
//! request id as `relatedId`. The terminal frame becomes the `{id, result}`
//! response with an MCP tool-result body.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::BankError;
use crate::tools::progress::{ProgressFrame, ProgressStatus};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2025-03-26";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// The request named a session that is unknown, closed, or expired.
pub const NO_VALID_SESSION: i64 = -32001;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    /// Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Parse one message. The error is a ready-to-send JSON-RPC error.
    pub fn parse(raw: &str) -> Result<Self, Value> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| error_response(Value::Null, PARSE_ERROR, &format!("parse error: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, Value> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: Self = serde_json::from_value(value)
            .map_err(|e| error_response(id.clone(), INVALID_REQUEST, &format!("invalid request: {e}")))?;
        if request.jsonrpc.as_deref().is_some_and(|v| v != JSONRPC_VERSION) {
            return Err(error_response(id, INVALID_REQUEST, "unsupported jsonrpc version"));
        }
        Ok(request)
    }
}

pub fn response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result })
}

pub fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "error": { "code": code, "message": message } })
}

/// Protocol-level rendering of an error that stops a request before any
/// tool runs.
pub fn bank_error_response(id: Value, err: &BankError) -> Value {
    let code = match err {
        BankError::NoValidSession => NO_VALID_SESSION,
        BankError::Validation(_) => INVALID_PARAMS,
        BankError::ToolNotFound(_) => METHOD_NOT_FOUND,
        _ => INTERNAL_ERROR,
    };
    let mut body = error_response(id, code, &err.to_string());
    body["error"]["data"] = err.to_payload();
    body
}

pub fn progress_notification(frame: &ProgressFrame) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": "notifications/progress",
        "params": {
            "relatedId": frame.related_id,
            "payload": frame.payload(),
        }
    })
}

/// `{id, result}` for a terminal frame. Tool errors stay inside the result
/// with `isError = true`.
pub fn terminal_response(frame: &ProgressFrame) -> Value {
    let payload = frame.payload();
    let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string());
    response(
        frame.related_id.clone(),
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": payload,
            "isError": frame.status == ProgressStatus::Error,
        }),
    )
}

/// The wire message for any frame.
pub fn render_frame(frame: &ProgressFrame) -> Value {
    if frame.is_final() {
        terminal_response(frame)
    } else {
        progress_notification(frame)
    }
}

pub fn initialize_result(instructions: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "instructions": instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(status: ProgressStatus, data: Value) -> ProgressFrame {
        ProgressFrame {
            related_id: json!(4),
            status,
            data,
        }
    }

    #[test]
    fn progress_frames_are_notifications() {
        let msg = render_frame(&frame(ProgressStatus::InProgress, json!({"currentIteration": 2})));
        assert_eq!(msg["method"], "notifications/progress");
        assert_eq!(msg["params"]["relatedId"], 4);
        assert_eq!(msg["params"]["payload"]["isFinal"], false);
        assert!(msg.get("id").is_none());
    }

    #[test]
    fn error_frame_is_result_with_is_error() {
        let err = BankError::not_found("component", "x");
        let msg = render_frame(&frame(ProgressStatus::Error, err.to_payload()));
        assert_eq!(msg["id"], 4);
        assert_eq!(msg["result"]["isError"], true);
        assert_eq!(msg["result"]["structuredContent"]["kind"], "not_found");
        assert_eq!(msg["result"]["structuredContent"]["isFinal"], true);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = JsonRpcRequest::parse("{not json").unwrap_err();
        assert_eq!(err["error"]["code"], PARSE_ERROR);
        let err = JsonRpcRequest::parse(r#"{"id": 1}"#).unwrap_err();
        assert_eq!(err["error"]["code"], INVALID_REQUEST);
        assert_eq!(err["id"], 1);
    }

    #[test]
    fn session_errors_get_their_own_code() {
        let msg = bank_error_response(json!(1), &BankError::NoValidSession);
        assert_eq!(msg["error"]["code"], NO_VALID_SESSION);
        assert_eq!(msg["error"]["data"]["kind"], "no_valid_session");
    }
}
