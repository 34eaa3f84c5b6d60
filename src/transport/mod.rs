//! Transport adapters. Each turns wire messages into [`JsonRpcRequest`]s for
//! the shared [`Dispatcher`] and renders its [`Reply`] back onto the wire.

pub mod http;
pub mod stdio;

use serde_json::{json, Value};

use crate::error::BankError;
use crate::protocol::{self, JsonRpcRequest, INVALID_PARAMS, METHOD_NOT_FOUND};
use crate::session::Transport;
use crate::tools::progress::Invocation;
use crate::tools::ToolService;

const INSTRUCTIONS: &str = "Branch-scoped memory bank. Call init_memory_bank for a repository \
and branch, then record components, decisions, rules, and daily context. Traversal and \
algorithm tools stream progress notifications before their result.";

/// What a transport must send back for one request.
pub enum Reply {
    /// Notifications get no response.
    None,
    Message(Value),
    /// A new session was created; the transport binds it to the connection.
    Handshake { session_id: String, response: Value },
    /// Frames of a running tool call, ending with the terminal frame.
    Stream {
        request_id: Value,
        invocation: Invocation,
    },
}

/// Method routing shared by every transport.
#[derive(Clone)]
pub struct Dispatcher {
    tools: ToolService,
    transport: Transport,
}

impl Dispatcher {
    pub fn new(tools: ToolService, transport: Transport) -> Self {
        Self { tools, transport }
    }

    pub fn tools(&self) -> &ToolService {
        &self.tools
    }

    pub async fn handle(&self, request: JsonRpcRequest, session: Option<&str>) -> Reply {
        let id = request.id.clone().unwrap_or(Value::Null);
        tracing::debug!(method = %request.method, transport = %self.transport, "request received");

        match request.method.as_str() {
            "initialize" => {
                let session_id = self.tools.sessions().create(self.transport).await;
                Reply::Handshake {
                    session_id,
                    response: protocol::response(id, protocol::initialize_result(INSTRUCTIONS)),
                }
            }
            "notifications/initialized" => {
                if let Some(session) = session {
                    if let Err(e) = self.tools.sessions().touch(session).await {
                        tracing::debug!(error = %e, "initialized notification for dead session");
                    }
                }
                Reply::None
            }
            "ping" => Reply::Message(protocol::response(id, json!({}))),
            "tools/list" => match self.require_session(session).await {
                Ok(()) => Reply::Message(protocol::response(
                    id,
                    json!({ "tools": self.tools.list_tools() }),
                )),
                Err(e) => Reply::Message(protocol::bank_error_response(id, &e)),
            },
            "tools/call" => self.call_tool(id, request.params, session).await,
            method if request.is_notification() => {
                tracing::debug!(method, "ignoring notification");
                Reply::None
            }
            method => Reply::Message(protocol::error_response(
                id,
                METHOD_NOT_FOUND,
                &format!("method not found: {method}"),
            )),
        }
    }

    async fn require_session(&self, session: Option<&str>) -> Result<(), BankError> {
        let session = session.ok_or(BankError::NoValidSession)?;
        self.tools.sessions().touch(session).await.map(|_| ())
    }

    async fn call_tool(&self, id: Value, params: Option<Value>, session: Option<&str>) -> Reply {
        let Some(session) = session else {
            return Reply::Message(protocol::bank_error_response(id, &BankError::NoValidSession));
        };
        let params = params.unwrap_or(Value::Null);
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Reply::Message(protocol::error_response(
                id,
                INVALID_PARAMS,
                "tools/call requires a tool name",
            ));
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match self.tools.invoke(session, id.clone(), name, arguments).await {
            Ok(invocation) => Reply::Stream {
                request_id: id,
                invocation,
            },
            Err(e) => Reply::Message(protocol::bank_error_response(id, &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::MemoryService;
    use crate::protocol::NO_VALID_SESSION;
    use crate::session::SessionManager;
    use std::sync::Arc;
    use std::time::Duration;

    fn dispatcher() -> Dispatcher {
        let bank = MemoryService::open_in_memory().unwrap();
        let sessions = Arc::new(SessionManager::new(Duration::from_secs(60)));
        Dispatcher::new(ToolService::new(bank, sessions, "main"), Transport::Stdio)
    }

    fn request(raw: Value) -> JsonRpcRequest {
        JsonRpcRequest::from_value(raw).unwrap()
    }

    #[tokio::test]
    async fn tool_call_without_session_is_rejected() {
        let d = dispatcher();
        let reply = d
            .handle(
                request(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "get_metadata"}})),
                None,
            )
            .await;
        match reply {
            Reply::Message(msg) => assert_eq!(msg["error"]["code"], NO_VALID_SESSION),
            _ => panic!("expected an error message"),
        }
    }

    #[tokio::test]
    async fn handshake_then_list_tools() {
        let d = dispatcher();
        let reply = d
            .handle(request(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})), None)
            .await;
        let Reply::Handshake { session_id, response } = reply else {
            panic!("expected handshake");
        };
        assert_eq!(response["result"]["protocolVersion"], protocol::PROTOCOL_VERSION);

        let reply = d
            .handle(
                request(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})),
                Some(&session_id),
            )
            .await;
        let Reply::Message(msg) = reply else {
            panic!("expected tool listing");
        };
        assert!(msg["result"]["tools"].as_array().unwrap().len() > 30);
    }

    #[tokio::test]
    async fn unknown_method_and_notification() {
        let d = dispatcher();
        let reply = d
            .handle(request(json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"})), None)
            .await;
        assert!(matches!(reply, Reply::Message(msg) if msg["error"]["code"] == METHOD_NOT_FOUND));

        let reply = d
            .handle(request(json!({"jsonrpc": "2.0", "method": "notifications/cancelled"})), None)
            .await;
        assert!(matches!(reply, Reply::None));
    }
}
