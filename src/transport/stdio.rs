//! Newline-delimited JSON-RPC over a byte stream.
//!
//! One connection carries one session, created by `initialize` and attached
//! implicitly to every later request. Tool calls run concurrently: each
//! invocation gets its own forwarder task, and a single writer task
//! serializes their frames onto the output.

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::{Dispatcher, Reply};
use crate::protocol::{self, JsonRpcRequest};
use crate::session::CloseReason;

/// Serve requests from `reader` until EOF, writing responses to `writer`.
pub async fn serve_io<R, W>(dispatcher: Dispatcher, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<Value>();
    let writer_task = tokio::spawn(write_messages(writer, rx));
    let mut forwarders = JoinSet::new();
    let mut session: Option<String> = None;

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await.context("failed to read request")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request = match JsonRpcRequest::parse(line) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!("rejecting malformed message");
                let _ = tx.send(error);
                continue;
            }
        };

        match dispatcher.handle(request, session.as_deref()).await {
            Reply::None => {}
            Reply::Message(msg) => {
                let _ = tx.send(msg);
            }
            Reply::Handshake {
                session_id,
                response,
            } => {
                if let Some(previous) = session.replace(session_id) {
                    dispatcher
                        .tools()
                        .sessions()
                        .close(&previous, CloseReason::ClientClosed)
                        .await;
                }
                let _ = tx.send(response);
            }
            Reply::Stream {
                request_id,
                mut invocation,
            } => {
                let tx = tx.clone();
                forwarders.spawn(async move {
                    while let Some(frame) = invocation.next_frame().await {
                        let last = frame.is_final();
                        if tx.send(protocol::render_frame(&frame)).is_err() {
                            tracing::warn!(request = %request_id, "output closed mid-invocation");
                            break;
                        }
                        if last {
                            break;
                        }
                    }
                });
            }
        }

        while let Some(joined) = forwarders.try_join_next() {
            if let Err(e) = joined {
                tracing::error!(error = %e, "frame forwarder failed");
            }
        }
    }

    tracing::info!("input closed, draining in-flight invocations");
    while let Some(joined) = forwarders.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "frame forwarder failed");
        }
    }
    if let Some(id) = session {
        dispatcher
            .tools()
            .sessions()
            .close(&id, CloseReason::ClientClosed)
            .await;
    }
    drop(tx);
    writer_task.await.context("writer task failed")??;
    Ok(())
}

async fn write_messages<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Value>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = rx.recv().await {
        let mut line = serde_json::to_vec(&msg)?;
        line.push(b'\n');
        writer.write_all(&line).await.context("failed to write response")?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::MemoryService;
    use crate::session::{SessionManager, Transport};
    use crate::tools::ToolService;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn script_runs_to_completion() {
        let bank = MemoryService::open_in_memory().unwrap();
        let sessions = Arc::new(SessionManager::new(Duration::from_secs(60)));
        let dispatcher = Dispatcher::new(ToolService::new(bank, sessions.clone(), "main"), Transport::Stdio);

        let script = [
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "init_memory_bank", "arguments": {"repository": "acme"}}}),
        ]
        .iter()
        .map(|m| format!("{m}\n"))
        .collect::<String>();

        let (out_writer, mut out_reader) = tokio::io::duplex(64 * 1024);
        serve_io(dispatcher, script.as_bytes(), out_writer).await.unwrap();

        let mut output = String::new();
        out_reader.read_to_string(&mut output).await.unwrap();
        let messages: Vec<Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(messages[0]["id"], 1);
        let result = messages.iter().find(|m| m["id"] == 2).unwrap();
        assert_eq!(result["result"]["isError"], false);
        assert_eq!(result["result"]["structuredContent"]["created"], true);
        assert!(messages
            .iter()
            .any(|m| m["method"] == "notifications/progress" && m["params"]["relatedId"] == 2));
        assert_eq!(sessions.active_count().await, 0);
    }
}
