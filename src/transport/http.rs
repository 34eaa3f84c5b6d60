//! HTTP transport: `POST /mcp` for requests, `DELETE /mcp` to end a session,
//! `GET /health` for liveness.
//!
//! The session id travels in the `Mcp-Session-Id` header. A `tools/call`
//! whose request accepts `text/event-stream` gets every frame as an SSE
//! event; otherwise the response is the terminal frame alone.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::json;

use super::{Dispatcher, Reply};
use crate::protocol::{self, JsonRpcRequest, INTERNAL_ERROR};
use crate::session::CloseReason;

pub const SESSION_HEADER: &str = "mcp-session-id";

pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/mcp", post(post_mcp).delete(delete_mcp))
        .route("/health", get(health))
        .with_state(Arc::new(dispatcher))
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn wants_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

async fn post_mcp(
    State(dispatcher): State<Arc<Dispatcher>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request = match JsonRpcRequest::parse(&body) {
        Ok(request) => request,
        Err(error) => return (StatusCode::BAD_REQUEST, Json(error)).into_response(),
    };
    let session = session_header(&headers);

    match dispatcher.handle(request, session.as_deref()).await {
        Reply::None => StatusCode::ACCEPTED.into_response(),
        Reply::Message(msg) => Json(msg).into_response(),
        Reply::Handshake {
            session_id,
            response,
        } => {
            let mut res = Json(response).into_response();
            match HeaderValue::from_str(&session_id) {
                Ok(value) => {
                    res.headers_mut().insert(SESSION_HEADER, value);
                }
                Err(e) => tracing::error!(error = %e, "session id is not a valid header value"),
            }
            res
        }
        Reply::Stream {
            request_id,
            invocation,
        } => {
            if wants_stream(&headers) {
                let events = invocation
                    .into_stream()
                    .map(|frame| Event::default().json_data(protocol::render_frame(&frame)));
                Sse::new(events)
                    .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
                    .into_response()
            } else {
                let msg = match invocation.finish().await {
                    Some(frame) => protocol::terminal_response(&frame),
                    None => protocol::error_response(
                        request_id,
                        INTERNAL_ERROR,
                        "invocation ended without a result",
                    ),
                };
                Json(msg).into_response()
            }
        }
    }
}

async fn delete_mcp(State(dispatcher): State<Arc<Dispatcher>>, headers: HeaderMap) -> StatusCode {
    let Some(session) = session_header(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    if dispatcher
        .tools()
        .sessions()
        .close(&session, CloseReason::ClientClosed)
        .await
    {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn health(State(dispatcher): State<Arc<Dispatcher>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": dispatcher.tools().sessions().active_count().await,
    }))
}
