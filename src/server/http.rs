//! HTTP/SSE transport for Netgate.
//!
//! `GET /sse` opens a streaming session. Its first event is `endpoint`,
//! carrying the URL the client must POST its JSON-RPC messages to; every
//! response after that arrives as a `message` event on the same stream.
//! Closing the stream is how the client disconnects.

use std::convert::Infallible;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::server::SessionBridge;
use crate::server::protocol::ClientMessage;

/// Path clients POST to; the session id rides in the query string.
pub const MESSAGES_PATH: &str = "/messages/";

#[derive(Clone)]
struct HttpState {
    bridge: SessionBridge,
    keep_alive: Duration,
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: Option<String>,
}

/// Build the router serving `/sse`, `/messages/`, and `/health`.
pub fn router(bridge: SessionBridge, keep_alive: Duration) -> Router {
    let state = HttpState { bridge, keep_alive };
    Router::new()
        .route("/sse", get(event_stream))
        .route(MESSAGES_PATH, post(post_message))
        .route("/messages", post(post_message))
        .route("/health", get(health))
        .with_state(state)
}

/// Endpoint URL announced to a new session.
pub fn endpoint_for(id: Uuid) -> String {
    format!("{}?session_id={}", MESSAGES_PATH, id.simple())
}

/// `GET /sse`: open a session and stream its responses.
async fn event_stream(
    State(state): State<HttpState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let opened = state.bridge.open_session().await;
    let endpoint = Event::default().event("endpoint").data(endpoint_for(opened.id));

    // Dropping this stream drops the receiver, which the session loop sees
    // as a disconnect.
    let messages = stream::unfold(opened.outbound, |mut outbound| async move {
        let payload = outbound.recv().await?;
        Some((Ok(Event::default().event("message").data(payload)), outbound))
    });
    let events = stream::once(async move { Ok(endpoint) }).chain(messages);

    Sse::new(events).keep_alive(KeepAlive::default().interval(state.keep_alive))
}

/// `POST /messages/?session_id=<id>`: queue one JSON-RPC message.
async fn post_message(
    State(state): State<HttpState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(raw_id) = query.session_id else {
        return (StatusCode::BAD_REQUEST, "session_id is required").into_response();
    };
    let Ok(id) = Uuid::parse_str(&raw_id) else {
        return (StatusCode::BAD_REQUEST, "invalid session ID").into_response();
    };

    let message = match ClientMessage::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(session_id = %id, error = %e, "rejecting posted message");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    match state.bridge.post(id, message).await {
        Ok(()) => (StatusCode::ACCEPTED, "Accepted").into_response(),
        Err(e @ (GatewayError::SessionNotFound(_) | GatewayError::SessionClosed(_))) => {
            (StatusCode::NOT_FOUND, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `GET /health`: liveness plus a little context.
async fn health(State(state): State<HttpState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.bridge.session_count().await,
        "tools": state.bridge.handler().registry().tool_names(),
    }))
}
