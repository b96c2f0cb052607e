//! Client-facing MCP server for Netgate.
//!
//! Each streaming client gets a session: an id, a state machine, an inbound
//! queue fed by posted messages, and an outbound queue drained by its event
//! stream. The [`SessionBridge`] owns the routing table from id to session;
//! the table is only for routing, each session's processing loop owns its
//! own state.

pub mod handler;
pub mod http;
pub mod protocol;
pub mod session;
pub mod state;
pub mod stdio;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::server::handler::McpHandler;
use crate::server::protocol::ClientMessage;
use crate::server::session::SessionLoop;
use crate::server::state::{StreamEvent, StreamState};

/// Messages a client may post before its loop catches up.
const INBOUND_CAPACITY: usize = 32;

/// Responses buffered ahead of a slow event stream.
const OUTBOUND_CAPACITY: usize = 64;

/// Routing entry for one live session.
struct SessionHandle {
    inbound: mpsc::Sender<ClientMessage>,
    state: watch::Receiver<StreamState>,
    fault: CancellationToken,
}

struct BridgeInner {
    handler: McpHandler,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    shutdown: CancellationToken,
}

/// A freshly opened session: its id and the stream of serialized responses.
pub struct OpenedSession {
    pub id: Uuid,
    pub outbound: mpsc::Receiver<String>,
}

/// Routes posted messages to per-client processing loops.
///
/// Cheap to clone; all clones share one routing table.
#[derive(Clone)]
pub struct SessionBridge {
    inner: Arc<BridgeInner>,
}

impl SessionBridge {
    /// Create a bridge whose sessions all stop when `shutdown` is cancelled.
    pub fn new(handler: McpHandler, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                handler,
                sessions: RwLock::new(HashMap::new()),
                shutdown,
            }),
        }
    }

    pub fn handler(&self) -> &McpHandler {
        &self.inner.handler
    }

    /// Register a new session and start its processing loop.
    ///
    /// The session starts in `StreamOpen`. Dropping the returned `outbound`
    /// receiver is how a transport signals that the client went away.
    pub async fn open_session(&self) -> OpenedSession {
        let id = Uuid::new_v4();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(StreamState::Idle);
        state_tx.send_modify(|state| {
            if let Some(next) = state.on(StreamEvent::StreamOpened) {
                *state = next;
            }
        });
        let cancel = self.inner.shutdown.child_token();
        let fault = CancellationToken::new();

        self.inner.sessions.write().await.insert(
            id,
            SessionHandle {
                inbound: inbound_tx,
                state: state_rx,
                fault: fault.clone(),
            },
        );

        let session = SessionLoop::new(
            id,
            self.inner.handler.clone(),
            inbound_rx,
            outbound_tx,
            state_tx,
            cancel,
            fault,
        );
        let bridge = self.clone();
        tokio::spawn(async move {
            session.run().await;
            bridge.inner.sessions.write().await.remove(&id);
        });

        tracing::info!(session_id = %id, "session opened");
        OpenedSession {
            id,
            outbound: outbound_rx,
        }
    }

    /// Queue a client message on session `id`.
    ///
    /// Only checks routing; the message's meaning is decided by the session's
    /// loop, in arrival order.
    pub async fn post(&self, id: Uuid, message: ClientMessage) -> crate::Result<()> {
        let inbound = {
            let sessions = self.inner.sessions.read().await;
            let handle = sessions
                .get(&id)
                .ok_or_else(|| GatewayError::SessionNotFound(id.to_string()))?;
            if handle.state.borrow().is_closed() {
                return Err(GatewayError::SessionClosed(id.to_string()));
            }
            handle.inbound.clone()
        };
        inbound
            .send(message)
            .await
            .map_err(|_| GatewayError::SessionClosed(id.to_string()))
    }

    /// Close session `id` because its transport failed.
    ///
    /// Queued messages are dropped and an in-flight result is discarded.
    /// Returns `false` if the session was not registered.
    pub async fn fail_session(&self, id: Uuid, reason: &str) -> bool {
        match self.inner.sessions.write().await.remove(&id) {
            Some(handle) => {
                tracing::warn!(session_id = %id, reason, "session transport failed");
                handle.fault.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop routing to session `id` without cancelling it.
    ///
    /// The loop still answers every message already queued, then closes.
    pub async fn end_input(&self, id: Uuid) -> bool {
        self.inner.sessions.write().await.remove(&id).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn session_state(&self, id: Uuid) -> Option<StreamState> {
        self.inner
            .sessions
            .read()
            .await
            .get(&id)
            .map(|handle| *handle.state.borrow())
    }

    /// Cancel every session loop.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }
}

impl std::fmt::Debug for SessionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBridge").finish_non_exhaustive()
    }
}
