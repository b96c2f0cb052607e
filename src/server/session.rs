//! Per-client processing loop.
//!
//! One loop per streaming session. Inbound messages are handled strictly in
//! arrival order: a tool call runs to completion before the next message is
//! read, so responses leave in the order their requests arrived. A tool call
//! runs on its own task; if the client disconnects while it is in flight the
//! loop detaches from that task, lets it finish (and release its device
//! session) on its own, and its result is dropped.
//!
//! Three things end a loop besides the inbound side closing: the client
//! dropping the outbound stream, the transport reporting a fault, and
//! gateway shutdown.

use rmcp::ErrorData as McpError;
use rmcp::model::ErrorCode;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::server::handler::McpHandler;
use crate::server::protocol::{ClientMessage, JsonRpcResponse, RequestId};
use crate::server::state::{StreamEvent, StreamState};

/// Why a loop stopped waiting on something.
enum Interrupt {
    Disconnected,
    TransportError,
    Shutdown,
}

impl Interrupt {
    fn event(&self) -> StreamEvent {
        match self {
            Interrupt::Disconnected => StreamEvent::Disconnected,
            Interrupt::TransportError => StreamEvent::TransportError,
            Interrupt::Shutdown => StreamEvent::Shutdown,
        }
    }
}

/// Drives one streaming session from `StreamOpen` to `Closed`.
pub struct SessionLoop {
    id: Uuid,
    handler: McpHandler,
    inbound: mpsc::Receiver<ClientMessage>,
    outbound: mpsc::Sender<String>,
    state: watch::Sender<StreamState>,
    cancel: CancellationToken,
    fault: CancellationToken,
}

impl SessionLoop {
    pub fn new(
        id: Uuid,
        handler: McpHandler,
        inbound: mpsc::Receiver<ClientMessage>,
        outbound: mpsc::Sender<String>,
        state: watch::Sender<StreamState>,
        cancel: CancellationToken,
        fault: CancellationToken,
    ) -> Self {
        Self {
            id,
            handler,
            inbound,
            outbound,
            state,
            cancel,
            fault,
        }
    }

    fn apply(&self, event: StreamEvent) -> bool {
        self.state.send_if_modified(|current| match current.on(event) {
            Some(next) => {
                *current = next;
                true
            }
            None => false,
        })
    }

    fn current(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Run until the client disconnects, the transport faults, the inbound
    /// side closes, or shutdown is requested. Always leaves the session
    /// `Closed`.
    pub async fn run(mut self) {
        tracing::debug!(session_id = %self.id, "session loop started");
        let reason = loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StreamEvent::Shutdown,
                _ = self.fault.cancelled() => break StreamEvent::TransportError,
                _ = self.outbound.closed() => break StreamEvent::Disconnected,
                message = self.inbound.recv() => match message {
                    Some(message) => message,
                    None => break StreamEvent::Disconnected,
                },
            };

            if let Err(interrupt) = self.handle(message).await {
                break interrupt.event();
            }
        };

        self.apply(reason);
        tracing::info!(session_id = %self.id, reason = ?reason, "session closed");
    }

    async fn handle(&mut self, message: ClientMessage) -> Result<(), Interrupt> {
        match message {
            ClientMessage::Request { id, method, params } => {
                let result = self.respond(&method, params).await?;
                self.send(JsonRpcResponse::from_result(id, result)).await
            }
            ClientMessage::Notification { method, params } => {
                self.notify(&method, params);
                Ok(())
            }
            ClientMessage::Response { id } => {
                tracing::debug!(session_id = %self.id, id = %id, "ignoring client response");
                Ok(())
            }
        }
    }

    async fn respond(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Result<Value, McpError>, Interrupt> {
        let result = match method {
            "initialize" => self.handler.initialize(params.as_ref()),
            "ping" => Ok(json!({})),
            "tools/list" => match self.require_active(method) {
                Ok(()) => self.handler.list_tools(),
                Err(e) => Err(e),
            },
            "tools/call" => match self.require_active(method) {
                Ok(()) => return self.call_tool(params).await,
                Err(e) => Err(e),
            },
            other => Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("method not found: {}", other),
                None,
            )),
        };
        Ok(result)
    }

    fn require_active(&self, method: &str) -> Result<(), McpError> {
        let state = self.current();
        if state.accepts_tool_calls() {
            Ok(())
        } else {
            Err(McpError::invalid_request(
                format!("'{}' is not allowed before initialization completes", method),
                Some(json!({ "state": format!("{:?}", state) })),
            ))
        }
    }

    /// Run a tool call on its own task and wait for it, unless the client
    /// goes away first.
    async fn call_tool(
        &mut self,
        params: Option<Value>,
    ) -> Result<Result<Value, McpError>, Interrupt> {
        let handler = self.handler.clone();
        let mut task = tokio::spawn(async move { handler.call_tool(params).await });

        tokio::select! {
            biased;
            joined = &mut task => Ok(joined.unwrap_or_else(|e| {
                Err(McpError::internal_error(format!("tool task failed: {}", e), None))
            })),
            _ = self.outbound.closed() => {
                tracing::info!(session_id = %self.id, "client disconnected during tool call, result will be discarded");
                Err(Interrupt::Disconnected)
            }
            _ = self.fault.cancelled() => {
                tracing::info!(session_id = %self.id, "transport failed during tool call, result will be discarded");
                Err(Interrupt::TransportError)
            }
            _ = self.cancel.cancelled() => {
                tracing::info!(session_id = %self.id, "shutdown during tool call, result will be discarded");
                Err(Interrupt::Shutdown)
            }
        }
    }

    fn notify(&mut self, method: &str, _params: Option<Value>) {
        match method {
            "notifications/initialized" => {
                if self.apply(StreamEvent::Initialized) {
                    tracing::info!(session_id = %self.id, "session active");
                } else {
                    tracing::debug!(
                        session_id = %self.id,
                        state = ?self.current(),
                        "initialized notification ignored"
                    );
                }
            }
            "notifications/cancelled" => {
                tracing::debug!(session_id = %self.id, "client cancelled a request");
            }
            other => {
                tracing::debug!(session_id = %self.id, method = other, "ignoring notification");
            }
        }
    }

    async fn send(&self, response: JsonRpcResponse) -> Result<(), Interrupt> {
        let id: RequestId = response.id.clone();
        let payload = match response.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(session_id = %self.id, id = %id, error = %e, "dropping unencodable response");
                return Ok(());
            }
        };
        self.outbound
            .send(payload)
            .await
            .map_err(|_| Interrupt::Disconnected)
    }
}
