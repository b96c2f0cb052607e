//! STDIO transport for Netgate.
//!
//! Newline-delimited JSON-RPC on stdin/stdout, driven through the same
//! session loop as SSE clients. stdin is the inbound queue, stdout the
//! outbound stream. Non-JSON input lines are discarded.
//!
//! Logs must go to stderr while this transport is active.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::server::SessionBridge;
use crate::server::protocol::ClientMessage;

async fn write_lines<W>(outbound: &mut mpsc::Receiver<String>, writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(payload) = outbound.recv().await {
        writer.write_all(payload.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Serve one session over an arbitrary reader/writer pair.
///
/// Returns once the reader hits EOF and every queued message has been
/// answered, or once the bridge shuts down. A failed read or write closes
/// the session as a transport error.
pub async fn serve_transport<R, W>(bridge: &SessionBridge, reader: R, mut writer: W) -> crate::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let opened = bridge.open_session().await;
    let id = opened.id;
    let mut outbound = opened.outbound;

    let writer_bridge = bridge.clone();
    let writer_task = tokio::spawn(async move {
        let result = write_lines(&mut outbound, &mut writer).await;
        if let Err(e) = &result {
            writer_bridge
                .fail_session(id, &format!("stdout write failed: {}", e))
                .await;
        }
        result
    });

    let shutdown = bridge.shutdown_token();
    let mut lines = BufReader::new(reader).lines();
    let read_result = loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match ClientMessage::from_slice(line.as_bytes()) {
                    Ok(message) => {
                        if let Err(e) = bridge.post(id, message).await {
                            tracing::debug!(session_id = %id, error = %e, "stdio session closed");
                            break Ok(());
                        }
                    }
                    Err(e) => {
                        tracing::debug!(session_id = %id, error = %e, "discarding non-JSON-RPC stdin line");
                    }
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(GatewayError::Protocol(format!("stdin read failed: {}", e))),
        }
    };

    match &read_result {
        // Let the loop drain what was already queued.
        Ok(()) => {
            bridge.end_input(id).await;
        }
        Err(e) => {
            bridge.fail_session(id, &e.to_string()).await;
        }
    }
    match writer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(session_id = %id, error = %e, "stdout write failed"),
        Err(e) => tracing::warn!(session_id = %id, error = %e, "stdout writer task failed"),
    }
    read_result
}

/// Serve a single MCP client over the process's stdin/stdout.
pub async fn serve_stdio(bridge: &SessionBridge) -> crate::Result<()> {
    tracing::info!("serving MCP over stdio");
    serve_transport(bridge, tokio::io::stdin(), tokio::io::stdout()).await
}
