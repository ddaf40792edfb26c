//! Chat socket: `/ws/{user_id}`.
//!
//! Lifecycle: upgrade, greet with `ws_hello`, register with the hub, then
//! handle inbound frames strictly in arrival order until the peer goes away.
//! Registering after the greeting keeps `ws_hello` the first frame the peer
//! sees.

use crate::handlers::AppState;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::registration::Registration;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, State,
    },
    response::IntoResponse,
};
use futures_util::StreamExt;
use hubbub_core::clock;
use hubbub_protocol::{merge_echoed, ClientFrame, ServerFrame};
use hubbub_transport::{ConnectionHandle, TransportError, WebSocketConnection};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    remote: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let remote = remote.map(|ConnectInfo(addr)| addr);
    ws.max_message_size(state.config.http.max_message_size)
        .on_upgrade(move |socket| handle_chat(socket, user_id, remote, state))
}

/// Handle a chat connection.
async fn handle_chat(
    socket: WebSocket,
    user_id: String,
    remote: Option<SocketAddr>,
    state: Arc<AppState>,
) {
    let _metrics_guard = ConnectionMetricsGuard::new("chat");
    let (handle, mut receiver) = WebSocketConnection::split(socket, remote);

    if let Err(e) = handle
        .send_frame(&ServerFrame::ws_hello(&user_id, clock::utc_now()))
        .await
    {
        warn!(user = %user_id, connection = %handle.id(), error = %e, "Failed to send ws_hello");
        return;
    }

    let _registration = Registration::chat(Arc::clone(&state), &user_id, handle.clone());
    debug!(
        user = %user_id,
        connection = %handle.id(),
        remote = handle.remote_addr().as_deref().unwrap_or("unknown"),
        "Chat connected"
    );

    while let Some(msg) = receiver.next().await {
        let raw = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                debug!(connection = %handle.id(), "Received close frame");
                break;
            }
            Err(e) => {
                warn!(connection = %handle.id(), error = %e, "WebSocket error");
                metrics::record_error("websocket");
                break;
            }
        };

        let start = Instant::now();
        metrics::record_message(raw.len(), "inbound");

        match handle_frame(&state, &user_id, &handle, ClientFrame::parse(&raw)).await {
            Ok(()) => {}
            // The reply could not be encoded; the connection itself is fine.
            Err(TransportError::Protocol(e)) => {
                warn!(connection = %handle.id(), error = %e, "Dropping unencodable reply");
                metrics::record_error("protocol");
            }
            Err(e) => {
                debug!(connection = %handle.id(), error = %e, "Chat send failed, closing");
                break;
            }
        }

        metrics::record_latency(start.elapsed().as_secs_f64());
    }

    let _ = handle.close().await;
    debug!(user = %user_id, connection = %handle.id(), "Chat disconnected");
}

/// Handle one parsed frame.
async fn handle_frame(
    state: &AppState,
    user_id: &str,
    handle: &ConnectionHandle,
    frame: ClientFrame,
) -> Result<(), TransportError> {
    trace!(connection = %handle.id(), kind = frame.kind(), "Chat frame");

    match frame {
        ClientFrame::Ping => {
            handle.send_frame(&ServerFrame::pong(clock::utc_now())).await?;
        }

        ClientFrame::Message { data } => {
            handle.send_frame(&ServerFrame::echo(data.clone())).await?;

            let ts = clock::utc_now();
            let broadcast = ServerFrame::message(merge_echoed(data, &ts));
            let recipients = state.hub.broadcast_to_user(user_id, &broadcast).await?;
            metrics::record_broadcast("user", recipients);
        }

        other @ (ClientFrame::Text(_) | ClientFrame::Other(_)) => {
            let ack = ServerFrame::ack(other.into_value(), clock::utc_now());
            handle.send_frame(&ack).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use hubbub_transport::MemoryConnection;
    use serde_json::{json, Value};

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn test_ping_replies_once_without_broadcast() {
        let state = AppState::new(Config::default());
        let (sender, mut rx_sender) = MemoryConnection::pair();
        let (other, mut rx_other) = MemoryConnection::pair();
        state.hub.register_chat("alice", sender.clone());
        state.hub.register_chat("alice", other);
        let mut push = state.hub.subscribe_push("alice");

        handle_frame(&state, "alice", &sender, ClientFrame::Ping)
            .await
            .unwrap();

        assert_eq!(parse(&rx_sender.recv().await.unwrap())["type"], "pong");
        assert!(rx_sender.try_recv().is_err());
        assert!(rx_other.try_recv().is_err());
        assert!(push.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_message_echoes_then_broadcasts() {
        let state = AppState::new(Config::default());
        let (sender, mut rx_sender) = MemoryConnection::pair();
        let (other, mut rx_other) = MemoryConnection::pair();
        state.hub.register_chat("alice", sender.clone());
        state.hub.register_chat("alice", other);

        let frame = ClientFrame::parse(r#"{"type":"message","data":{"text":"yo"}}"#);
        handle_frame(&state, "alice", &sender, frame).await.unwrap();

        let echo = parse(&rx_sender.recv().await.unwrap());
        assert_eq!(echo, json!({"type": "echo", "data": {"text": "yo"}}));

        let own = parse(&rx_sender.recv().await.unwrap());
        let theirs = parse(&rx_other.recv().await.unwrap());
        assert_eq!(own, theirs);
        assert_eq!(theirs["type"], "message");
        assert_eq!(theirs["data"]["text"], "yo");
        assert_eq!(theirs["data"]["echoed"], true);
        assert!(theirs["data"]["ts"].is_string());
    }

    #[tokio::test]
    async fn test_other_frames_are_acked() {
        let state = AppState::new(Config::default());
        let (sender, mut rx_sender) = MemoryConnection::pair();
        state.hub.register_chat("alice", sender.clone());

        handle_frame(&state, "alice", &sender, ClientFrame::parse("just words"))
            .await
            .unwrap();
        let ack = parse(&rx_sender.recv().await.unwrap());
        assert_eq!(ack["type"], "ack");
        assert_eq!(
            ack["data"],
            json!({"type": "text", "data": {"text": "just words"}})
        );
        assert!(ack["ts"].is_string());

        handle_frame(&state, "alice", &sender, ClientFrame::parse(r#"{"type":"typing"}"#))
            .await
            .unwrap();
        let ack = parse(&rx_sender.recv().await.unwrap());
        assert_eq!(ack["data"], json!({"type": "typing"}));
        assert!(rx_sender.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oversized_reply_is_a_protocol_error() {
        let state = AppState::new(Config::default());
        let (sender, mut rx_sender) = MemoryConnection::pair();

        let frame = ClientFrame::parse(&"\u{1}".repeat(200_000));
        let result = handle_frame(&state, "alice", &sender, frame).await;

        assert!(matches!(result, Err(TransportError::Protocol(_))));
        assert!(rx_sender.try_recv().is_err());
        assert!(sender.is_open());
    }

    #[tokio::test]
    async fn test_send_failure_surfaces_to_loop() {
        let state = AppState::new(Config::default());
        let (sender, rx_sender) = MemoryConnection::pair();
        drop(rx_sender);

        assert!(handle_frame(&state, "alice", &sender, ClientFrame::Ping)
            .await
            .is_err());
    }
}
