//! Signaling relay: `/signal/{room_id}`.
//!
//! A pure pass-through between peers sharing a room. Frame types are never
//! interpreted; the relay only adds `ts` when the sender left it out and never
//! sends a frame back to its originator.

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
use hubbub_protocol::{ServerFrame, SignalFrame};
use hubbub_transport::{ConnectionHandle, WebSocketConnection};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    remote: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let remote = remote.map(|ConnectInfo(addr)| addr);
    ws.max_message_size(state.config.http.max_message_size)
        .on_upgrade(move |socket| handle_signal(socket, room_id, remote, state))
}

/// Handle a signaling connection.
async fn handle_signal(
    socket: WebSocket,
    room_id: String,
    remote: Option<SocketAddr>,
    state: Arc<AppState>,
) {
    let _metrics_guard = ConnectionMetricsGuard::new("signal");
    let (handle, mut receiver) = WebSocketConnection::split(socket, remote);

    if let Err(e) = handle
        .send_frame(&ServerFrame::signal_hello(&room_id, clock::utc_now()))
        .await
    {
        warn!(room = %room_id, connection = %handle.id(), error = %e, "Failed to send signal_hello");
        return;
    }

    // Join only after the greeting so `signal_hello` is always first.
    let _registration = Registration::room(Arc::clone(&state), &room_id, handle.clone());
    debug!(
        room = %room_id,
        connection = %handle.id(),
        remote = handle.remote_addr().as_deref().unwrap_or("unknown"),
        "Signaling connected"
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

        metrics::record_message(raw.len(), "inbound");
        relay(&state, &room_id, &handle, &raw).await;
    }

    let _ = handle.close().await;
    debug!(room = %room_id, connection = %handle.id(), "Signaling disconnected");
}

/// Relay one raw frame to the rest of the room.
async fn relay(state: &AppState, room_id: &str, sender: &ConnectionHandle, raw: &str) -> usize {
    let frame = SignalFrame::parse(raw).stamped(&clock::utc_now());

    match state.hub.broadcast_to_room(room_id, &frame, Some(sender)).await {
        Ok(recipients) => {
            trace!(room = %room_id, connection = %sender.id(), recipients, "Signal relayed");
            metrics::record_broadcast("room", recipients);
            recipients
        }
        Err(e) => {
            warn!(room = %room_id, connection = %sender.id(), error = %e, "Signal dropped");
            metrics::record_error("signal");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use hubbub_transport::MemoryConnection;
    use serde_json::Value;

    #[tokio::test]
    async fn test_relay_skips_sender_and_stamps_ts() {
        let state = AppState::new(Config::default());
        let (a, mut rx_a) = MemoryConnection::pair();
        let (b, mut rx_b) = MemoryConnection::pair();
        state.hub.register_room("r1", a.clone());
        state.hub.register_room("r1", b);

        let recipients = relay(&state, "r1", &a, r#"{"type":"offer","sdp":"x","nonce":"n1"}"#).await;
        assert_eq!(recipients, 1);

        let got: Value = serde_json::from_str(&rx_b.recv().await.unwrap()).unwrap();
        assert_eq!(got["type"], "offer");
        assert_eq!(got["nonce"], "n1");
        assert_eq!(got["sdp"], "x");
        assert!(got["ts"].is_string());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_wraps_raw_text() {
        let state = AppState::new(Config::default());
        let (a, _rx_a) = MemoryConnection::pair();
        let (b, mut rx_b) = MemoryConnection::pair();
        state.hub.register_room("r1", a.clone());
        state.hub.register_room("r1", b);

        relay(&state, "r1", &a, "candidate:1 1 udp").await;

        let got: Value = serde_json::from_str(&rx_b.recv().await.unwrap()).unwrap();
        assert_eq!(got["type"], "raw");
        assert_eq!(got["data"], "candidate:1 1 udp");
    }

    #[tokio::test]
    async fn test_relay_alone_in_room() {
        let state = AppState::new(Config::default());
        let (a, mut rx_a) = MemoryConnection::pair();
        state.hub.register_room("solo", a.clone());

        assert_eq!(relay(&state, "solo", &a, r#"{"type":"answer"}"#).await, 0);
        assert!(rx_a.try_recv().is_err());
    }
}
