//! WebSocket connection backed by an axum socket.
//!
//! The socket is split: the write half lives behind a [`Mutex`] inside
//! [`WebSocketConnection`] so the hub and the owning adapter can both send,
//! while the read half goes back to the adapter's receive loop.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::traits::{Connection, ConnectionHandle, ConnectionId, TransportError};

/// The write half of an axum WebSocket.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    remote_addr: Option<SocketAddr>,
    is_open: AtomicBool,
}

impl WebSocketConnection {
    /// Split an upgraded socket into a shareable handle and its read half.
    #[must_use]
    pub fn split(
        socket: WebSocket,
        remote_addr: Option<SocketAddr>,
    ) -> (ConnectionHandle, SplitStream<WebSocket>) {
        let (sink, stream) = socket.split();
        let conn = Self {
            id: ConnectionId::generate(),
            sink: Mutex::new(sink),
            remote_addr,
            is_open: AtomicBool::new(true),
        };
        debug!(connection = %conn.id, "WebSocket connection created");
        (ConnectionHandle::new(Arc::new(conn)), stream)
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text)).await.map_err(|e| {
            warn!(connection = %self.id, error = %e, "WebSocket send failed");
            self.is_open.store(false, Ordering::SeqCst);
            TransportError::SendFailed(e.to_string())
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already closed
        }

        let mut sink = self.sink.lock().await;
        sink.close()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}
