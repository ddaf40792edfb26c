//! In-process connection backed by a channel.
//!
//! Every text frame sent to a [`MemoryConnection`] lands on the paired
//! receiver. Dropping the receiver makes later sends fail, which is how a
//! vanished peer looks to the hub.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::traits::{Connection, ConnectionHandle, ConnectionId, TransportError};

/// A connection whose peer is an in-process receiver.
pub struct MemoryConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
    is_open: AtomicBool,
}

impl MemoryConnection {
    /// Create a connection and the receiver that observes its frames.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Self {
            id: ConnectionId::generate(),
            tx,
            is_open: AtomicBool::new(true),
        };
        (conn, rx)
    }

    /// Create a connection already wrapped in a handle.
    #[must_use]
    pub fn pair() -> (ConnectionHandle, mpsc::UnboundedReceiver<String>) {
        let (conn, rx) = Self::channel();
        (ConnectionHandle::new(Arc::new(conn)), rx)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        self.tx.send(text).map_err(|_| {
            self.is_open.store(false, Ordering::SeqCst);
            TransportError::ConnectionClosed
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.is_open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }
}
