//! Transport abstraction traits for hubbub.
//!
//! These traits define what the hub needs from a live connection, allowing the
//! registry to be transport-agnostic.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Counter backing [`ConnectionId::generate`].
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}", n))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] hubbub_protocol::ProtocolError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// The write side of one live connection.
///
/// Implementations must tolerate concurrent callers: the owning adapter and
/// hub broadcasts may send on the same connection at the same time.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Send one text frame.
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}

/// A shared reference to a live connection.
///
/// Two handles are equal when they refer to the same connection, regardless of
/// which user or room they are registered under.
#[derive(Clone)]
pub struct ConnectionHandle(Arc<dyn Connection>);

impl ConnectionHandle {
    /// Wrap a connection.
    #[must_use]
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self(connection)
    }

    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        self.0.id()
    }

    /// Check if the connection is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.0.is_open()
    }

    /// Get the peer address, if the transport knows it.
    #[must_use]
    pub fn remote_addr(&self) -> Option<String> {
        self.0.remote_addr()
    }

    /// Send pre-encoded text.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or the write fails.
    pub async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.0.send_text(text).await
    }

    /// Encode and send a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails, the connection is closed, or the
    /// write fails.
    pub async fn send_frame<T: Serialize + ?Sized + Sync>(
        &self,
        frame: &T,
    ) -> Result<(), TransportError> {
        let text = hubbub_protocol::encode(frame)?;
        self.0.send_text(text).await
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.0.close().await
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", self.id())
            .field("open", &self.is_open())
            .finish()
    }
}
