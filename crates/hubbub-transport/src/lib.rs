//! # hubbub-transport
//!
//! Connection abstraction for the hubbub realtime hub.
//!
//! The hub never talks to a socket directly. It holds [`ConnectionHandle`]s,
//! cheap clonable references to one live connection that compare and hash by
//! [`ConnectionId`], and sends through the [`Connection`] trait:
//!
//! - **WebSocket** - axum WebSocket write half (`websocket` feature)
//! - **Memory** - an in-process channel, used by tests and benchmarks
//!
//! ```rust,ignore
//! use hubbub_transport::{ConnectionHandle, MemoryConnection};
//!
//! let (handle, mut rx) = MemoryConnection::pair();
//! handle.send_text("hello".to_string()).await?;
//! assert_eq!(rx.recv().await.as_deref(), Some("hello"));
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::MemoryConnection;
pub use traits::{Connection, ConnectionHandle, ConnectionId, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;
