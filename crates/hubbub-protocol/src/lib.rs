//! # hubbub-protocol
//!
//! Wire frames for the hubbub realtime hub.
//!
//! Every application-level message on the chat socket, the signaling socket and
//! the push stream is a UTF-8 JSON object with a mandatory `type` field.
//!
//! ## Frame Types
//!
//! - [`ClientFrame`] - what a chat client may send (`ping`, `message`, anything else)
//! - [`SignalFrame`] - opaque signaling payloads relayed between room peers
//! - [`ServerFrame`] - everything the server originates
//!
//! ## Example
//!
//! ```rust
//! use hubbub_protocol::{ClientFrame, ServerFrame, codec};
//!
//! let frame = ClientFrame::parse(r#"{"type":"ping"}"#);
//! assert_eq!(frame, ClientFrame::Ping);
//!
//! let pong = ServerFrame::pong("2024-01-01T00:00:00.000000+00:00");
//! let text = codec::encode(&pong).unwrap();
//! assert!(text.contains(r#""type":"pong""#));
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{merge_echoed, ClientFrame, ServerFrame, SignalFrame};
