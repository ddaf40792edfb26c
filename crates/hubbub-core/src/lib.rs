//! # hubbub-core
//!
//! Message history and connection registry for the hubbub realtime hub.
//!
//! This crate provides the building blocks the transport adapters sit on:
//!
//! - **Clock** - timestamps and message IDs
//! - **MessageStore** - per-user append-only chat history
//! - **Hub** - who is listening, and best-effort fan-out to them
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  register   ┌─────────────┐  send   ┌──────────────────┐
//! │   Adapter   │────────────▶│     Hub     │────────▶│ ConnectionHandle │
//! └─────────────┘             └─────────────┘         └──────────────────┘
//!        │                           │ enqueue
//!        ▼                           ▼
//! ┌─────────────┐             ┌──────────────────┐
//! │MessageStore │             │ PushSubscription │
//! └─────────────┘             └──────────────────┘
//! ```

pub mod clock;
pub mod hub;
pub mod message;
pub mod store;

pub use hub::{Hub, HubStats, PushSubscription, SubscriberId, DEFAULT_SEND_TIMEOUT};
pub use message::ChatMessage;
pub use store::{MessageStore, StoreError, DEFAULT_HISTORY_LIMIT};
