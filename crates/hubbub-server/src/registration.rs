//! Hub registrations scoped to a connection's lifetime.
//!
//! A [`Registration`] registers on creation and unregisters on drop, so every
//! way out of an adapter loop (close, error, panic, a dropped SSE body) runs
//! the cleanup exactly once. The hub tolerates the handle having already been
//! pruned by a failed broadcast.

use crate::handlers::AppState;
use hubbub_core::{PushSubscription, SubscriberId};
use hubbub_transport::ConnectionHandle;
use std::sync::Arc;
use tracing::debug;

enum Slot {
    Chat {
        user_id: String,
        handle: ConnectionHandle,
    },
    Room {
        room_id: String,
        handle: ConnectionHandle,
    },
    Push {
        user_id: String,
        subscriber: SubscriberId,
    },
}

/// A live hub registration.
pub struct Registration {
    state: Arc<AppState>,
    slot: Slot,
}

impl Registration {
    /// Register a chat socket for `user_id`.
    pub fn chat(state: Arc<AppState>, user_id: &str, handle: ConnectionHandle) -> Self {
        state.hub.register_chat(user_id, handle.clone());
        Self {
            state,
            slot: Slot::Chat {
                user_id: user_id.to_string(),
                handle,
            },
        }
    }

    /// Register a signaling socket in `room_id`.
    pub fn room(state: Arc<AppState>, room_id: &str, handle: ConnectionHandle) -> Self {
        state.hub.register_room(room_id, handle.clone());
        Self {
            state,
            slot: Slot::Room {
                room_id: room_id.to_string(),
                handle,
            },
        }
    }

    /// Open a push-stream queue for `user_id`.
    pub fn push(state: Arc<AppState>, user_id: &str) -> (Self, PushSubscription) {
        let subscription = state.hub.subscribe_push(user_id);
        let registration = Self {
            state,
            slot: Slot::Push {
                user_id: user_id.to_string(),
                subscriber: subscription.id(),
            },
        };
        (registration, subscription)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let hub = &self.state.hub;
        match &self.slot {
            Slot::Chat { user_id, handle } => {
                let removed = hub.unregister_chat(user_id, handle);
                debug!(user = %user_id, connection = %handle.id(), removed, "Chat closed");
            }
            Slot::Room { room_id, handle } => {
                let removed = hub.unregister_room(room_id, handle);
                debug!(room = %room_id, connection = %handle.id(), removed, "Signaling closed");
            }
            Slot::Push {
                user_id,
                subscriber,
            } => {
                let removed = hub.unsubscribe_push(user_id, *subscriber);
                debug!(user = %user_id, subscriber, removed, "Push stream closed");
            }
        }
    }
}
