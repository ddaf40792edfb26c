//! Connection registry and fan-out.
//!
//! The hub is the single source of truth for who is listening:
//!
//! - chat sockets, keyed by user
//! - signaling sockets, keyed by room
//! - push-stream queues, keyed by user
//!
//! All three maps sit behind one lock. Broadcasts copy the recipients out
//! under the lock, release it, then send. A recipient that fails to accept a
//! payload is dropped from the registry and the broadcast carries on. A write
//! that does not complete within the send timeout counts as a failure, so a
//! peer that stops reading cannot stall fan-out to everyone else.

use futures_util::future::join_all;
use hubbub_protocol::{codec, ProtocolError};
use hubbub_transport::ConnectionHandle;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Default time a single socket write may take during a broadcast.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifies one push-stream queue.
pub type SubscriberId = u64;

/// The receiving end of a push-stream queue.
///
/// Items are encoded JSON frames, shared between all recipients of a
/// broadcast.
#[derive(Debug)]
pub struct PushSubscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<Arc<str>>,
}

impl PushSubscription {
    /// Get the subscriber ID to pass back to [`Hub::unsubscribe_push`].
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next queued payload.
    ///
    /// Returns `None` once the hub has dropped the queue.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    /// Take a queued payload without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }
}

/// Sending side of a push-stream queue.
#[derive(Debug, Clone)]
struct PushQueue {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<Arc<str>>,
}

/// Everything guarded by the hub lock.
///
/// Keys whose set or list becomes empty are removed.
#[derive(Debug, Default)]
struct Registry {
    chat_by_user: HashMap<String, HashSet<ConnectionHandle>>,
    room_members: HashMap<String, HashSet<ConnectionHandle>>,
    push_subscribers: HashMap<String, Vec<PushQueue>>,
}

fn remove_from_set(
    map: &mut HashMap<String, HashSet<ConnectionHandle>>,
    key: &str,
    handle: &ConnectionHandle,
) -> bool {
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    let removed = set.remove(handle);
    if set.is_empty() {
        map.remove(key);
    }
    removed
}

/// The connection registry.
#[derive(Debug)]
pub struct Hub {
    registry: Mutex<Registry>,
    next_subscriber: AtomicU64,
    send_timeout: Duration,
}

impl Default for Hub {
    fn default() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }
}

impl Hub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty hub with a custom per-write broadcast timeout.
    #[must_use]
    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            next_subscriber: AtomicU64::new(0),
            send_timeout,
        }
    }

    /// Get the per-write broadcast timeout.
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Register a chat socket for a user.
    ///
    /// Returns `false` if the handle was already registered.
    pub fn register_chat(&self, user_id: &str, handle: ConnectionHandle) -> bool {
        let connection = handle.id().clone();
        let mut registry = self.registry.lock();
        let set = registry.chat_by_user.entry(user_id.to_string()).or_default();
        let added = set.insert(handle);
        debug!(user = %user_id, connection = %connection, sockets = set.len(), "Chat registered");
        added
    }

    /// Remove a chat socket. Removing an unknown handle is a no-op.
    ///
    /// Returns `true` if the handle was registered.
    pub fn unregister_chat(&self, user_id: &str, handle: &ConnectionHandle) -> bool {
        let removed = remove_from_set(&mut self.registry.lock().chat_by_user, user_id, handle);
        if removed {
            debug!(user = %user_id, connection = %handle.id(), "Chat unregistered");
        }
        removed
    }

    /// Register a signaling socket in a room.
    ///
    /// Returns `false` if the handle was already registered.
    pub fn register_room(&self, room_id: &str, handle: ConnectionHandle) -> bool {
        let connection = handle.id().clone();
        let mut registry = self.registry.lock();
        let set = registry.room_members.entry(room_id.to_string()).or_default();
        let added = set.insert(handle);
        debug!(room = %room_id, connection = %connection, members = set.len(), "Room joined");
        added
    }

    /// Remove a signaling socket from a room. Removing an unknown handle is a
    /// no-op.
    ///
    /// Returns `true` if the handle was registered.
    pub fn unregister_room(&self, room_id: &str, handle: &ConnectionHandle) -> bool {
        let removed = remove_from_set(&mut self.registry.lock().room_members, room_id, handle);
        if removed {
            debug!(room = %room_id, connection = %handle.id(), "Room left");
        }
        removed
    }

    /// Open a new push-stream queue for a user.
    pub fn subscribe_push(&self, user_id: &str) -> PushSubscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut registry = self.registry.lock();
        let queues = registry
            .push_subscribers
            .entry(user_id.to_string())
            .or_default();
        queues.push(PushQueue { id, tx });
        debug!(user = %user_id, subscriber = id, queues = queues.len(), "Push subscribed");

        PushSubscription { id, rx }
    }

    /// Remove a push-stream queue. Removing an unknown queue is a no-op.
    ///
    /// Returns `true` if the queue was registered.
    pub fn unsubscribe_push(&self, user_id: &str, subscriber: SubscriberId) -> bool {
        let mut registry = self.registry.lock();
        let Some(queues) = registry.push_subscribers.get_mut(user_id) else {
            return false;
        };

        let before = queues.len();
        queues.retain(|q| q.id != subscriber);
        let removed = queues.len() != before;
        if queues.is_empty() {
            registry.push_subscribers.remove(user_id);
        }
        drop(registry);

        if removed {
            debug!(user = %user_id, subscriber, "Push unsubscribed");
        }
        removed
    }

    /// Deliver a payload to every chat socket and push queue of a user.
    ///
    /// Returns the number of recipients that accepted the payload. Sockets
    /// that fail are unregistered; closed queues are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the payload cannot be encoded.
    pub async fn broadcast_to_user<T: Serialize + ?Sized>(
        &self,
        user_id: &str,
        payload: &T,
    ) -> Result<usize, ProtocolError> {
        let text = codec::encode(payload)?;

        let (handles, queues) = {
            let registry = self.registry.lock();
            let handles: Vec<ConnectionHandle> = registry
                .chat_by_user
                .get(user_id)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            let queues: Vec<PushQueue> = registry
                .push_subscribers
                .get(user_id)
                .cloned()
                .unwrap_or_default();
            (handles, queues)
        };

        let mut delivered = self
            .send_all(handles, &text, |handle| {
                self.unregister_chat(user_id, handle);
            })
            .await;

        let shared: Arc<str> = Arc::from(text);
        for queue in queues {
            if queue.tx.send(Arc::clone(&shared)).is_ok() {
                delivered += 1;
            } else {
                self.unsubscribe_push(user_id, queue.id);
            }
        }

        trace!(user = %user_id, recipients = delivered, "Broadcast to user");
        Ok(delivered)
    }

    /// Deliver a payload to every signaling socket in a room except `sender`.
    ///
    /// Returns the number of recipients that accepted the payload. Sockets
    /// that fail are unregistered.
    ///
    /// # Errors
    ///
    /// Returns an error only if the payload cannot be encoded.
    pub async fn broadcast_to_room<T: Serialize + ?Sized>(
        &self,
        room_id: &str,
        payload: &T,
        sender: Option<&ConnectionHandle>,
    ) -> Result<usize, ProtocolError> {
        let text = codec::encode(payload)?;

        let handles: Vec<ConnectionHandle> = {
            let registry = self.registry.lock();
            registry
                .room_members
                .get(room_id)
                .map(|set| {
                    set.iter()
                        .filter(|handle| Some(*handle) != sender)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        let delivered = self
            .send_all(handles, &text, |handle| {
                self.unregister_room(room_id, handle);
            })
            .await;

        trace!(room = %room_id, recipients = delivered, "Broadcast to room");
        Ok(delivered)
    }

    /// Send to every handle concurrently, calling `on_failure` for each one
    /// that rejects the write or does not finish it within the send timeout.
    /// Timed-out handles are also closed in the background.
    async fn send_all(
        &self,
        handles: Vec<ConnectionHandle>,
        text: &str,
        on_failure: impl Fn(&ConnectionHandle),
    ) -> usize {
        let timeout = self.send_timeout;
        let results = join_all(handles.into_iter().map(|handle| async move {
            let result = tokio::time::timeout(timeout, handle.send_text(text.to_string())).await;
            (handle, result)
        }))
        .await;

        let mut delivered = 0;
        for (handle, result) in results {
            match result {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    debug!(connection = %handle.id(), error = %e, "Dropping unreachable connection");
                    on_failure(&handle);
                }
                Err(_) => {
                    warn!(connection = %handle.id(), ?timeout, "Dropping stalled connection");
                    on_failure(&handle);
                    tokio::spawn(async move {
                        let _ = tokio::time::timeout(timeout, handle.close()).await;
                    });
                }
            }
        }
        delivered
    }

    /// Number of chat sockets registered for a user.
    #[must_use]
    pub fn chat_connections(&self, user_id: &str) -> usize {
        self.registry
            .lock()
            .chat_by_user
            .get(user_id)
            .map_or(0, HashSet::len)
    }

    /// Number of signaling sockets in a room.
    #[must_use]
    pub fn room_size(&self, room_id: &str) -> usize {
        self.registry
            .lock()
            .room_members
            .get(room_id)
            .map_or(0, HashSet::len)
    }

    /// Number of push queues open for a user.
    #[must_use]
    pub fn push_subscriber_count(&self, user_id: &str) -> usize {
        self.registry
            .lock()
            .push_subscribers
            .get(user_id)
            .map_or(0, Vec::len)
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let registry = self.registry.lock();
        HubStats {
            chat_users: registry.chat_by_user.len(),
            chat_connections: registry.chat_by_user.values().map(HashSet::len).sum(),
            rooms: registry.room_members.len(),
            room_connections: registry.room_members.values().map(HashSet::len).sum(),
            push_users: registry.push_subscribers.len(),
            push_subscribers: registry.push_subscribers.values().map(Vec::len).sum(),
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Users with at least one chat socket.
    pub chat_users: usize,
    /// Total chat sockets.
    pub chat_connections: usize,
    /// Rooms with at least one signaling socket.
    pub rooms: usize,
    /// Total signaling sockets.
    pub room_connections: usize,
    /// Users with at least one push stream.
    pub push_users: usize,
    /// Total push streams.
    pub push_subscribers: usize,
}
