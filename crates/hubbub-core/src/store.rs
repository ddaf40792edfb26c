//! Per-user chat history.
//!
//! Each user owns an append-only sequence. Appends for the same user are
//! serialized by the map's shard lock, so insertion order is the order in
//! which `append` calls won that lock.

use crate::message::ChatMessage;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, trace};

/// Number of messages returned by [`MessageStore::history`] by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Store errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Messages must belong to a user.
    #[error("user_id cannot be empty")]
    EmptyUserId,
}

/// In-memory message history keyed by user.
#[derive(Debug)]
pub struct MessageStore {
    messages: DashMap<String, Vec<ChatMessage>>,
    history_limit: usize,
}

impl MessageStore {
    /// Create a store with the default history window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Create a store that returns at most `history_limit` messages per read.
    #[must_use]
    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            messages: DashMap::new(),
            history_limit,
        }
    }

    /// Get the history window.
    #[must_use]
    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Append a message to the end of a user's sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if `user_id` is empty.
    pub fn append(&self, user_id: &str, message: ChatMessage) -> Result<(), StoreError> {
        if user_id.is_empty() {
            return Err(StoreError::EmptyUserId);
        }

        let mut entry = self.messages.entry(user_id.to_string()).or_default();
        entry.push(message);
        trace!(user = %user_id, count = entry.len(), "Appended message");
        Ok(())
    }

    /// Get the most recent messages for a user, oldest first.
    ///
    /// Unknown users have an empty history.
    #[must_use]
    pub fn history(&self, user_id: &str) -> Vec<ChatMessage> {
        self.messages
            .get(user_id)
            .map(|messages| {
                let start = messages.len().saturating_sub(self.history_limit);
                messages[start..].to_vec()
            })
            .unwrap_or_default()
    }

    /// Drop all stored messages for all users.
    pub fn reset(&self) {
        let users = self.messages.len();
        self.messages.clear();
        debug!(users, "Message store reset");
    }

    /// Number of users with stored messages.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.messages.len()
    }

    /// Total number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.iter().map(|entry| entry.len()).sum()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn msg(user: &str, text: &str) -> ChatMessage {
        ChatMessage::new(user, "user", text)
    }

    #[test]
    fn test_history_returns_most_recent_window_in_order() {
        let store = MessageStore::new();
        for i in 0..250 {
            store.append("alice", msg("alice", &i.to_string())).unwrap();
        }

        let history = store.history("alice");
        assert_eq!(history.len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(history.first().unwrap().text, "50");
        assert_eq!(history.last().unwrap().text, "249");

        let texts: Vec<usize> = history.iter().map(|m| m.text.parse().unwrap()).collect();
        assert!(texts.windows(2).all(|w| w[0] + 1 == w[1]));
    }

    #[test]
    fn test_history_short_sequence_is_complete() {
        let store = MessageStore::new();
        store.append("bob", msg("bob", "a")).unwrap();
        store.append("bob", msg("bob", "b")).unwrap();

        let texts: Vec<_> = store.history("bob").into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_user_has_empty_history() {
        let store = MessageStore::new();
        assert!(store.history("no-such-user").is_empty());
    }

    #[test]
    fn test_empty_user_id_rejected() {
        let store = MessageStore::new();
        assert_eq!(store.append("", msg("", "x")), Err(StoreError::EmptyUserId));
        assert_eq!(store.user_count(), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let store = MessageStore::with_history_limit(10);
        store.append("alice", msg("alice", "1")).unwrap();
        store.append("bob", msg("bob", "2")).unwrap();
        assert_eq!(store.message_count(), 2);

        store.reset();
        assert_eq!(store.user_count(), 0);
        assert!(store.history("alice").is_empty());

        store.append("alice", msg("alice", "3")).unwrap();
        assert_eq!(store.history("alice").len(), 1);
    }

    #[test]
    fn test_concurrent_appends_are_all_kept() {
        let store = Arc::new(MessageStore::with_history_limit(usize::MAX));
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store
                            .append("shared", msg("shared", &format!("{t}-{i}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let history = store.history("shared");
        assert_eq!(history.len(), 800);

        // Each writer's own messages stay in the order it appended them.
        for t in 0..8 {
            let prefix = format!("{t}-");
            let seq: Vec<usize> = history
                .iter()
                .filter_map(|m| m.text.strip_prefix(&prefix))
                .map(|i| i.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..100).collect::<Vec<_>>());
        }
    }
}
