//! Chat message type.

use crate::clock;
use serde::{Deserialize, Serialize};

/// A stored chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: String,
    /// Creation time (RFC 3339, UTC).
    #[serde(rename = "ts")]
    pub timestamp: String,
    /// Owning user.
    pub user_id: String,
    /// Author role, `"user"` unless stated otherwise.
    pub role: String,
    /// Message body.
    pub text: String,
}

impl ChatMessage {
    /// Create a message stamped with a fresh ID and the current time.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        role: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: clock::new_message_id(),
            timestamp: clock::utc_now(),
            user_id: user_id.into(),
            role: role.into(),
            text: text.into(),
        }
    }
}
