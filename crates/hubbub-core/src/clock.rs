//! Timestamps and identifiers.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

/// Current UTC time as RFC 3339 with microseconds, e.g.
/// `2024-05-01T10:00:00.123456+00:00`.
#[must_use]
pub fn utc_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Generate a unique message ID.
#[must_use]
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_utc_now_is_rfc3339_utc() {
        let ts = utc_now();
        assert!(ts.ends_with("+00:00"));
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_unique_message_ids() {
        let id1 = new_message_id();
        let id2 = new_message_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36);
    }
}
