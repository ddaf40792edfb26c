//! Frame types for the hubbub protocol.
//!
//! Inbound frames are parsed leniently: a payload that is not a JSON object is
//! never rejected, it is folded into an explicit fallback variant so the
//! connection loop can always match exhaustively.

use crate::codec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A frame received on the chat socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Liveness probe, answered with a `pong`.
    Ping,

    /// A chat message to echo and fan out to the user's channels.
    Message {
        /// The client's `data` field, if present.
        data: Option<Value>,
    },

    /// Text that was not a JSON object.
    Text(String),

    /// Any other object frame, kept verbatim.
    Other(Map<String, Value>),
}

impl ClientFrame {
    /// Parse a raw text frame.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut object = match codec::decode::<Value>(raw) {
            Ok(Value::Object(object)) => object,
            _ => return ClientFrame::Text(raw.to_string()),
        };

        match object.get("type").and_then(Value::as_str) {
            Some("ping") => ClientFrame::Ping,
            Some("message") => ClientFrame::Message {
                data: object.remove("data"),
            },
            _ => ClientFrame::Other(object),
        }
    }

    /// Get the frame's `type` discriminator.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            ClientFrame::Ping => "ping",
            ClientFrame::Message { .. } => "message",
            ClientFrame::Text(_) => "text",
            ClientFrame::Other(object) => object
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }

    /// Convert the frame back into its object form.
    ///
    /// Plain text becomes `{"type": "text", "data": {"text": <raw>}}`.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            ClientFrame::Ping => serde_json::json!({ "type": "ping" }),
            ClientFrame::Message { data } => serde_json::json!({
                "type": "message",
                "data": data.unwrap_or(Value::Null),
            }),
            ClientFrame::Text(text) => serde_json::json!({
                "type": "text",
                "data": { "text": text },
            }),
            ClientFrame::Other(object) => Value::Object(object),
        }
    }
}

/// A frame received on the signaling socket.
///
/// Signaling payloads are opaque: `offer`, `answer` and `ice-candidate` are
/// relayed without interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalFrame {
    /// A JSON object, relayed as-is.
    Object(Map<String, Value>),
    /// Anything else, wrapped as `{"type": "raw", "data": <raw>}`.
    Raw(String),
}

impl SignalFrame {
    /// Parse a raw text frame.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match codec::decode::<Value>(raw) {
            Ok(Value::Object(object)) => SignalFrame::Object(object),
            _ => SignalFrame::Raw(raw.to_string()),
        }
    }

    /// Produce the relayed object, adding `ts` only when the sender left it out.
    #[must_use]
    pub fn stamped(self, ts: &str) -> Map<String, Value> {
        let mut object = match self {
            SignalFrame::Object(object) => object,
            SignalFrame::Raw(raw) => {
                let mut object = Map::new();
                object.insert("type".to_string(), Value::String("raw".to_string()));
                object.insert("data".to_string(), Value::String(raw));
                object
            }
        };
        object
            .entry("ts")
            .or_insert_with(|| Value::String(ts.to_string()));
        object
    }
}

/// Payload of the `ws_hello` greeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsHello {
    pub ts: String,
    pub user_id: String,
}

/// Payload of the `sse_hello` greeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseHello {
    pub ts: String,
    pub note: String,
}

/// A frame originated by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame on a chat socket.
    WsHello { data: WsHello },

    /// First event on a push stream.
    SseHello { data: SseHello },

    /// First frame on a signaling socket.
    SignalHello { room: String, ts: String },

    /// Reply to a `ping`.
    Pong { ts: String },

    /// Direct reply to the sender of a `message`.
    Echo { data: Value },

    /// A chat message fanned out to every channel of a user.
    Message { data: Value },

    /// Acknowledgment of any frame the server does not act on.
    Ack { data: Value, ts: String },
}

impl ServerFrame {
    /// Create a `ws_hello` frame.
    #[must_use]
    pub fn ws_hello(user_id: impl Into<String>, ts: impl Into<String>) -> Self {
        ServerFrame::WsHello {
            data: WsHello {
                ts: ts.into(),
                user_id: user_id.into(),
            },
        }
    }

    /// Create an `sse_hello` frame.
    #[must_use]
    pub fn sse_hello(ts: impl Into<String>) -> Self {
        ServerFrame::SseHello {
            data: SseHello {
                ts: ts.into(),
                note: "connected".to_string(),
            },
        }
    }

    /// Create a `signal_hello` frame.
    #[must_use]
    pub fn signal_hello(room: impl Into<String>, ts: impl Into<String>) -> Self {
        ServerFrame::SignalHello {
            room: room.into(),
            ts: ts.into(),
        }
    }

    /// Create a `pong` frame.
    #[must_use]
    pub fn pong(ts: impl Into<String>) -> Self {
        ServerFrame::Pong { ts: ts.into() }
    }

    /// Create an `echo` frame.
    #[must_use]
    pub fn echo(data: Option<Value>) -> Self {
        ServerFrame::Echo {
            data: data.unwrap_or(Value::Null),
        }
    }

    /// Create a `message` frame.
    #[must_use]
    pub fn message(data: Value) -> Self {
        ServerFrame::Message { data }
    }

    /// Create an `ack` frame.
    #[must_use]
    pub fn ack(data: Value, ts: impl Into<String>) -> Self {
        ServerFrame::Ack {
            data,
            ts: ts.into(),
        }
    }

    /// Get the frame's `type` discriminator.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::WsHello { .. } => "ws_hello",
            ServerFrame::SseHello { .. } => "sse_hello",
            ServerFrame::SignalHello { .. } => "signal_hello",
            ServerFrame::Pong { .. } => "pong",
            ServerFrame::Echo { .. } => "echo",
            ServerFrame::Message { .. } => "message",
            ServerFrame::Ack { .. } => "ack",
        }
    }
}

/// Build the data of a broadcast chat message from the client's `data`.
///
/// Object fields are kept and `echoed`/`ts` are set on top. A missing or null
/// `data` starts from an empty object; any other value lands under `value`.
#[must_use]
pub fn merge_echoed(data: Option<Value>, ts: &str) -> Value {
    let mut object = match data {
        Some(Value::Object(object)) => object,
        None | Some(Value::Null) => Map::new(),
        Some(other) => {
            let mut object = Map::new();
            object.insert("value".to_string(), other);
            object
        }
    };
    object.insert("echoed".to_string(), Value::Bool(true));
    object.insert("ts".to_string(), Value::String(ts.to_string()));
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TS: &str = "2024-05-01T10:00:00.000000+00:00";

    #[test]
    fn test_parse_ping_and_message() {
        assert_eq!(ClientFrame::parse(r#"{"type":"ping"}"#), ClientFrame::Ping);

        let frame = ClientFrame::parse(r#"{"type":"message","data":{"text":"hi"}}"#);
        assert_eq!(
            frame,
            ClientFrame::Message {
                data: Some(json!({"text": "hi"}))
            }
        );
        assert_eq!(frame.kind(), "message");
    }

    #[test]
    fn test_parse_malformed_becomes_text() {
        let frame = ClientFrame::parse("hello there");
        assert_eq!(frame, ClientFrame::Text("hello there".to_string()));
        assert_eq!(
            frame.into_value(),
            json!({"type": "text", "data": {"text": "hello there"}})
        );

        // Valid JSON that is not an object is still not a frame.
        assert_eq!(ClientFrame::parse("[1,2]"), ClientFrame::Text("[1,2]".into()));
    }

    #[test]
    fn test_parse_unknown_type_kept_verbatim() {
        let frame = ClientFrame::parse(r#"{"type":"typing","who":"bob"}"#);
        assert_eq!(frame.kind(), "typing");
        assert_eq!(frame.into_value(), json!({"type": "typing", "who": "bob"}));

        let untyped = ClientFrame::parse(r#"{"type":7}"#);
        assert!(matches!(untyped, ClientFrame::Other(_)));
        assert_eq!(untyped.kind(), "unknown");
    }

    #[test]
    fn test_signal_stamp_preserves_existing_ts() {
        let frame = SignalFrame::parse(r#"{"type":"offer","sdp":"x","ts":"old"}"#);
        let stamped = frame.stamped(TS);
        assert_eq!(stamped["ts"], "old");
        assert_eq!(stamped["sdp"], "x");

        let stamped = SignalFrame::parse(r#"{"type":"answer"}"#).stamped(TS);
        assert_eq!(stamped["ts"], TS);
    }

    #[test]
    fn test_signal_raw_wrapping() {
        let stamped = SignalFrame::parse("not json").stamped(TS);
        assert_eq!(
            Value::Object(stamped),
            json!({"type": "raw", "data": "not json", "ts": TS})
        );
    }

    #[test]
    fn test_server_frame_shapes() {
        let hello = serde_json::to_value(ServerFrame::ws_hello("alice", TS)).unwrap();
        assert_eq!(
            hello,
            json!({"type": "ws_hello", "data": {"ts": TS, "user_id": "alice"}})
        );

        let signal = serde_json::to_value(ServerFrame::signal_hello("r1", TS)).unwrap();
        assert_eq!(signal, json!({"type": "signal_hello", "room": "r1", "ts": TS}));

        let echo = serde_json::to_value(ServerFrame::echo(None)).unwrap();
        assert_eq!(echo, json!({"type": "echo", "data": null}));

        assert_eq!(ServerFrame::sse_hello(TS).kind(), "sse_hello");
    }

    #[test]
    fn test_merge_echoed() {
        let merged = merge_echoed(Some(json!({"text": "hi", "echoed": false})), TS);
        assert_eq!(merged, json!({"text": "hi", "echoed": true, "ts": TS}));

        assert_eq!(merge_echoed(None, TS), json!({"echoed": true, "ts": TS}));
        assert_eq!(
            merge_echoed(Some(json!("plain")), TS),
            json!({"value": "plain", "echoed": true, "ts": TS})
        );
    }
}
