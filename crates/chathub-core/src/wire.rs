//! JSON wire protocol between clients and the hub.
//!
//! Every frame carries one JSON object discriminated by `type`.
//!
//! Client → hub:
//! - `{"type":"message","content":…,"recipient"?:…,"room_id"?:…}`
//! - `{"type":"ping"}`
//!
//! Hub → client: see [`OutboundEvent`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::WireError;
use crate::models::{Identity, PersistedMessage, non_empty};

/// A decoded client frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    /// A chat message to persist and fan out.
    Message {
        /// Message body.
        content: String,
        /// Display name of a direct-message recipient.
        recipient: Option<String>,
        /// Target room.
        room_id: Option<String>,
    },
    /// Client-initiated liveness probe.
    Ping,
}

#[derive(Deserialize)]
struct RawInbound {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
}

impl InboundEvent {
    /// Decode one text frame.
    ///
    /// Newlines inside the frame are folded into spaces and surrounding
    /// whitespace is trimmed before parsing. Empty `recipient`/`room_id`
    /// strings are treated as absent.
    pub fn decode(frame: &str) -> Result<Self, WireError> {
        let normalized = frame.replace('\n', " ");
        let raw: RawInbound = serde_json::from_str(normalized.trim())?;
        match raw.kind.as_str() {
            "message" => Ok(Self::Message {
                content: raw.content,
                recipient: non_empty(raw.recipient),
                room_id: non_empty(raw.room_id),
            }),
            "ping" => Ok(Self::Ping),
            _ => Err(WireError::UnknownType(raw.kind)),
        }
    }
}

/// An event sent from the hub to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Registration confirmation, sent once per connection.
    Connection {
        /// Always `"connected"`.
        status: String,
        /// Stable ID of the connection owner.
        user_id: String,
        /// Display name of the connection owner.
        username: String,
    },
    /// Global or room message.
    Message {
        /// The persisted message.
        message: PersistedMessage,
    },
    /// User-targeted message (also used for the sender's echo).
    DirectMessage {
        /// The persisted message.
        message: PersistedMessage,
    },
    /// Reply to a client `ping`.
    Pong {
        /// Always `"ok"`.
        status: String,
    },
    /// A failed operation, reported only to the originating connection.
    Error {
        /// Human-readable reason.
        error: String,
    },
}

impl OutboundEvent {
    /// Registration confirmation for `identity`.
    pub fn connected(identity: &Identity) -> Self {
        Self::Connection {
            status: "connected".into(),
            user_id: identity.user_id.clone(),
            username: identity.username.clone(),
        }
    }

    /// Liveness reply.
    pub fn pong() -> Self {
        Self::Pong {
            status: "ok".into(),
        }
    }

    /// Error report.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            error: reason.into(),
        }
    }

    /// Wire `type` discriminator, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Message { .. } => "message",
            Self::DirectMessage { .. } => "direct_message",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Where an outbound event is delivered.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeliveryTarget {
    /// Every registered connection.
    All,
    /// The connection owned by a user ID.
    User(String),
    /// The connection owned by a display name.
    Name(String),
    /// Members of a room.
    Room(String),
}

impl fmt::Display for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::User(id) => write!(f, "user:{id}"),
            Self::Name(name) => write!(f, "name:{name}"),
            Self::Room(id) => write!(f, "room:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRequest;
    use serde_json::Value;

    #[test]
    fn decode_broadcast_message() {
        let event = InboundEvent::decode(r#"{"type":"message","content":"hi"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Message {
                content: "hi".into(),
                recipient: None,
                room_id: None,
            }
        );
    }

    #[test]
    fn decode_direct_message() {
        let event =
            InboundEvent::decode(r#"{"type":"message","content":"hi","recipient":"bob"}"#).unwrap();
        let InboundEvent::Message { recipient, .. } = event else {
            panic!("expected message");
        };
        assert_eq!(recipient.as_deref(), Some("bob"));
    }

    #[test]
    fn decode_room_message() {
        let event =
            InboundEvent::decode(r#"{"type":"message","content":"x","room_id":"r1"}"#).unwrap();
        let InboundEvent::Message { room_id, .. } = event else {
            panic!("expected message");
        };
        assert_eq!(room_id.as_deref(), Some("r1"));
    }

    #[test]
    fn decode_empty_addressing_is_absent() {
        let event = InboundEvent::decode(
            r#"{"type":"message","content":"x","recipient":"","room_id":""}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::Message {
                content: "x".into(),
                recipient: None,
                room_id: None,
            }
        );
    }

    #[test]
    fn decode_ping() {
        assert_eq!(InboundEvent::decode(r#"{"type":"ping"}"#).unwrap(), InboundEvent::Ping);
    }

    #[test]
    fn decode_folds_newlines_and_trims() {
        let frame = "  {\"type\":\n\"ping\"}\n";
        assert_eq!(InboundEvent::decode(frame).unwrap(), InboundEvent::Ping);
    }

    #[test]
    fn decode_unknown_type() {
        let err = InboundEvent::decode(r#"{"type":"typing"}"#).unwrap_err();
        assert!(matches!(err, WireError::UnknownType(ref t) if t == "typing"));
    }

    #[test]
    fn decode_malformed() {
        assert!(matches!(
            InboundEvent::decode("not json").unwrap_err(),
            WireError::Malformed(_)
        ));
        assert!(matches!(
            InboundEvent::decode(r#"{"content":"no type"}"#).unwrap_err(),
            WireError::Malformed(_)
        ));
    }

    #[test]
    fn connected_event_shape() {
        let json = OutboundEvent::connected(&Identity::new("u1", "alice"))
            .to_json()
            .unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "connection");
        assert_eq!(v["status"], "connected");
        assert_eq!(v["user_id"], "u1");
        assert_eq!(v["username"], "alice");
    }

    #[test]
    fn message_and_direct_message_shapes() {
        let msg = PersistedMessage::from_request(&MessageRequest::new("a", "hello", None, None));
        let v: Value =
            serde_json::from_str(&OutboundEvent::Message { message: msg.clone() }.to_json().unwrap())
                .unwrap();
        assert_eq!(v["type"], "message");
        assert_eq!(v["message"]["content"], "hello");

        let v: Value =
            serde_json::from_str(&OutboundEvent::DirectMessage { message: msg }.to_json().unwrap())
                .unwrap();
        assert_eq!(v["type"], "direct_message");
        assert_eq!(v["message"]["sender"], "a");
    }

    #[test]
    fn pong_and_error_shapes() {
        assert_eq!(
            OutboundEvent::pong().to_json().unwrap(),
            r#"{"type":"pong","status":"ok"}"#
        );
        assert_eq!(
            OutboundEvent::error("Failed to save message").to_json().unwrap(),
            r#"{"type":"error","error":"Failed to save message"}"#
        );
    }

    #[test]
    fn kind_matches_wire_type() {
        for event in [
            OutboundEvent::pong(),
            OutboundEvent::error("x"),
            OutboundEvent::connected(&Identity::new("u", "n")),
        ] {
            let v: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
            assert_eq!(v["type"], event.kind());
        }
    }

    #[test]
    fn delivery_target_display() {
        assert_eq!(DeliveryTarget::All.to_string(), "all");
        assert_eq!(DeliveryTarget::User("u1".into()).to_string(), "user:u1");
        assert_eq!(DeliveryTarget::Name("bob".into()).to_string(), "name:bob");
        assert_eq!(DeliveryTarget::Room("r".into()).to_string(), "room:r");
    }
}
