//! Chat domain models shared between the hub and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

/// An authenticated owner of a connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier.
    pub user_id: String,
    /// Display name, unique among live connections.
    pub username: String,
}

impl Identity {
    /// Create an identity from its two parts.
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// A message as handed to the persistence collaborator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    /// Display name of the sender.
    pub sender: String,
    /// Recipient for direct messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Message body.
    pub content: String,
    /// Target room, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

impl MessageRequest {
    /// Build a request, treating empty recipient/room strings as absent.
    pub fn new(
        sender: impl Into<String>,
        content: impl Into<String>,
        recipient: Option<String>,
        room_id: Option<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: non_empty(recipient),
            content: content.into(),
            room_id: non_empty(room_id),
        }
    }
}

/// A message after the persistence collaborator accepted it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMessage {
    /// Store-assigned identifier.
    pub id: MessageId,
    /// Display name of the sender.
    pub sender: String,
    /// Recipient, empty for broadcast and room messages.
    #[serde(default)]
    pub recipient: String,
    /// Message body.
    pub content: String,
    /// When the message was persisted.
    pub timestamp: DateTime<Utc>,
    /// Room the message was posted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

impl PersistedMessage {
    /// Materialize a request with a fresh ID and the current time.
    pub fn from_request(request: &MessageRequest) -> Self {
        Self {
            id: MessageId::new(),
            sender: request.sender.clone(),
            recipient: request.recipient.clone().unwrap_or_default(),
            content: request.content.clone(),
            timestamp: Utc::now(),
            room_id: request.room_id.clone(),
        }
    }
}

/// Collapse `Some("")` into `None`.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
