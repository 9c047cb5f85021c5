//! Server-confirmed message payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flexible_bool;
use crate::{
    ServerId, UserId,
    errors::{ProtocolError, Result},
};

/// A message as the server renders it.
///
/// Only server-confirmed messages exist on the wire; pending optimistic
/// messages never leave the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Server-assigned identifier.
    pub id: ServerId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Counterpart the message was sent to.
    pub receiver_id: UserId,
    /// Text body. `None` for attachment-only messages.
    #[serde(default)]
    pub body: Option<String>,
    /// Attachment URL. `None` for text-only messages.
    #[serde(default)]
    pub attachment: Option<String>,
    /// Whether the receiver has read the message.
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_read: bool,
    /// Creation time assigned by the server.
    pub created_at: DateTime<Utc>,
    /// Last modification time. Missing on servers that never edit.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WireMessage {
    /// Decode a message from a JSON body.
    pub fn decode(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(ProtocolError::json("message"))
    }

    /// The participant that is not `viewer`.
    ///
    /// For a message the viewer sent this is the receiver, otherwise the
    /// sender.
    pub fn counterpart(&self, viewer: UserId) -> UserId {
        if self.sender_id == viewer { self.receiver_id } else { self.sender_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LARAVEL_STYLE: &[u8] = br#"{
        "id": 42,
        "sender_id": 7,
        "receiver_id": 9,
        "body": "hello",
        "attachment": null,
        "is_read": 0,
        "created_at": "2024-05-01T10:00:00.000000Z",
        "updated_at": "2024-05-01T10:00:00.000000Z"
    }"#;

    #[test]
    fn decodes_integer_flags_and_microsecond_timestamps() {
        let message = WireMessage::decode(LARAVEL_STYLE).unwrap();
        assert_eq!(message.id, 42);
        assert!(!message.is_read);
        assert_eq!(message.body.as_deref(), Some("hello"));
        assert_eq!(message.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn missing_optional_fields_default() {
        let message = WireMessage::decode(
            br#"{"id":1,"sender_id":1,"receiver_id":2,"created_at":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(message.body, None);
        assert_eq!(message.attachment, None);
        assert_eq!(message.updated_at, None);
        assert!(!message.is_read);
    }

    #[test]
    fn counterpart_is_the_other_participant() {
        let message = WireMessage::decode(LARAVEL_STYLE).unwrap();
        assert_eq!(message.counterpart(7), 9);
        assert_eq!(message.counterpart(9), 7);
    }
}
