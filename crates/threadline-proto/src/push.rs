//! Realtime push events and channel naming.
//!
//! The application server broadcasts two kinds of events:
//!
//! - `MessageSent` on the private channel of each participant
//! - `UserOnline` / `UserOffline` on the shared presence channel
//!
//! Broadcasters often publish events under their fully-qualified class name
//! (`App\Events\MessageSent`) or with a leading dot (`.MessageSent`); decoding
//! only looks at the last path segment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    UserId, WireMessage,
    errors::{ProtocolError, Result},
};

const PRIVATE_PREFIX: &str = "private-messenger.";
const PRESENCE_CHANNEL: &str = "online-users";

/// A channel the client subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Per-user private channel delivering `MessageSent`.
    Private {
        /// Owner of the channel.
        user_id: UserId,
    },
    /// Shared channel delivering presence changes.
    Presence,
}

impl Channel {
    /// Channel name as used by the broadcaster.
    pub fn name(&self) -> String {
        match self {
            Self::Private { user_id } => format!("{PRIVATE_PREFIX}{user_id}"),
            Self::Presence => PRESENCE_CHANNEL.to_string(),
        }
    }

    /// Parse a broadcaster channel name.
    pub fn parse(name: &str) -> Result<Self> {
        if name == PRESENCE_CHANNEL {
            return Ok(Self::Presence);
        }

        name.strip_prefix(PRIVATE_PREFIX)
            .and_then(|id| id.parse().ok())
            .map(|user_id| Self::Private { user_id })
            .ok_or_else(|| ProtocolError::UnknownChannel(name.to_string()))
    }

    /// Whether subscribing requires an authorization round-trip.
    pub fn requires_auth(&self) -> bool {
        matches!(self, Self::Private { .. })
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// An event delivered over a realtime channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A message was committed by the server.
    MessageSent {
        /// The committed message.
        message: WireMessage,
    },
    /// A user came online.
    UserOnline {
        /// User whose presence changed.
        user_id: UserId,
    },
    /// A user went offline.
    UserOffline {
        /// User whose presence changed.
        user_id: UserId,
    },
}

#[derive(Serialize, Deserialize)]
struct MessageSentData {
    message: WireMessage,
}

#[derive(Serialize, Deserialize)]
struct PresenceData {
    #[serde(alias = "id")]
    user_id: UserId,
}

impl PushEvent {
    /// Event name for committed messages.
    pub const MESSAGE_SENT: &'static str = "MessageSent";
    /// Event name for users coming online.
    pub const USER_ONLINE: &'static str = "UserOnline";
    /// Event name for users going offline.
    pub const USER_OFFLINE: &'static str = "UserOffline";

    /// Event name as broadcast.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageSent { .. } => Self::MESSAGE_SENT,
            Self::UserOnline { .. } => Self::USER_ONLINE,
            Self::UserOffline { .. } => Self::USER_OFFLINE,
        }
    }

    /// Channel this event is delivered on, from the point of view of
    /// `recipient`.
    pub fn channel_for(&self, recipient: UserId) -> Channel {
        match self {
            Self::MessageSent { .. } => Channel::Private { user_id: recipient },
            Self::UserOnline { .. } | Self::UserOffline { .. } => Channel::Presence,
        }
    }

    /// Decode an event from its broadcast name and JSON data.
    ///
    /// Returns `Ok(None)` for events the messenger does not consume so the
    /// caller can ignore broadcaster housekeeping events.
    pub fn decode(event: &str, data: &[u8]) -> Result<Option<Self>> {
        let short = event.rsplit(['\\', '.']).next().unwrap_or(event);

        let decoded = match short {
            Self::MESSAGE_SENT => {
                let data: MessageSentData =
                    serde_json::from_slice(data).map_err(ProtocolError::json("MessageSent"))?;
                Self::MessageSent { message: data.message }
            },
            Self::USER_ONLINE => {
                let data: PresenceData =
                    serde_json::from_slice(data).map_err(ProtocolError::json("UserOnline"))?;
                Self::UserOnline { user_id: data.user_id }
            },
            Self::USER_OFFLINE => {
                let data: PresenceData =
                    serde_json::from_slice(data).map_err(ProtocolError::json("UserOffline"))?;
                Self::UserOffline { user_id: data.user_id }
            },
            _ => return Ok(None),
        };

        Ok(Some(decoded))
    }

    /// Decode an event and check it arrived on a channel that carries it.
    pub fn decode_on(channel: &str, event: &str, data: &[u8]) -> Result<Option<Self>> {
        let parsed = Channel::parse(channel)?;
        let Some(decoded) = Self::decode(event, data)? else {
            return Ok(None);
        };

        let expected_presence = !matches!(decoded, Self::MessageSent { .. });
        if expected_presence != matches!(parsed, Channel::Presence) {
            return Err(ProtocolError::UnexpectedEvent {
                event: event.to_string(),
                channel: channel.to_string(),
            });
        }

        Ok(Some(decoded))
    }

    /// Encode the event data as JSON.
    pub fn encode_data(&self) -> Result<Vec<u8>> {
        let encoded = match self {
            Self::MessageSent { message } => {
                serde_json::to_vec(&MessageSentData { message: message.clone() })
            },
            Self::UserOnline { user_id } | Self::UserOffline { user_id } => {
                serde_json::to_vec(&PresenceData { user_id: *user_id })
            },
        };
        encoded.map_err(ProtocolError::json("push event"))
    }
}
