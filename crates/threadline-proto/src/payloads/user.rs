//! User listing and presence payloads.

use serde::{Deserialize, Serialize};

use super::{WireMessage, flexible_bool};
use crate::{
    UserId,
    errors::{ProtocolError, Result},
};

/// One entry of the messenger's user listing.
///
/// The listing seeds the conversation list: it carries the profile snapshot
/// plus the server's view of unread, presence, pin and favorite state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUser {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Most recent message exchanged with this user.
    #[serde(default)]
    pub last_message: Option<WireMessage>,
    /// Messages from this user the viewer has not read.
    #[serde(default)]
    pub unread_count: u32,
    /// Presence flag at listing time.
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_online: bool,
    /// Whether the viewer pinned this conversation.
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_pinned: bool,
    /// Whether the viewer marked this conversation as favorite.
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_favorite: bool,
}

impl WireUser {
    /// Decode a user listing from a JSON body.
    ///
    /// Accepts either a bare array or an object with a `users` field.
    pub fn decode_listing(body: &[u8]) -> Result<Vec<Self>> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Listing {
            Bare(Vec<WireUser>),
            Wrapped { users: Vec<WireUser> },
        }

        let listing: Listing =
            serde_json::from_slice(body).map_err(ProtocolError::json("user listing"))?;
        Ok(match listing {
            Listing::Bare(users) | Listing::Wrapped { users } => users,
        })
    }
}

/// One entry of the online-user poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    /// User identifier.
    pub id: UserId,
    /// Presence flag.
    #[serde(deserialize_with = "flexible_bool")]
    pub is_online: bool,
}

impl OnlineUser {
    /// Decode the online-user set from a JSON body.
    pub fn decode_set(body: &[u8]) -> Result<Vec<Self>> {
        serde_json::from_slice(body).map_err(ProtocolError::json("online users"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_accepts_wrapped_and_bare_forms() {
        let bare = WireUser::decode_listing(br#"[{"id":1,"name":"Ada"}]"#).unwrap();
        let wrapped = WireUser::decode_listing(br#"{"users":[{"id":1,"name":"Ada"}]}"#).unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare[0].unread_count, 0);
        assert!(!bare[0].is_pinned);
    }

    #[test]
    fn online_set_decodes_integer_flags() {
        let set = OnlineUser::decode_set(br#"[{"id":3,"is_online":1},{"id":4,"is_online":false}]"#)
            .unwrap();
        assert_eq!(set, vec![OnlineUser { id: 3, is_online: true }, OnlineUser {
            id: 4,
            is_online: false
        }]);
    }
}
