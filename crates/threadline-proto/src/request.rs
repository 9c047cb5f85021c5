//! HTTP request contract.
//!
//! [`ApiRequest`] enumerates every call the client makes; [`ApiRequest::route`]
//! maps each to a method and path relative to the messenger base URL, and
//! [`ApiResponse::decode`] interprets the response body for a given
//! [`RequestKind`].

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    HistoryPage, OnlineUser, ServerId, ToggleState, UserId, WireMessage, WireUser,
    errors::{ProtocolError, Result},
};

/// File attached to a send, held in memory until uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    /// Original file name.
    pub file_name: String,
    /// File contents.
    pub content: Arc<[u8]>,
}

/// Calls the client makes against the application server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    /// Fetch the user listing that seeds the conversation list.
    ListConversations,
    /// Fetch one page of history with a counterpart.
    History {
        /// Counterpart of the conversation.
        user_id: UserId,
        /// 1-based page number, page 1 being the newest.
        page: u32,
        /// Messages per page.
        page_size: u32,
    },
    /// Send a message.
    Send {
        /// Counterpart receiving the message.
        receiver_id: UserId,
        /// Text body.
        body: Option<String>,
        /// Attachment to upload with the message.
        attachment: Option<AttachmentUpload>,
    },
    /// Replace the body of a sent message.
    Edit {
        /// Message to edit.
        message_id: ServerId,
        /// New body.
        body: String,
    },
    /// Delete a sent message.
    Delete {
        /// Message to delete.
        message_id: ServerId,
    },
    /// Mark all messages from a counterpart as read.
    MarkRead {
        /// Counterpart whose messages were read.
        user_id: UserId,
    },
    /// Presence heartbeat. Fire-and-forget.
    Heartbeat,
    /// Best-effort offline signal sent on teardown. Fire-and-forget.
    GoOffline,
    /// Fetch the online-user set.
    OnlineUsers,
    /// Flip the pin flag of a conversation.
    TogglePin {
        /// Counterpart of the conversation.
        user_id: UserId,
    },
    /// Flip the favorite flag of a conversation.
    ToggleFavorite {
        /// Counterpart of the conversation.
        user_id: UserId,
    },
}

/// Discriminant of [`ApiRequest`], used to decode responses and to target
/// failure injection in simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// [`ApiRequest::ListConversations`]
    ListConversations,
    /// [`ApiRequest::History`]
    History,
    /// [`ApiRequest::Send`]
    Send,
    /// [`ApiRequest::Edit`]
    Edit,
    /// [`ApiRequest::Delete`]
    Delete,
    /// [`ApiRequest::MarkRead`]
    MarkRead,
    /// [`ApiRequest::Heartbeat`]
    Heartbeat,
    /// [`ApiRequest::GoOffline`]
    GoOffline,
    /// [`ApiRequest::OnlineUsers`]
    OnlineUsers,
    /// [`ApiRequest::TogglePin`]
    TogglePin,
    /// [`ApiRequest::ToggleFavorite`]
    ToggleFavorite,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ListConversations => "list-conversations",
            Self::History => "history",
            Self::Send => "send",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::MarkRead => "mark-read",
            Self::Heartbeat => "heartbeat",
            Self::GoOffline => "go-offline",
            Self::OnlineUsers => "online-users",
            Self::TogglePin => "toggle-pin",
            Self::ToggleFavorite => "toggle-favorite",
        };
        f.write_str(name)
    }
}

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

/// Method and path of a request, relative to the messenger base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// HTTP method.
    pub method: Method,
    /// Path, including the query string for GET requests.
    pub path: String,
}

impl Route {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into() }
    }
}

/// JSON body of [`ApiRequest::Edit`].
#[derive(Debug, Serialize)]
pub struct EditBody<'a> {
    /// New body.
    pub body: &'a str,
}

impl ApiRequest {
    /// Discriminant of this request.
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::ListConversations => RequestKind::ListConversations,
            Self::History { .. } => RequestKind::History,
            Self::Send { .. } => RequestKind::Send,
            Self::Edit { .. } => RequestKind::Edit,
            Self::Delete { .. } => RequestKind::Delete,
            Self::MarkRead { .. } => RequestKind::MarkRead,
            Self::Heartbeat => RequestKind::Heartbeat,
            Self::GoOffline => RequestKind::GoOffline,
            Self::OnlineUsers => RequestKind::OnlineUsers,
            Self::TogglePin { .. } => RequestKind::TogglePin,
            Self::ToggleFavorite { .. } => RequestKind::ToggleFavorite,
        }
    }

    /// Method and path for this request.
    pub fn route(&self) -> Route {
        match self {
            Self::ListConversations => Route::new(Method::Get, "/messenger/users"),
            Self::History { user_id, page, page_size } => Route::new(
                Method::Get,
                format!("/messenger/messages/{user_id}?page={page}&per_page={page_size}"),
            ),
            Self::Send { .. } => Route::new(Method::Post, "/messenger/send"),
            Self::Edit { message_id, .. } => {
                Route::new(Method::Put, format!("/messenger/messages/{message_id}"))
            },
            Self::Delete { message_id } => {
                Route::new(Method::Delete, format!("/messenger/messages/{message_id}"))
            },
            Self::MarkRead { user_id } => {
                Route::new(Method::Post, format!("/messenger/read/{user_id}"))
            },
            Self::Heartbeat => Route::new(Method::Post, "/messenger/heartbeat"),
            Self::GoOffline => Route::new(Method::Post, "/messenger/offline"),
            Self::OnlineUsers => Route::new(Method::Get, "/messenger/online-users"),
            Self::TogglePin { user_id } => {
                Route::new(Method::Post, format!("/messenger/pin/{user_id}"))
            },
            Self::ToggleFavorite { user_id } => {
                Route::new(Method::Post, format!("/messenger/favorite/{user_id}"))
            },
        }
    }

    /// Whether the caller expects no meaningful response.
    pub fn is_fire_and_forget(&self) -> bool {
        matches!(self, Self::Heartbeat | Self::GoOffline)
    }
}

/// Decoded response of an [`ApiRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    /// User listing.
    Conversations(Vec<WireUser>),
    /// One page of history.
    History(HistoryPage),
    /// Send accepted. Carries the canonical message when the server returns
    /// it.
    Sent(Option<WireMessage>),
    /// Edit accepted. Carries the canonical message when the server returns
    /// it.
    Edited(Option<WireMessage>),
    /// Request accepted with no body of interest.
    Ack,
    /// Online-user set.
    OnlineUsers(Vec<OnlineUser>),
    /// Flag state after a pin or favorite toggle.
    Toggled(ToggleState),
}

#[derive(Deserialize)]
struct MessageEnvelope {
    #[serde(default)]
    message: Option<WireMessage>,
}

impl ApiResponse {
    /// Decode a successful response body for a request of `kind`.
    pub fn decode(kind: RequestKind, body: &[u8]) -> Result<Self> {
        let trimmed = body.trim_ascii();

        match kind {
            RequestKind::ListConversations => {
                WireUser::decode_listing(trimmed).map(Self::Conversations)
            },
            RequestKind::History => HistoryPage::decode(trimmed).map(Self::History),
            RequestKind::Send => decode_optional_message(trimmed, "send").map(Self::Sent),
            RequestKind::Edit => decode_optional_message(trimmed, "edit").map(Self::Edited),
            RequestKind::Delete
            | RequestKind::MarkRead
            | RequestKind::Heartbeat
            | RequestKind::GoOffline => Ok(Self::Ack),
            RequestKind::OnlineUsers => OnlineUser::decode_set(trimmed).map(Self::OnlineUsers),
            RequestKind::TogglePin | RequestKind::ToggleFavorite => serde_json::from_slice(trimmed)
                .map(Self::Toggled)
                .map_err(ProtocolError::json("toggle")),
        }
    }
}

fn decode_optional_message(body: &[u8], context: &'static str) -> Result<Option<WireMessage>> {
    if body.is_empty() {
        return Ok(None);
    }

    let envelope: MessageEnvelope =
        serde_json::from_slice(body).map_err(ProtocolError::json(context))?;
    Ok(envelope.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_route_carries_paging() {
        let route = ApiRequest::History { user_id: 4, page: 2, page_size: 20 }.route();
        assert_eq!(route.method, Method::Get);
        assert_eq!(route.path, "/messenger/messages/4?page=2&per_page=20");
    }

    #[test]
    fn heartbeat_and_offline_are_fire_and_forget() {
        assert!(ApiRequest::Heartbeat.is_fire_and_forget());
        assert!(ApiRequest::GoOffline.is_fire_and_forget());
        assert!(!ApiRequest::OnlineUsers.is_fire_and_forget());
    }

    #[test]
    fn empty_send_body_means_no_canonical_message() {
        assert_eq!(ApiResponse::decode(RequestKind::Send, b"").unwrap(), ApiResponse::Sent(None));
        assert_eq!(
            ApiResponse::decode(RequestKind::Send, br#"{"success":true}"#).unwrap(),
            ApiResponse::Sent(None)
        );
    }

    #[test]
    fn send_body_with_message_is_canonical() {
        let body = br#"{"message":{"id":5,"sender_id":1,"receiver_id":2,"body":"hi",
            "created_at":"2024-05-01T10:00:00Z"}}"#;
        let ApiResponse::Sent(Some(message)) = ApiResponse::decode(RequestKind::Send, body).unwrap()
        else {
            panic!("expected canonical message");
        };
        assert_eq!(message.id, 5);
    }

    #[test]
    fn ack_kinds_ignore_body() {
        assert_eq!(
            ApiResponse::decode(RequestKind::Heartbeat, b"not json").unwrap(),
            ApiResponse::Ack
        );
    }

    #[test]
    fn kind_matches_route_family() {
        let request = ApiRequest::TogglePin { user_id: 9 };
        assert_eq!(request.kind(), RequestKind::TogglePin);
        assert_eq!(request.kind().to_string(), "toggle-pin");
        assert_eq!(request.route().path, "/messenger/pin/9");
    }
}
