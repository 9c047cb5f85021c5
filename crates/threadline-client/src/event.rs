//! Client events and actions.

use std::fmt;

use threadline_core::{Draft, MessageId, UserId};
use threadline_proto::{ApiRequest, ApiResponse, Channel, PushEvent};

use crate::TransportError;

/// Identifier the client assigns to every request it asks the caller to
/// execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Executing requests and reporting their completion
/// - Forwarding push events
/// - Driving time forward via ticks
/// - Forwarding user intents (open conversation, send, pin, ...)
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulation environments.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// Viewer identity is known; load the listing, start presence and
    /// subscribe to realtime.
    Start {
        /// Current time from the environment.
        now: I,
    },

    /// Time tick for heartbeat and poll cadence.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// User interacted with the interface.
    Activity {
        /// Current time from the environment.
        now: I,
    },

    /// Reload the conversation listing.
    RefreshConversations,

    /// Make a conversation active and load its newest history page.
    OpenConversation {
        /// Counterpart.
        user_id: UserId,
    },

    /// Leave the active conversation.
    CloseConversation,

    /// Viewport moved; may trigger loading older history.
    Scrolled {
        /// Rows between the viewport's top edge and the oldest loaded message.
        rows_from_top: usize,
    },

    /// Load the next older history page unconditionally.
    LoadOlder,

    /// Send a message in the active conversation.
    Send {
        /// Composed content.
        draft: Draft,
    },

    /// Replace the body of one of the viewer's messages.
    Edit {
        /// Message to edit.
        id: MessageId,
        /// New body.
        body: String,
    },

    /// Delete one of the viewer's messages.
    Delete {
        /// Message to delete.
        id: MessageId,
    },

    /// Flip the pin flag of a conversation.
    TogglePin {
        /// Counterpart.
        user_id: UserId,
    },

    /// Flip the favorite flag of a conversation.
    ToggleFavorite {
        /// Counterpart.
        user_id: UserId,
    },

    /// Push event received on a subscribed channel.
    Push(PushEvent),

    /// Realtime could not be established or was lost.
    PushUnavailable {
        /// Failure description.
        reason: String,
    },

    /// A request completed.
    Response {
        /// Request the response belongs to.
        request_id: RequestId,
        /// Decoded body or failure.
        result: Result<ApiResponse, TransportError>,
    },

    /// Session is ending; send the offline beacon and unsubscribe.
    Teardown,
}

/// Category of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Send was rejected and rolled back.
    SendFailed,
    /// Edit was rejected and rolled back.
    EditFailed,
    /// Delete was rejected and rolled back.
    DeleteFailed,
    /// Pinning was refused locally because of the pin limit.
    PinLimitReached,
    /// Pin toggle was rejected and rolled back.
    PinFailed,
    /// History page could not be loaded.
    HistoryFailed,
    /// Conversation listing could not be loaded.
    ListingFailed,
}

/// Non-fatal, user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Category.
    pub kind: NoticeKind,
    /// Human-readable text.
    pub message: String,
}

impl Notice {
    /// Build a notice.
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Execute a request and report the result as
    /// [`ClientEvent::Response`] with the same id.
    Request {
        /// Id to report the result under.
        request_id: RequestId,
        /// Request to execute.
        request: ApiRequest,
    },

    /// Execute a fire-and-forget request; no response is expected.
    Beacon(ApiRequest),

    /// Subscribe to push channels.
    Subscribe(Vec<Channel>),

    /// Unsubscribe from push channels.
    Unsubscribe(Vec<Channel>),

    /// The open conversation's message window changed.
    MessagesChanged,

    /// The conversation list changed.
    ConversationsChanged,

    /// Older history was prepended; the caller keeps its scroll anchor.
    HistoryPrepended {
        /// Conversation the rows were added to.
        user_id: UserId,
        /// Number of messages added.
        added: usize,
    },

    /// Position the viewport at the newest message.
    ScrollToLatest,

    /// Show a non-fatal notice.
    Notice(Notice),
}
