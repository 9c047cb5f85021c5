//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the system at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use chrono::{DateTime, Utc};
use threadline_app::App;
use threadline_client::{Client, Environment};
use threadline_core::{Conversation, Message, MessageId, UserId};

/// Snapshot of the entire system state.
///
/// Contains observable state from one or more clients for invariant checking.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-client state snapshots.
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no clients).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot with a single client.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client] }
    }

    /// Create a snapshot from multiple clients.
    pub fn from_clients(clients: Vec<ClientSnapshot>) -> Self {
        Self { clients }
    }

    /// Add a client snapshot.
    pub fn add_client(&mut self, client: ClientSnapshot) {
        self.clients.push(client);
    }
}

/// Snapshot of a single client's observable state.
#[derive(Debug, Clone, Default)]
pub struct ClientSnapshot {
    /// Viewer user id.
    pub viewer: UserId,
    /// Conversation the message window belongs to.
    pub counterpart: Option<UserId>,
    /// Message window, in display order.
    pub messages: Vec<MessageSnapshot>,
    /// Conversation list.
    pub conversations: Vec<ConversationSnapshot>,
    /// Active conversation.
    pub active: Option<UserId>,
    /// Configured pin limit.
    pub pin_limit: usize,
}

impl ClientSnapshot {
    /// Create an empty snapshot for `viewer`.
    pub fn new(viewer: UserId) -> Self {
        Self { viewer, ..Default::default() }
    }

    /// Capture the sync engine's state.
    pub fn from_client<E: Environment>(client: &Client<E>) -> Self {
        Self {
            viewer: client.viewer(),
            counterpart: client.store().counterpart(),
            messages: client.store().snapshot().iter().map(MessageSnapshot::from).collect(),
            conversations: client.conversations().iter().map(ConversationSnapshot::from).collect(),
            active: client.active_conversation(),
            pin_limit: client.context().config.pin_limit,
        }
    }

    /// Capture what the application shows.
    ///
    /// The app does not know the viewer or the pin limit, so the caller
    /// provides them.
    pub fn from_app(app: &App, viewer: UserId, pin_limit: usize) -> Self {
        Self {
            viewer,
            counterpart: app.active(),
            messages: app.messages().iter().map(MessageSnapshot::from).collect(),
            conversations: app.conversations().iter().map(ConversationSnapshot::from).collect(),
            active: app.active(),
            pin_limit,
        }
    }

    /// Set the active conversation.
    #[must_use]
    pub fn with_active(mut self, active: Option<UserId>) -> Self {
        self.active = active;
        self.counterpart = active;
        self
    }

    /// Add a conversation.
    #[must_use]
    pub fn with_conversation(mut self, conversation: ConversationSnapshot) -> Self {
        self.conversations.push(conversation);
        self
    }

    /// Add a message to the window.
    #[must_use]
    pub fn with_message(mut self, message: MessageSnapshot) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the pin limit.
    #[must_use]
    pub fn with_pin_limit(mut self, limit: usize) -> Self {
        self.pin_limit = limit;
        self
    }
}

/// Snapshot of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSnapshot {
    /// Identity.
    pub id: MessageId,
    /// Sender.
    pub sender_id: UserId,
    /// Receiver.
    pub receiver_id: UserId,
    /// Ordering key.
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessageSnapshot {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            created_at: message.created_at,
        }
    }
}

/// Snapshot of one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversationSnapshot {
    /// Counterpart.
    pub user_id: UserId,
    /// Unread inbound messages.
    pub unread_count: u32,
    /// Pinned flag.
    pub is_pinned: bool,
    /// Favorite flag.
    pub is_favorite: bool,
    /// Presence.
    pub is_online: bool,
}

impl ConversationSnapshot {
    /// Conversation with `user_id` and default flags.
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, ..Default::default() }
    }
}

impl From<&Conversation> for ConversationSnapshot {
    fn from(conversation: &Conversation) -> Self {
        Self {
            user_id: conversation.user_id,
            unread_count: conversation.unread_count,
            is_pinned: conversation.is_pinned,
            is_favorite: conversation.is_favorite,
            is_online: conversation.is_online,
        }
    }
}
