//! Application input events.
//!
//! This module defines [`AppEvent`], the set of inputs that drive the
//! [`crate::App`] state machine.
//!
//! Events originate from two distinct sources:
//! - User interactions (keyboard, resize) and system ticks.
//! - Sync notifications translated from the client by the bridge.

use threadline_client::{Notice, RealtimeStatus};
use threadline_core::{Conversation, Message, UserId};

use crate::KeyInput;

/// Events processed by the App state machine.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Keyboard input.
    Key(KeyInput),

    /// Periodic tick.
    Tick,

    /// Terminal resize (columns, rows).
    Resize(u16, u16),

    /// Session started for the viewer.
    Started {
        /// Viewer user id.
        viewer: UserId,
    },

    /// Session ended.
    Stopped,

    /// Conversation list changed.
    ConversationsUpdated {
        /// Conversations in listing order.
        conversations: Vec<Conversation>,
        /// Open conversation.
        active: Option<UserId>,
    },

    /// Message window changed.
    MessagesUpdated {
        /// Conversation the window belongs to.
        user_id: Option<UserId>,
        /// Messages, oldest first.
        messages: Vec<Message>,
        /// Older history was prepended; keep the viewport on the same rows.
        keep_anchor: bool,
    },

    /// Position the viewport at the newest message.
    ScrollToLatest,

    /// Realtime subscription state changed.
    RealtimeChanged(RealtimeStatus),

    /// Non-fatal notice from the sync engine.
    Notice(Notice),

    /// A user intent was rejected.
    Error {
        /// Error description.
        message: String,
    },
}
