//! Application side-effects and intents.
//!
//! This module defines the [`AppAction`] enum, which represents instructions
//! produced by the [`crate::App`] state machine for the runtime to execute.

use threadline_core::{Draft, MessageId, UserId};

/// Actions produced by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Render the UI.
    Render,

    /// Quit the application.
    Quit,

    /// The user interacted; feeds presence activity.
    Activity,

    /// Reload the conversation listing.
    Refresh,

    /// Open a conversation.
    OpenConversation {
        /// Counterpart.
        user_id: UserId,
    },

    /// Close the open conversation.
    CloseConversation,

    /// Send a message.
    SendMessage {
        /// Composed content.
        draft: Draft,
    },

    /// Edit one of the viewer's messages.
    EditMessage {
        /// Message to edit.
        id: MessageId,
        /// New body.
        body: String,
    },

    /// Delete one of the viewer's messages.
    DeleteMessage {
        /// Message to delete.
        id: MessageId,
    },

    /// Flip a conversation's pin flag.
    TogglePin {
        /// Counterpart.
        user_id: UserId,
    },

    /// Flip a conversation's favorite flag.
    ToggleFavorite {
        /// Counterpart.
        user_id: UserId,
    },

    /// Message viewport moved.
    Scrolled {
        /// Rows between the viewport top and the oldest loaded message.
        rows_from_top: usize,
    },

    /// Load the next older history page.
    LoadOlder,
}
