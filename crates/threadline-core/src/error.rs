//! Error types for the synchronization components.
//!
//! None of these are fatal: each describes a rejected local operation that
//! leaves the component unchanged.

use thiserror::Error;

use crate::{LocalToken, MessageId, UserId};

/// Errors from [`crate::MessageStore`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No conversation is open.
    #[error("no conversation is open")]
    NoConversation,

    /// Draft carries neither a body nor an attachment.
    #[error("draft has neither a body nor an attachment")]
    EmptyDraft,

    /// Draft is addressed to a conversation other than the open one.
    #[error("draft for user {receiver_id} does not belong to the conversation with {counterpart}")]
    WrongConversation {
        /// Receiver named by the draft.
        receiver_id: UserId,
        /// Counterpart of the open conversation.
        counterpart: UserId,
    },

    /// Message is not in the open window.
    #[error("message {id} is not in the open conversation")]
    UnknownMessage {
        /// Message that was looked up.
        id: MessageId,
    },

    /// No optimistic send carries this token.
    #[error("no pending send with token {token}")]
    UnknownToken {
        /// Token that was looked up.
        token: LocalToken,
    },

    /// Operation needs a server id but the message is still pending.
    #[error("message {id} has not been confirmed by the server")]
    NotConfirmed {
        /// Pending message.
        id: MessageId,
    },

    /// A previous mutation of this message has not been confirmed yet.
    #[error("message {id} already has a mutation in flight")]
    MutationInFlight {
        /// Message with the outstanding mutation.
        id: MessageId,
    },
}

/// Errors from [`crate::ConversationList`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    /// No conversation exists with this counterpart.
    #[error("no conversation with user {user_id}")]
    UnknownConversation {
        /// Counterpart that was looked up.
        user_id: UserId,
    },

    /// Pinning would exceed the pin limit.
    #[error("at most {limit} conversations can be pinned")]
    PinLimitReached {
        /// Configured pin limit.
        limit: usize,
    },
}
