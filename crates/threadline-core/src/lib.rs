//! Threadline core
//!
//! Pure synchronization components of the messenger client. Nothing here
//! performs I/O: every component is a state machine that callers feed with
//! inputs (user intents, server responses, push events, time) and query for
//! results.
//!
//! # Components
//!
//! - [`MessageStore`]: ordered message window of the open conversation with
//!   optimistic writes and rollback
//! - [`ConversationList`]: single writer of pin, favorite, presence and unread
//!   state; derives the filtered, sorted list
//! - [`PaginationLoader`]: backward history paging with stale-response
//!   rejection
//! - [`PresenceTracker`]: heartbeat and poll cadence, presence merge
//! - [`Environment`]: time and randomness abstraction for deterministic tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod conversations;
pub mod env;
pub mod error;
pub mod message;
pub mod message_store;
pub mod pagination;
pub mod presence;

pub use config::SyncConfig;
pub use conversations::{
    Conversation, ConversationList, ListFilter, MessagePreview, PinChange, Profile, Tab,
};
pub use env::Environment;
pub use error::{ConversationError, StoreError};
pub use message::{
    Attachment, Draft, LocalFile, LocalToken, Message, MessageId, MessageStatus, ServerOutcome,
};
pub use message_store::{IngestOutcome, MessageStore};
pub use pagination::{
    LoadKind, LoadOutcome, LoadTicket, LoaderState, PaginationLoader, ScrollAnchor,
};
pub use presence::{PresenceAction, PresenceTracker};
pub use threadline_proto::{ServerId, UserId};
