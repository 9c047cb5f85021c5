//! Realtime Ingestion Bridge
//!
//! Owns the push subscription lifecycle and turns pushed messages into
//! message store and conversation list mutations.
//!
//! # Responsibilities
//!
//! - Subscribe to the viewer's private channel and the presence channel once
//!   the viewer is known; unsubscribe on teardown.
//! - Degrade silently to polling when credentials are missing or the
//!   transport fails.
//! - Route `MessageSent` to the message store when it belongs to the open
//!   conversation, and to the conversation list in every case.
//! - Absorb replayed deliveries: a server id is applied at most once.

use std::collections::{HashSet, VecDeque};

use threadline_core::{
    ConversationList, IngestOutcome, MessagePreview, MessageStore, ServerId, UserId,
};
use threadline_proto::{Channel, WireMessage};
use tracing::{debug, info, warn};

use crate::SessionContext;

/// Remembered server ids for replay detection outside the open window.
const RECENT_CAPACITY: usize = 512;

/// Push subscription state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeStatus {
    /// Not started.
    Idle,
    /// Subscribed to the listed channels.
    Subscribed(Vec<Channel>),
    /// Running on polling alone.
    Degraded {
        /// Why realtime is unavailable.
        reason: String,
    },
}

/// What an ingested message changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestEffect {
    /// The open window changed.
    pub messages_changed: bool,
    /// The conversation list changed.
    pub conversations_changed: bool,
    /// The inbound message landed in the open conversation.
    pub read_in_place: bool,
    /// The counterpart was unknown and got a placeholder conversation.
    pub unknown_counterpart: Option<UserId>,
}

/// Realtime ingestion bridge.
#[derive(Debug, Clone)]
pub struct RealtimeBridge {
    viewer: UserId,
    status: RealtimeStatus,
    recent: VecDeque<ServerId>,
    recent_set: HashSet<ServerId>,
}

impl RealtimeBridge {
    /// Bridge for `viewer`, not yet subscribed.
    pub fn new(viewer: UserId) -> Self {
        Self {
            viewer,
            status: RealtimeStatus::Idle,
            recent: VecDeque::with_capacity(RECENT_CAPACITY),
            recent_set: HashSet::with_capacity(RECENT_CAPACITY),
        }
    }

    /// Current subscription state.
    pub fn status(&self) -> &RealtimeStatus {
        &self.status
    }

    /// Channels to subscribe to, or `None` when realtime is not configured.
    pub fn connect(&mut self, context: &SessionContext) -> Option<Vec<Channel>> {
        if context.realtime.is_none() {
            self.degrade("realtime credentials not configured");
            return None;
        }

        let channels = context.channels();
        info!(viewer = self.viewer, ?channels, "subscribing to realtime");
        self.status = RealtimeStatus::Subscribed(channels.clone());
        Some(channels)
    }

    /// Fall back to polling. Not an error.
    pub fn degrade(&mut self, reason: &str) {
        warn!(reason, "realtime unavailable, relying on polling");
        self.status = RealtimeStatus::Degraded { reason: reason.to_owned() };
    }

    /// Channels to unsubscribe from on teardown.
    pub fn disconnect(&mut self) -> Option<Vec<Channel>> {
        match std::mem::replace(&mut self.status, RealtimeStatus::Idle) {
            RealtimeStatus::Subscribed(channels) => Some(channels),
            RealtimeStatus::Idle | RealtimeStatus::Degraded { .. } => None,
        }
    }

    /// Record a server id learned outside push (e.g. a send response) so its
    /// echo is not counted again.
    pub fn remember(&mut self, id: ServerId) -> bool {
        if !self.recent_set.insert(id) {
            return false;
        }
        if self.recent.len() == RECENT_CAPACITY
            && let Some(evicted) = self.recent.pop_front()
        {
            self.recent_set.remove(&evicted);
        }
        self.recent.push_back(id);
        true
    }

    /// Apply a pushed `MessageSent`.
    pub fn ingest_message(
        &mut self,
        message: WireMessage,
        store: &mut MessageStore,
        conversations: &mut ConversationList,
    ) -> IngestEffect {
        let mut effect = IngestEffect::default();
        if message.sender_id != self.viewer && message.receiver_id != self.viewer {
            warn!(id = message.id, "pushed message does not involve the viewer");
            return effect;
        }

        let counterpart = message.counterpart(self.viewer);
        let inbound = message.sender_id != self.viewer;
        let preview = MessagePreview::from(&message);
        let first_delivery = self.remember(message.id);

        if store.counterpart() == Some(counterpart) {
            match store.ingest(message) {
                IngestOutcome::Inserted => {
                    effect.messages_changed = true;
                    effect.read_in_place = inbound;
                },
                IngestOutcome::Reconciled { pending } => {
                    conversations.confirm_last_message(counterpart, pending, preview);
                    effect.messages_changed = true;
                    effect.conversations_changed = true;
                    return effect;
                },
                IngestOutcome::Duplicate | IngestOutcome::OutsideWindow => {
                    debug!(counterpart, "replayed message absorbed");
                    return effect;
                },
            }
        } else if !first_delivery {
            debug!(counterpart, "replayed message absorbed");
            return effect;
        }

        if conversations.ensure(counterpart) {
            effect.unknown_counterpart = Some(counterpart);
        }
        if conversations.record_message(counterpart, preview, inbound).is_ok() {
            effect.conversations_changed = true;
        }
        effect
    }
}
