//! Model world - the reference implementation.
//!
//! The world models one viewer's session against a server: what the
//! conversation list shows, which conversation is open and what its message
//! window holds. It's the oracle against which the real client is verified.
//!
//! Every rule here is written as directly as possible: no ids, no ordering
//! keys, no in-flight bookkeeping. If the real client and the model disagree,
//! one of them is wrong and the model is the easier one to read.

use std::collections::{BTreeMap, HashMap, HashSet};

use threadline_core::UserId;

use super::operation::{FaultKind, ModelPeer, Operation, OperationError, OperationResult};

/// Viewer user id.
pub const VIEWER: UserId = 1;

/// Number of peers the viewer can talk to.
pub const PEERS: u64 = 4;

/// User id of a generated peer index.
pub fn peer_id(peer: ModelPeer) -> UserId {
    VIEWER + 1 + u64::from(peer) % PEERS
}

/// Message as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMessage {
    /// Sender.
    pub sender: UserId,
    /// Receiver.
    pub receiver: UserId,
    /// Body.
    pub body: String,
}

impl ModelMessage {
    fn involves(&self, peer: UserId) -> bool {
        (self.sender == VIEWER && self.receiver == peer)
            || (self.sender == peer && self.receiver == VIEWER)
    }
}

/// Conversation row as observed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObservableConversation {
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
    /// Body of the last message.
    pub last_body: Option<String>,
}

/// Observable state for oracle comparison.
///
/// This is the subset of session state that can be compared against the
/// real implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Conversations sorted by user id.
    pub conversations: Vec<ObservableConversation>,
    /// Open conversation.
    pub active: Option<UserId>,
    /// Message window as `(sender, body)`, oldest first.
    pub window: Vec<(UserId, String)>,
}

/// Model world - the reference implementation.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    page_size: usize,
    pin_limit: usize,
    server: Vec<ModelMessage>,
    server_favorites: HashSet<UserId>,
    conversations: BTreeMap<UserId, ObservableConversation>,
    active: Option<UserId>,
    window: Vec<ModelMessage>,
    faults: HashMap<FaultKind, u32>,
}

impl ModelWorld {
    /// Started session with every peer listed and nothing exchanged yet.
    pub fn new(page_size: usize, pin_limit: usize) -> Self {
        let conversations = (0..PEERS)
            .map(|index| {
                let user_id = VIEWER + 1 + index;
                (user_id, ObservableConversation { user_id, ..Default::default() })
            })
            .collect();
        Self {
            page_size,
            pin_limit,
            server: Vec::new(),
            server_favorites: HashSet::new(),
            conversations,
            active: None,
            window: Vec::new(),
            faults: HashMap::new(),
        }
    }

    /// Messages the server holds, in commit order.
    pub fn server_messages(&self) -> &[ModelMessage] {
        &self.server
    }

    /// Apply an operation and return the result.
    ///
    /// This is the main entry point for model-based testing.
    /// The result should match the real implementation's result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Open { peer } => {
                self.apply_open(peer_id(*peer));
                OperationResult::Ok
            },
            Operation::Close => {
                self.active = None;
                self.window.clear();
                OperationResult::Ok
            },
            Operation::Send { text } => self.apply_send(text.body()),
            Operation::Receive { peer, text } => {
                self.apply_receive(peer_id(*peer), text.body());
                OperationResult::Ok
            },
            // Duplicates are absorbed; time only drives presence cadence,
            // which converges on what pushes already applied.
            Operation::RedeliverLast | Operation::AdvanceTime { .. } => OperationResult::Ok,
            Operation::TogglePin { peer } => self.apply_toggle_pin(peer_id(*peer)),
            Operation::ToggleFavorite { peer } => {
                self.apply_toggle_favorite(peer_id(*peer));
                OperationResult::Ok
            },
            Operation::Presence { peer, online } => {
                self.conversation(peer_id(*peer)).is_online = *online;
                OperationResult::Ok
            },
            Operation::FailNext { kind } => {
                self.faults.insert(*kind, 1);
                OperationResult::Ok
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            conversations: self.conversations.values().cloned().collect(),
            active: self.active,
            window: self.window.iter().map(|m| (m.sender, m.body.clone())).collect(),
        }
    }

    fn apply_open(&mut self, peer: UserId) {
        self.active = Some(peer);
        self.conversation(peer).unread_count = 0;
        let history: Vec<ModelMessage> =
            self.server.iter().filter(|m| m.involves(peer)).cloned().collect();
        let start = history.len().saturating_sub(self.page_size);
        self.window = history[start..].to_vec();
    }

    fn apply_send(&mut self, body: String) -> OperationResult {
        let Some(peer) = self.active else {
            return OperationResult::Err(OperationError::NoActiveConversation);
        };
        if self.take_fault(FaultKind::Send) {
            return OperationResult::Err(OperationError::Rejected);
        }
        let message = ModelMessage { sender: VIEWER, receiver: peer, body };
        self.conversation(peer).last_body = Some(message.body.clone());
        self.window.push(message.clone());
        self.server.push(message);
        OperationResult::Ok
    }

    fn apply_receive(&mut self, peer: UserId, body: String) {
        let message = ModelMessage { sender: peer, receiver: VIEWER, body };
        let open = self.active == Some(peer);
        let conversation = self.conversation(peer);
        conversation.last_body = Some(message.body.clone());
        if !open {
            conversation.unread_count += 1;
        }
        if open {
            self.window.push(message.clone());
        }
        self.server.push(message);
    }

    fn apply_toggle_pin(&mut self, peer: UserId) -> OperationResult {
        let pinned = self.conversation(peer).is_pinned;
        let pinned_count = self.conversations.values().filter(|c| c.is_pinned).count();
        if !pinned && pinned_count >= self.pin_limit {
            return OperationResult::Err(OperationError::PinLimitReached);
        }
        if self.take_fault(FaultKind::Pin) {
            return OperationResult::Err(OperationError::Rejected);
        }
        self.conversation(peer).is_pinned = !pinned;
        OperationResult::Ok
    }

    /// Local flag flips immediately; a failure is not rolled back, a success
    /// adopts the server's state.
    fn apply_toggle_favorite(&mut self, peer: UserId) {
        let local = !self.conversation(peer).is_favorite;
        let state = if self.take_fault(FaultKind::Favorite) {
            local
        } else if self.server_favorites.remove(&peer) {
            false
        } else {
            self.server_favorites.insert(peer);
            true
        };
        self.conversation(peer).is_favorite = state;
    }

    fn take_fault(&mut self, kind: FaultKind) -> bool {
        self.faults.remove(&kind).is_some()
    }

    fn conversation(&mut self, peer: UserId) -> &mut ObservableConversation {
        self.conversations
            .entry(peer)
            .or_insert_with(|| ObservableConversation { user_id: peer, ..Default::default() })
    }
}
