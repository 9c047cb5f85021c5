//! Operations for model-based testing.
//!
//! Operations represent everything that can happen to one viewer's session:
//! user intents, messages and presence changes from peers, redelivered
//! pushes, injected failures and the passage of time. They are generated
//! randomly by proptest and applied to both the model and the real client.

use arbitrary::Arbitrary;

/// Peer index; mapped onto one of the [`super::PEERS`] other users.
pub type ModelPeer = u8;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Open the conversation with a peer.
    Open {
        /// Counterpart.
        peer: ModelPeer,
    },

    /// Leave the open conversation.
    Close,

    /// Send a message in the open conversation.
    Send {
        /// Message content.
        text: SmallText,
    },

    /// A peer sends the viewer a message, delivered over realtime.
    Receive {
        /// Sender.
        peer: ModelPeer,
        /// Message content.
        text: SmallText,
    },

    /// The broadcaster delivers the most recent message push again.
    RedeliverLast,

    /// Flip the pin flag of a conversation.
    TogglePin {
        /// Counterpart.
        peer: ModelPeer,
    },

    /// Flip the favorite flag of a conversation.
    ToggleFavorite {
        /// Counterpart.
        peer: ModelPeer,
    },

    /// A peer's presence changes.
    Presence {
        /// Peer whose presence changes.
        peer: ModelPeer,
        /// New state.
        online: bool,
    },

    /// The next request of `kind` fails at the server.
    FailNext {
        /// Request kind to fail.
        kind: FaultKind,
    },

    /// Advance simulation time, driving heartbeats and polls.
    AdvanceTime {
        /// Seconds to advance.
        secs: u8,
    },
}

/// Request kinds failure can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
pub enum FaultKind {
    /// Message send.
    Send,
    /// Pin toggle.
    Pin,
    /// Favorite toggle.
    Favorite,
}

/// Small message content for testing.
///
/// Expanded to a short non-blank body so generated cases stay small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallText {
    /// Content seed.
    pub seed: u8,
}

impl SmallText {
    /// Message body.
    pub fn body(self) -> String {
        format!("msg-{}", self.seed)
    }
}

/// Result of applying an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation took effect (or had nothing to do).
    Ok,
    /// Operation was refused or rolled back.
    Err(OperationError),
}

/// Why an operation did not take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Send with no open conversation.
    NoActiveConversation,
    /// Pin refused locally.
    PinLimitReached,
    /// Server rejected the request and the change was rolled back.
    Rejected,
}

#[cfg(test)]
mod tests {
    use arbitrary::Unstructured;

    use super::*;

    #[test]
    fn operations_generate_from_bytes() {
        let bytes: Vec<u8> = (0..=255).collect();
        let mut unstructured = Unstructured::new(&bytes);
        let operations: Vec<Operation> =
            (0..16).filter_map(|_| Operation::arbitrary(&mut unstructured).ok()).collect();
        assert!(!operations.is_empty());
    }

    #[test]
    fn small_text_is_never_blank() {
        assert_eq!(SmallText { seed: 0 }.body(), "msg-0");
    }
}
