//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Messages are displayed in ascending `created_at` order.
///
/// Optimistic messages are stamped from the wall clock and confirmed ones by
/// the server; either way the window never shows a newer message above an
/// older one.
pub struct MessagesOrdered;

impl Invariant for MessagesOrdered {
    fn name(&self) -> &'static str {
        "messages_ordered"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (position, pair) in client.messages.windows(2).enumerate() {
                if pair[1].created_at < pair[0].created_at {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {}: message {:?} at {} sorts before {:?} at {}",
                            client.viewer,
                            pair[1].id,
                            position + 1,
                            pair[0].id,
                            position
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// No message identity appears twice in a window.
///
/// Duplicate pushes, send echoes and history pages overlapping realtime
/// deliveries must all collapse to one entry.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut seen = HashSet::new();
            for message in &client.messages {
                if !seen.insert(message.id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("client {}: {:?} listed twice", client.viewer, message.id),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every message in the window belongs to the open conversation.
pub struct MessagesInConversation;

impl Invariant for MessagesInConversation {
    fn name(&self) -> &'static str {
        "messages_in_conversation"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for message in &client.messages {
                let participants = [message.sender_id, message.receiver_id];
                let belongs = client.counterpart.is_some_and(|counterpart| {
                    participants.contains(&client.viewer) && participants.contains(&counterpart)
                });
                if !belongs {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {}: {:?} ({} -> {}) shown in conversation {:?}",
                            client.viewer,
                            message.id,
                            message.sender_id,
                            message.receiver_id,
                            client.counterpart
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// At most `pin_limit` conversations are pinned.
pub struct PinLimit;

impl Invariant for PinLimit {
    fn name(&self) -> &'static str {
        "pin_limit"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let pinned = client.conversations.iter().filter(|c| c.is_pinned).count();
            if pinned > client.pin_limit {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: {pinned} pinned, limit {}",
                        client.viewer, client.pin_limit
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The active conversation has no unread messages.
pub struct ActiveUnreadZero;

impl Invariant for ActiveUnreadZero {
    fn name(&self) -> &'static str {
        "active_unread_zero"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let Some(active) = client.active else {
                continue;
            };
            if let Some(conversation) =
                client.conversations.iter().find(|c| c.user_id == active && c.unread_count > 0)
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: active conversation {active} shows {} unread",
                        client.viewer, conversation.unread_count
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The active conversation exists in the list.
///
/// Prevents the UI from showing a selected conversation that doesn't exist.
pub struct ActiveConversationListed;

impl Invariant for ActiveConversationListed {
    fn name(&self) -> &'static str {
        "active_conversation_listed"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if let Some(active) = client.active
                && !client.conversations.iter().any(|c| c.user_id == active)
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: active conversation {active} not in {:?}",
                        client.viewer,
                        client.conversations.iter().map(|c| c.user_id).collect::<Vec<_>>()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Each counterpart appears once in the list.
pub struct UniqueConversations;

impl Invariant for UniqueConversations {
    fn name(&self) -> &'static str {
        "unique_conversations"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut seen = HashSet::new();
            if let Some(duplicate) = client.conversations.iter().find(|c| !seen.insert(c.user_id)) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: conversation {} listed twice",
                        client.viewer, duplicate.user_id
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use threadline_core::{MessageId, ServerId};

    use super::*;
    use crate::invariants::{ClientSnapshot, ConversationSnapshot, MessageSnapshot};

    fn message(id: ServerId, secs: i64) -> MessageSnapshot {
        MessageSnapshot {
            id: MessageId::Confirmed(id),
            sender_id: 1,
            receiver_id: 2,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn out_of_order_messages_violate() {
        let client = ClientSnapshot::new(1)
            .with_active(Some(2))
            .with_message(message(1, 20))
            .with_message(message(2, 10));
        let state = SystemSnapshot::single(client);

        let violation = MessagesOrdered.check(&state).unwrap_err();
        assert_eq!(violation.invariant, "messages_ordered");
    }

    #[test]
    fn duplicate_ids_violate() {
        let client = ClientSnapshot::new(1)
            .with_active(Some(2))
            .with_message(message(1, 10))
            .with_message(message(1, 10));
        assert!(UniqueMessageIds.check(&SystemSnapshot::single(client)).is_err());
    }

    #[test]
    fn foreign_message_violates() {
        let client = ClientSnapshot::new(1).with_active(Some(3)).with_message(message(1, 10));
        assert!(MessagesInConversation.check(&SystemSnapshot::single(client)).is_err());
    }

    #[test]
    fn pin_limit_violation_reports_counts() {
        let mut client = ClientSnapshot::new(1).with_pin_limit(1);
        for user_id in [2, 3] {
            client = client.with_conversation(ConversationSnapshot {
                is_pinned: true,
                ..ConversationSnapshot::new(user_id)
            });
        }

        let violation = PinLimit.check(&SystemSnapshot::single(client)).unwrap_err();
        assert!(violation.message.contains("2 pinned, limit 1"));
    }

    #[test]
    fn unread_in_active_conversation_violates() {
        let client = ClientSnapshot::new(1)
            .with_active(Some(2))
            .with_conversation(ConversationSnapshot {
                unread_count: 1,
                ..ConversationSnapshot::new(2)
            });
        assert!(ActiveUnreadZero.check(&SystemSnapshot::single(client)).is_err());
    }

    #[test]
    fn unlisted_active_conversation_violates() {
        let client = ClientSnapshot::new(1).with_active(Some(9));
        assert!(ActiveConversationListed.check(&SystemSnapshot::single(client)).is_err());
    }

    #[test]
    fn duplicate_conversation_violates() {
        let client = ClientSnapshot::new(1)
            .with_conversation(ConversationSnapshot::new(2))
            .with_conversation(ConversationSnapshot::new(2));
        assert!(UniqueConversations.check(&SystemSnapshot::single(client)).is_err());
    }
}
