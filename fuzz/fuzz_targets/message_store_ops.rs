//! Fuzz target for the MessageStore state machine
//!
//! Drives one conversation window through arbitrary interleavings of history
//! loads, optimistic sends, pushes, edits and deletes, with server verdicts
//! arriving in any order.
//!
//! # Invariants
//!
//! - Window stays in `(created_at, seq)` order after every operation
//! - No message id appears twice
//! - Every message belongs to the open conversation
//! - Rejected writes leave no trace of the optimistic change

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use chrono::{DateTime, TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use threadline_core::{Draft, LocalToken, MessageId, MessageStore, ServerOutcome};
use threadline_proto::WireMessage;

const VIEWER: u64 = 1;
const PEER: u64 = 2;
const STRANGER: u64 = 3;

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Replace { first_id: u8, count: u8 },
    Prepend { first_id: u8, count: u8 },
    Send { body: String, second: u16 },
    ConfirmSend { pick: u8, verdict: Verdict, id: u8, second: u16 },
    Push { id: u8, from_viewer: bool, stranger: bool, second: u16 },
    Edit { pick: u8, body: String },
    ConfirmEdit { pick: u8, accepted: bool },
    Remove { pick: u8 },
    ConfirmRemove { pick: u8, accepted: bool },
    MarkRead,
}

#[derive(Debug, Clone, Arbitrary)]
enum Verdict {
    Accepted,
    AcceptedCanonical,
    Rejected,
}

fn at(second: u16) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + i64::from(second), 0).single().unwrap_or_default()
}

fn wire(id: u64, sender_id: u64, receiver_id: u64, second: u16) -> WireMessage {
    WireMessage {
        id,
        sender_id,
        receiver_id,
        body: Some(format!("m{id}")),
        attachment: None,
        is_read: false,
        created_at: at(second),
        updated_at: None,
    }
}

fn page(first_id: u8, count: u8) -> Vec<WireMessage> {
    (0..u64::from(count % 16))
        .map(|offset| {
            let id = u64::from(first_id) + offset;
            let sender = if id % 2 == 0 { VIEWER } else { PEER };
            let receiver = if sender == VIEWER { PEER } else { VIEWER };
            wire(id, sender, receiver, (id * 10) as u16)
        })
        .collect()
}

fn pick<T: Copy>(items: &[T], index: u8) -> Option<T> {
    (!items.is_empty()).then(|| items[usize::from(index) % items.len()])
}

fuzz_target!(|ops: Vec<Op>| {
    let mut store = MessageStore::new(VIEWER);
    store.open(PEER);

    let mut tokens: Vec<LocalToken> = Vec::new();
    let mut edits: Vec<u64> = Vec::new();
    let mut removals: Vec<u64> = Vec::new();

    for op in ops {
        match op {
            Op::Replace { first_id, count } => {
                store.replace(page(first_id, count));
            },
            Op::Prepend { first_id, count } => {
                store.prepend_history(page(first_id, count));
            },
            Op::Send { body, second } => {
                if let Ok(token) = store.append_optimistic(&Draft::text(PEER, body), at(second)) {
                    tokens.push(token);
                }
            },
            Op::ConfirmSend { pick: index, verdict, id, second } => {
                let Some(token) = pick(&tokens, index) else { continue };
                tokens.retain(|t| *t != token);
                let outcome = match verdict {
                    Verdict::Accepted => ServerOutcome::Accepted(None),
                    Verdict::AcceptedCanonical => ServerOutcome::Accepted(Some(wire(
                        1_000 + u64::from(id),
                        VIEWER,
                        PEER,
                        second,
                    ))),
                    Verdict::Rejected => ServerOutcome::Rejected,
                };
                let rejected = matches!(outcome, ServerOutcome::Rejected);
                let before = store.len();
                if store.confirm_send(token, outcome).is_ok() && rejected {
                    assert_eq!(store.len() + 1, before, "rejected send must be removed");
                }
                assert!(store.get_by_token(token).is_none());
            },
            Op::Push { id, from_viewer, stranger, second } => {
                let other = if stranger { STRANGER } else { PEER };
                let message = if from_viewer {
                    wire(1_000 + u64::from(id), VIEWER, other, second)
                } else {
                    wire(1_000 + u64::from(id), other, VIEWER, second)
                };
                store.ingest(message);
            },
            Op::Edit { pick: index, body } => {
                let ids: Vec<u64> = store.messages().filter_map(|m| m.id.server_id()).collect();
                let Some(id) = pick(&ids, index) else { continue };
                if store.edit_local(MessageId::Confirmed(id), &body, at(u16::MAX)).is_ok() {
                    edits.push(id);
                }
            },
            Op::ConfirmEdit { pick: index, accepted } => {
                let Some(id) = pick(&edits, index) else { continue };
                edits.retain(|e| *e != id);
                let before = store.get(&MessageId::Confirmed(id)).cloned();
                let outcome =
                    if accepted { ServerOutcome::Accepted(None) } else { ServerOutcome::Rejected };
                let _ = store.confirm_edit(id, outcome);
                if accepted {
                    assert_eq!(store.get(&MessageId::Confirmed(id)).cloned(), before);
                }
            },
            Op::Remove { pick: index } => {
                let ids: Vec<u64> = store.messages().filter_map(|m| m.id.server_id()).collect();
                let Some(id) = pick(&ids, index) else { continue };
                if store.remove(MessageId::Confirmed(id)).is_ok() {
                    removals.push(id);
                    assert!(!store.contains(&MessageId::Confirmed(id)));
                }
            },
            Op::ConfirmRemove { pick: index, accepted } => {
                let Some(id) = pick(&removals, index) else { continue };
                removals.retain(|r| *r != id);
                if store.confirm_remove(id, accepted).is_ok() {
                    assert_eq!(store.contains(&MessageId::Confirmed(id)), !accepted);
                }
            },
            Op::MarkRead => {
                store.mark_incoming_read();
                assert!(store.messages().all(|m| m.sender_id != PEER || m.is_read));
            },
        }

        assert!(store.is_ordered(), "window out of order");
        let mut seen = HashSet::new();
        for message in store.messages() {
            assert!(seen.insert(message.id), "duplicate id {}", message.id);
            assert_eq!(message.counterpart(VIEWER), PEER, "message outside the window");
        }
    }
});
