//! Message Store
//!
//! Ordered window of messages for the open conversation. All writers go
//! through this type: history loads, optimistic sends and their confirmation,
//! realtime ingestion, edits and deletes.
//!
//! # Invariants
//!
//! - Entries are ordered by `(created_at, seq)` ascending. `seq` grows for
//!   appended entries and shrinks for prepended ones, so equal timestamps keep
//!   insertion order.
//! - No two entries share a [`MessageId`].
//! - Every entry belongs to the open conversation.
//! - A rejected optimistic write leaves the message sequence exactly as it was
//!   before the write.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use threadline_proto::{ServerId, UserId, WireMessage};
use tracing::{debug, trace, warn};

use crate::{
    Attachment, Draft, LocalToken, Message, MessageId, MessageStatus, ServerOutcome, StoreError,
    message::is_blank,
};

/// Result of feeding a server message to [`MessageStore::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New message appended to the window.
    Inserted,
    /// Echo of one of the viewer's optimistic sends; the pending entry
    /// adopted the server id.
    Reconciled {
        /// Id the entry carried before adopting the server id.
        pending: MessageId,
    },
    /// Already present (or being deleted); ignored.
    Duplicate,
    /// Belongs to another conversation; ignored.
    OutsideWindow,
}

#[derive(Debug, Clone)]
struct Entry {
    message: Message,
    seq: i64,
    /// Set while the send request of an optimistic entry is in flight.
    token: Option<LocalToken>,
}

impl Entry {
    fn key(&self) -> (DateTime<Utc>, i64) {
        (self.message.created_at, self.seq)
    }
}

#[derive(Debug, Clone)]
struct PreviousBody {
    body: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

/// Ordered message window of the open conversation.
#[derive(Debug, Clone)]
pub struct MessageStore {
    viewer: UserId,
    counterpart: Option<UserId>,
    entries: Vec<Entry>,
    next_tail: i64,
    next_head: i64,
    next_token: u64,
    edits: HashMap<ServerId, PreviousBody>,
    removals: HashMap<ServerId, Entry>,
}

impl MessageStore {
    /// Empty store for `viewer` with no conversation open.
    pub fn new(viewer: UserId) -> Self {
        Self {
            viewer,
            counterpart: None,
            entries: Vec::new(),
            next_tail: 0,
            next_head: -1,
            next_token: 1,
            edits: HashMap::new(),
            removals: HashMap::new(),
        }
    }

    /// Discard the current window and open the conversation with
    /// `counterpart`.
    ///
    /// Local tokens keep counting so a late confirmation for the previous
    /// conversation can never match an entry of the new one.
    pub fn open(&mut self, counterpart: UserId) {
        debug!(counterpart, discarded = self.entries.len(), "opening message window");
        self.counterpart = Some(counterpart);
        self.entries.clear();
        self.edits.clear();
        self.removals.clear();
        self.next_tail = 0;
        self.next_head = -1;
    }

    /// Discard the window without opening another conversation.
    pub fn close(&mut self) {
        self.counterpart = None;
        self.entries.clear();
        self.edits.clear();
        self.removals.clear();
    }

    /// Viewer the store belongs to.
    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    /// Counterpart of the open conversation.
    pub fn counterpart(&self) -> Option<UserId> {
        self.counterpart
    }

    /// Number of messages in the window.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Messages in display order, oldest first.
    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &Message> + ExactSizeIterator {
        self.entries.iter().map(|entry| &entry.message)
    }

    /// Owned copy of the window in display order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages().cloned().collect()
    }

    /// Newest message.
    pub fn last(&self) -> Option<&Message> {
        self.entries.last().map(|entry| &entry.message)
    }

    /// Look up a message by id.
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.position(id).map(|index| &self.entries[index].message)
    }

    /// Whether the window holds `id`.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    /// Look up the optimistic message created with `token`.
    pub fn get_by_token(&self, token: LocalToken) -> Option<&Message> {
        self.position_of_token(token).map(|index| &self.entries[index].message)
    }

    /// Whether a mutation (edit or delete) of `id` awaits the server.
    pub fn has_mutation_in_flight(&self, id: ServerId) -> bool {
        self.edits.contains_key(&id) || self.removals.contains_key(&id)
    }

    /// Replace the window with the newest history page.
    ///
    /// Optimistic entries whose send is still in flight survive the reload,
    /// as do messages newer than the page that arrived by push while it was
    /// loading. Messages with a delete in flight are not resurrected. Returns
    /// the number of server messages placed from the page.
    pub fn replace(&mut self, batch: Vec<WireMessage>) -> usize {
        let Some(counterpart) = self.counterpart else {
            warn!(count = batch.len(), "history page with no open conversation");
            return 0;
        };

        let newest = batch
            .iter()
            .filter(|wire| wire.counterpart(self.viewer) == counterpart)
            .map(|wire| wire.created_at)
            .max();
        let (in_flight, settled): (Vec<Entry>, Vec<Entry>) =
            self.entries.drain(..).partition(|entry| entry.token.is_some());
        self.next_tail = 0;
        self.next_head = -1;

        let mut seen = HashSet::new();
        for wire in batch {
            if wire.counterpart(self.viewer) != counterpart
                || self.removals.contains_key(&wire.id)
                || !seen.insert(wire.id)
            {
                trace!(id = wire.id, "skipping history entry");
                continue;
            }
            let seq = self.take_tail_seq();
            self.insert_sorted(Entry { message: Message::from_wire(wire), seq, token: None });
        }
        let placed = self.entries.len();

        for mut entry in settled {
            let newer = newest.is_none_or(|newest| entry.message.created_at >= newest);
            let fresh = entry.message.id.server_id().is_none_or(|id| seen.insert(id));
            if newer && fresh {
                trace!(id = %entry.message.id, "keeping message newer than the page");
                entry.seq = self.take_tail_seq();
                self.insert_sorted(entry);
            }
        }
        for mut entry in in_flight {
            entry.seq = self.take_tail_seq();
            self.insert_sorted(entry);
        }
        placed
    }

    /// Merge an older history page into the window.
    ///
    /// Messages already present are skipped. Returns the number added.
    pub fn prepend_history(&mut self, batch: Vec<WireMessage>) -> usize {
        let Some(counterpart) = self.counterpart else {
            warn!(count = batch.len(), "history page with no open conversation");
            return 0;
        };

        let mut seen = HashSet::new();
        let fresh: Vec<WireMessage> = batch
            .into_iter()
            .filter(|wire| {
                wire.counterpart(self.viewer) == counterpart
                    && !self.removals.contains_key(&wire.id)
                    && self.position(&MessageId::Confirmed(wire.id)).is_none()
                    && seen.insert(wire.id)
            })
            .collect();

        let added = fresh.len();
        for wire in fresh.into_iter().rev() {
            let seq = self.next_head;
            self.next_head -= 1;
            self.insert_sorted(Entry { message: Message::from_wire(wire), seq, token: None });
        }
        added
    }

    /// Append the viewer's draft immediately, before the server confirms it.
    ///
    /// The message is stamped with `now`, clamped so it never sorts before the
    /// current newest message.
    ///
    /// # Errors
    ///
    /// - `StoreError::NoConversation` if no conversation is open
    /// - `StoreError::WrongConversation` if the draft targets another user
    /// - `StoreError::EmptyDraft` if the draft has nothing to send
    pub fn append_optimistic(
        &mut self,
        draft: &Draft,
        now: DateTime<Utc>,
    ) -> Result<LocalToken, StoreError> {
        let counterpart = self.counterpart.ok_or(StoreError::NoConversation)?;
        if draft.receiver_id != counterpart {
            return Err(StoreError::WrongConversation {
                receiver_id: draft.receiver_id,
                counterpart,
            });
        }
        draft.validate()?;

        let created_at = match self.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };
        let token = LocalToken::new(self.next_token);
        self.next_token += 1;

        let message = Message {
            id: MessageId::Pending(token),
            sender_id: self.viewer,
            receiver_id: counterpart,
            body: draft.normalized_body(),
            attachment: draft.attachment.clone().map(Attachment::Local),
            is_read: false,
            created_at,
            updated_at: None,
            status: MessageStatus::Sending,
        };
        let seq = self.take_tail_seq();
        self.insert_sorted(Entry { message, seq, token: Some(token) });

        debug!(%token, counterpart, "optimistic message appended");
        Ok(token)
    }

    /// Apply the server's verdict on the send created with `token`.
    ///
    /// On acceptance the entry takes the canonical fields when provided and is
    /// repositioned if its timestamp changed; if the realtime echo already
    /// placed the canonical message, the optimistic entry is dropped instead.
    /// On rejection the entry is removed. Returns the surviving message, or
    /// `None` after a rejection.
    ///
    /// # Errors
    ///
    /// - `StoreError::UnknownToken` if no in-flight send carries `token`
    pub fn confirm_send(
        &mut self,
        token: LocalToken,
        outcome: ServerOutcome,
    ) -> Result<Option<Message>, StoreError> {
        let index = self.position_of_token(token).ok_or(StoreError::UnknownToken { token })?;

        match outcome {
            ServerOutcome::Rejected => {
                self.entries.remove(index);
                debug!(%token, "optimistic message rolled back");
                Ok(None)
            },
            ServerOutcome::Accepted(None) => {
                let entry = &mut self.entries[index];
                entry.token = None;
                entry.message.status = MessageStatus::Sent;
                Ok(Some(entry.message.clone()))
            },
            ServerOutcome::Accepted(Some(wire)) => {
                let confirmed = MessageId::Confirmed(wire.id);
                let mut entry = self.entries.remove(index);

                let known = self
                    .get(&confirmed)
                    .or_else(|| self.removals.get(&wire.id).map(|entry| &entry.message));
                if let Some(existing) = known {
                    debug!(%token, id = wire.id, "echo arrived first, dropping optimistic copy");
                    return Ok(Some(existing.clone()));
                }

                entry.token = None;
                entry.message.adopt(wire);
                let message = entry.message.clone();
                self.insert_sorted(entry);
                Ok(Some(message))
            },
        }
    }

    /// Insert a server-pushed message.
    ///
    /// Duplicates (same server id) are ignored. An echo of the viewer's own
    /// message is reconciled with the oldest matching pending entry rather than
    /// inserted a second time.
    pub fn ingest(&mut self, wire: WireMessage) -> IngestOutcome {
        let Some(counterpart) = self.counterpart else {
            return IngestOutcome::OutsideWindow;
        };
        if wire.counterpart(self.viewer) != counterpart {
            return IngestOutcome::OutsideWindow;
        }
        if self.removals.contains_key(&wire.id)
            || self.position(&MessageId::Confirmed(wire.id)).is_some()
        {
            trace!(id = wire.id, "duplicate message ignored");
            return IngestOutcome::Duplicate;
        }

        if wire.sender_id == self.viewer
            && let Some(index) = self.matching_pending(&wire)
        {
            let mut entry = self.entries.remove(index);
            let pending = entry.message.id;
            debug!(id = wire.id, %pending, "echo reconciled with pending message");
            entry.message.adopt(wire);
            self.insert_sorted(entry);
            return IngestOutcome::Reconciled { pending };
        }

        let seq = self.take_tail_seq();
        self.insert_sorted(Entry { message: Message::from_wire(wire), seq, token: None });
        IngestOutcome::Inserted
    }

    /// Replace the body of a confirmed message optimistically.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotConfirmed` if the message is still pending
    /// - `StoreError::UnknownMessage` if the message is not in the window
    /// - `StoreError::MutationInFlight` if an edit or delete is outstanding
    /// - `StoreError::EmptyDraft` if the edit would leave nothing to show
    pub fn edit_local(
        &mut self,
        id: MessageId,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let server_id = id.server_id().ok_or(StoreError::NotConfirmed { id })?;
        let index = self.position(&id).ok_or(StoreError::UnknownMessage { id })?;
        if self.has_mutation_in_flight(server_id) {
            return Err(StoreError::MutationInFlight { id });
        }

        let message = &mut self.entries[index].message;
        if is_blank(Some(body)) && message.attachment.is_none() {
            return Err(StoreError::EmptyDraft);
        }

        self.edits.insert(
            server_id,
            PreviousBody { body: message.body.take(), updated_at: message.updated_at },
        );
        let trimmed = body.trim();
        message.body = (!trimmed.is_empty()).then(|| trimmed.to_owned());
        message.updated_at = Some(now);
        Ok(())
    }

    /// Apply the server's verdict on an edit. A rejection restores the
    /// previous body.
    ///
    /// # Errors
    ///
    /// - `StoreError::UnknownMessage` if no edit of `id` is outstanding in the
    ///   open window
    pub fn confirm_edit(&mut self, id: ServerId, outcome: ServerOutcome) -> Result<(), StoreError> {
        let message_id = MessageId::Confirmed(id);
        let previous =
            self.edits.remove(&id).ok_or(StoreError::UnknownMessage { id: message_id })?;
        let index =
            self.position(&message_id).ok_or(StoreError::UnknownMessage { id: message_id })?;
        let message = &mut self.entries[index].message;

        match outcome {
            ServerOutcome::Accepted(Some(wire)) => {
                message.body = wire.body;
                message.updated_at = wire.updated_at.or(message.updated_at);
            },
            ServerOutcome::Accepted(None) => {},
            ServerOutcome::Rejected => {
                debug!(id, "edit rolled back");
                message.body = previous.body;
                message.updated_at = previous.updated_at;
            },
        }
        Ok(())
    }

    /// Remove a confirmed message optimistically. Returns the removed message.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotConfirmed` if the message is still pending
    /// - `StoreError::UnknownMessage` if the message is not in the window
    /// - `StoreError::MutationInFlight` if an edit of it is outstanding
    pub fn remove(&mut self, id: MessageId) -> Result<Message, StoreError> {
        let server_id = id.server_id().ok_or(StoreError::NotConfirmed { id })?;
        let index = self.position(&id).ok_or(StoreError::UnknownMessage { id })?;
        if self.has_mutation_in_flight(server_id) {
            return Err(StoreError::MutationInFlight { id });
        }

        let entry = self.entries.remove(index);
        let message = entry.message.clone();
        self.removals.insert(server_id, entry);
        Ok(message)
    }

    /// Apply the server's verdict on a delete. A rejection puts the message
    /// back at its original position.
    ///
    /// # Errors
    ///
    /// - `StoreError::UnknownMessage` if no delete of `id` is outstanding in
    ///   the open window
    pub fn confirm_remove(&mut self, id: ServerId, accepted: bool) -> Result<(), StoreError> {
        let entry = self
            .removals
            .remove(&id)
            .ok_or(StoreError::UnknownMessage { id: MessageId::Confirmed(id) })?;
        if !accepted {
            debug!(id, "delete rolled back");
            self.insert_sorted(entry);
        }
        Ok(())
    }

    /// Mark every message from the counterpart as read. Returns how many
    /// changed.
    pub fn mark_incoming_read(&mut self) -> usize {
        let Some(counterpart) = self.counterpart else {
            return 0;
        };
        let mut changed = 0;
        for entry in &mut self.entries {
            if entry.message.sender_id == counterpart && !entry.message.is_read {
                entry.message.is_read = true;
                changed += 1;
            }
        }
        changed
    }

    /// Whether entries are in `(created_at, seq)` order.
    pub fn is_ordered(&self) -> bool {
        self.entries.windows(2).all(|pair| pair[0].key() <= pair[1].key())
    }

    fn take_tail_seq(&mut self) -> i64 {
        let seq = self.next_tail;
        self.next_tail += 1;
        seq
    }

    fn insert_sorted(&mut self, entry: Entry) {
        let key = entry.key();
        let index = self.entries.partition_point(|existing| existing.key() <= key);
        self.entries.insert(index, entry);
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.message.id == *id)
    }

    fn position_of_token(&self, token: LocalToken) -> Option<usize> {
        self.entries.iter().position(|entry| entry.token == Some(token))
    }

    fn matching_pending(&self, wire: &WireMessage) -> Option<usize> {
        let body = wire.body.as_deref().map(str::trim).filter(|body| !body.is_empty());
        self.entries.iter().position(|entry| {
            let message = &entry.message;
            message.id.is_pending()
                && message.sender_id == self.viewer
                && message.receiver_id == wire.receiver_id
                && message.body.as_deref() == body
                && message.attachment.is_some() == wire.attachment.is_some()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::LocalFile;

    const VIEWER: UserId = 1;
    const PEER: UserId = 2;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn wire(id: ServerId, sender: UserId, body: &str, secs: i64) -> WireMessage {
        let receiver = if sender == VIEWER { PEER } else { VIEWER };
        WireMessage {
            id,
            sender_id: sender,
            receiver_id: receiver,
            body: Some(body.to_owned()),
            attachment: None,
            is_read: false,
            created_at: at(secs),
            updated_at: None,
        }
    }

    fn open_store() -> MessageStore {
        let mut store = MessageStore::new(VIEWER);
        store.open(PEER);
        store
    }

    fn ids(store: &MessageStore) -> Vec<MessageId> {
        store.messages().map(|message| message.id).collect()
    }

    #[test]
    fn optimistic_send_confirmed_with_canonical_message() {
        let mut store = open_store();
        store.replace(vec![wire(1, PEER, "a", 0), wire(2, PEER, "b", 10)]);

        let token = store.append_optimistic(&Draft::text(PEER, "hello"), at(20)).unwrap();
        assert_eq!(store.last().unwrap().id, MessageId::Pending(token));
        assert_eq!(store.last().unwrap().status, MessageStatus::Sending);

        let confirmed = store
            .confirm_send(token, ServerOutcome::Accepted(Some(wire(3, VIEWER, "hello", 21))))
            .unwrap()
            .unwrap();

        assert_eq!(confirmed.id, MessageId::Confirmed(3));
        assert_eq!(
            ids(&store),
            vec![MessageId::Confirmed(1), MessageId::Confirmed(2), MessageId::Confirmed(3)]
        );
        assert!(store.get_by_token(token).is_none());
    }

    #[test]
    fn rejected_send_restores_previous_sequence() {
        let mut store = open_store();
        store.replace(vec![wire(1, PEER, "a", 0)]);
        let before = store.snapshot();

        let token = store.append_optimistic(&Draft::text(PEER, "oops"), at(5)).unwrap();
        assert_eq!(store.len(), 2);

        assert_eq!(store.confirm_send(token, ServerOutcome::Rejected).unwrap(), None);
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn accepted_without_canonical_marks_sent_and_keeps_pending_id() {
        let mut store = open_store();
        let token = store.append_optimistic(&Draft::text(PEER, "hi"), at(0)).unwrap();

        let message = store.confirm_send(token, ServerOutcome::Accepted(None)).unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.id, MessageId::Pending(token));

        // Echo then adopts the server id.
        assert_eq!(
            store.ingest(wire(9, VIEWER, "hi", 1)),
            IngestOutcome::Reconciled { pending: MessageId::Pending(token) }
        );
        assert_eq!(ids(&store), vec![MessageId::Confirmed(9)]);
    }

    #[test]
    fn echo_before_response_is_not_duplicated() {
        let mut store = open_store();
        let token = store.append_optimistic(&Draft::text(PEER, "race"), at(0)).unwrap();

        assert_eq!(
            store.ingest(wire(4, VIEWER, "race", 1)),
            IngestOutcome::Reconciled { pending: MessageId::Pending(token) }
        );
        let message = store
            .confirm_send(token, ServerOutcome::Accepted(Some(wire(4, VIEWER, "race", 1))))
            .unwrap()
            .unwrap();

        assert_eq!(message.id, MessageId::Confirmed(4));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_ingest_is_ignored() {
        let mut store = open_store();
        assert_eq!(store.ingest(wire(5, PEER, "x", 0)), IngestOutcome::Inserted);
        assert_eq!(store.ingest(wire(5, PEER, "x", 0)), IngestOutcome::Duplicate);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn other_conversations_are_outside_the_window() {
        let mut store = open_store();
        let mut foreign = wire(5, PEER, "x", 0);
        foreign.sender_id = 7;
        assert_eq!(store.ingest(foreign), IngestOutcome::OutsideWindow);
        assert!(store.is_empty());
    }

    #[test]
    fn prepend_keeps_older_messages_first_and_skips_known_ids() {
        let mut store = open_store();
        store.replace(vec![wire(21, PEER, "new", 100), wire(22, PEER, "newer", 110)]);

        let added = store.prepend_history(vec![
            wire(19, PEER, "old", 10),
            wire(20, PEER, "older?", 20),
            wire(21, PEER, "new", 100),
        ]);

        assert_eq!(added, 2);
        assert_eq!(
            ids(&store),
            vec![
                MessageId::Confirmed(19),
                MessageId::Confirmed(20),
                MessageId::Confirmed(21),
                MessageId::Confirmed(22)
            ]
        );
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let mut store = open_store();
        store.replace(vec![wire(10, PEER, "a", 50)]);
        store.prepend_history(vec![wire(8, PEER, "b", 50), wire(9, PEER, "c", 50)]);
        store.ingest(wire(11, PEER, "d", 50));

        assert_eq!(
            ids(&store),
            vec![
                MessageId::Confirmed(8),
                MessageId::Confirmed(9),
                MessageId::Confirmed(10),
                MessageId::Confirmed(11)
            ]
        );
        assert!(store.is_ordered());
    }

    #[test]
    fn optimistic_timestamp_never_precedes_newest() {
        let mut store = open_store();
        store.replace(vec![wire(1, PEER, "future", 500)]);
        store.append_optimistic(&Draft::text(PEER, "skewed"), at(0)).unwrap();

        assert_eq!(store.last().unwrap().created_at, at(500));
        assert!(store.is_ordered());
    }

    #[test]
    fn reload_keeps_in_flight_sends() {
        let mut store = open_store();
        let token = store.append_optimistic(&Draft::text(PEER, "wait"), at(0)).unwrap();
        store.replace(vec![wire(1, PEER, "a", -10)]);

        assert_eq!(ids(&store), vec![MessageId::Confirmed(1), MessageId::Pending(token)]);
    }

    #[test]
    fn reload_keeps_pushes_newer_than_the_page() {
        let mut store = open_store();
        store.ingest(wire(50, PEER, "live", 50));
        store.ingest(wire(3, PEER, "stale", 3));

        let placed = store.replace(vec![wire(8, PEER, "a", 8), wire(10, VIEWER, "b", 10)]);

        assert_eq!(placed, 2);
        assert_eq!(
            ids(&store),
            vec![MessageId::Confirmed(8), MessageId::Confirmed(10), MessageId::Confirmed(50)]
        );
        assert!(store.is_ordered());
    }

    #[test]
    fn reload_does_not_duplicate_a_push_the_page_contains() {
        let mut store = open_store();
        store.ingest(wire(10, PEER, "b", 10));

        store.replace(vec![wire(8, PEER, "a", 8), wire(10, PEER, "b", 10)]);

        assert_eq!(ids(&store), vec![MessageId::Confirmed(8), MessageId::Confirmed(10)]);
    }

    #[test]
    fn rejected_edit_restores_body() {
        let mut store = open_store();
        store.replace(vec![wire(1, VIEWER, "before", 0)]);
        let id = MessageId::Confirmed(1);

        store.edit_local(id, "after", at(5)).unwrap();
        assert_eq!(store.get(&id).unwrap().body.as_deref(), Some("after"));
        assert_eq!(store.edit_local(id, "again", at(6)), Err(StoreError::MutationInFlight { id }));

        store.confirm_edit(1, ServerOutcome::Rejected).unwrap();
        let message = store.get(&id).unwrap();
        assert_eq!(message.body.as_deref(), Some("before"));
        assert_eq!(message.updated_at, None);
    }

    #[test]
    fn pending_messages_cannot_be_edited_or_removed() {
        let mut store = open_store();
        let token = store.append_optimistic(&Draft::text(PEER, "x"), at(0)).unwrap();
        let id = MessageId::Pending(token);

        assert_eq!(store.edit_local(id, "y", at(1)), Err(StoreError::NotConfirmed { id }));
        assert_eq!(store.remove(id), Err(StoreError::NotConfirmed { id }));
    }

    #[test]
    fn rejected_remove_restores_position() {
        let mut store = open_store();
        store.replace(vec![wire(1, PEER, "a", 0), wire(2, VIEWER, "b", 1), wire(3, PEER, "c", 2)]);
        let before = store.snapshot();

        store.remove(MessageId::Confirmed(2)).unwrap();
        assert_eq!(store.ingest(wire(2, VIEWER, "b", 1)), IngestOutcome::Duplicate);
        assert_eq!(store.len(), 2);

        store.confirm_remove(2, false).unwrap();
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn accepted_remove_is_final() {
        let mut store = open_store();
        store.replace(vec![wire(1, PEER, "a", 0)]);
        store.remove(MessageId::Confirmed(1)).unwrap();
        store.confirm_remove(1, true).unwrap();

        assert!(store.is_empty());
        assert!(!store.has_mutation_in_flight(1));
    }

    #[test]
    fn tokens_stay_unique_across_conversations() {
        let mut store = open_store();
        let first = store.append_optimistic(&Draft::text(PEER, "a"), at(0)).unwrap();
        store.open(3);
        let second = store.append_optimistic(&Draft::text(3, "b"), at(1)).unwrap();

        assert_ne!(first, second);
        assert_eq!(
            store.confirm_send(first, ServerOutcome::Rejected),
            Err(StoreError::UnknownToken { token: first })
        );
    }

    #[test]
    fn attachment_send_keeps_local_file_until_server_url() {
        let mut store = open_store();
        let file = LocalFile { name: "cat.png".into(), content: Arc::from(&b"img"[..]) };
        let draft = Draft { receiver_id: PEER, body: None, attachment: Some(file) };
        let token = store.append_optimistic(&draft, at(0)).unwrap();

        let mut canonical = wire(7, VIEWER, "", 0);
        canonical.body = None;
        canonical.attachment = Some("https://cdn.example/u/cat.png".into());
        let message =
            store.confirm_send(token, ServerOutcome::Accepted(Some(canonical))).unwrap().unwrap();

        let remote = Attachment::Remote("https://cdn.example/u/cat.png".into());
        assert_eq!(message.attachment, Some(remote));
    }

    #[test]
    fn drafts_for_other_conversations_are_rejected() {
        let mut store = open_store();
        assert_eq!(
            store.append_optimistic(&Draft::text(9, "x"), at(0)),
            Err(StoreError::WrongConversation { receiver_id: 9, counterpart: PEER })
        );

        let mut closed = MessageStore::new(VIEWER);
        assert_eq!(
            closed.append_optimistic(&Draft::text(PEER, "x"), at(0)),
            Err(StoreError::NoConversation)
        );
    }

    #[test]
    fn mark_incoming_read_only_touches_counterpart_messages() {
        let mut store = open_store();
        store.replace(vec![wire(1, PEER, "a", 0), wire(2, VIEWER, "b", 1), wire(3, PEER, "c", 2)]);
        assert_eq!(store.mark_incoming_read(), 2);
        assert_eq!(store.mark_incoming_read(), 0);
        assert!(!store.get(&MessageId::Confirmed(2)).unwrap().is_read);
    }
}
