//! Conversation List Reducer
//!
//! Holds one [`Conversation`] per counterpart and is the only writer of pin,
//! favorite, presence, unread and last-message state. The displayed list is
//! derived on demand through [`ListFilter`].
//!
//! # Invariants
//!
//! - At most `pin_limit` conversations are pinned.
//! - The active conversation has `unread_count == 0`.
//! - Derived ordering: pinned first, then most recent activity, then
//!   conversations with no messages; ties keep listing order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use threadline_proto::{OnlineUser, UserId, WireMessage, WireUser};
use tracing::{debug, warn};

use crate::{ConversationError, Message, MessageId};

/// Profile snapshot of a counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Profile {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Avatar URL.
    pub avatar: Option<String>,
}

/// Summary of the newest message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePreview {
    /// Message the preview was taken from.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Text body.
    pub body: Option<String>,
    /// Whether the message carries an attachment.
    pub has_attachment: bool,
    /// Creation time; drives list ordering.
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessagePreview {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            body: message.body.clone(),
            has_attachment: message.attachment.is_some(),
            created_at: message.created_at,
        }
    }
}

impl From<&WireMessage> for MessagePreview {
    fn from(message: &WireMessage) -> Self {
        Self {
            id: MessageId::Confirmed(message.id),
            sender_id: message.sender_id,
            body: message.body.clone(),
            has_attachment: message.attachment.is_some(),
            created_at: message.created_at,
        }
    }
}

/// Conversation with one counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// Counterpart user id.
    pub user_id: UserId,
    /// Counterpart profile.
    pub profile: Profile,
    /// Newest message exchanged.
    pub last_message: Option<MessagePreview>,
    /// Messages from the counterpart not yet read.
    pub unread_count: u32,
    /// Counterpart presence.
    pub is_online: bool,
    /// Pinned to the top of the list.
    pub is_pinned: bool,
    /// Listed under the favorites tab.
    pub is_favorite: bool,
}

impl Conversation {
    /// Conversation known only by id, until a listing refresh fills it in.
    pub fn placeholder(user_id: UserId) -> Self {
        Self {
            user_id,
            profile: Profile { name: format!("User {user_id}"), ..Profile::default() },
            last_message: None,
            unread_count: 0,
            is_online: false,
            is_pinned: false,
            is_favorite: false,
        }
    }

    fn from_wire(user: WireUser) -> Self {
        Self {
            user_id: user.id,
            last_message: user.last_message.as_ref().map(MessagePreview::from),
            profile: Profile { name: user.name, email: user.email, avatar: user.avatar },
            unread_count: user.unread_count,
            is_online: user.is_online,
            is_pinned: user.is_pinned,
            is_favorite: user.is_favorite,
        }
    }

    fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_message.as_ref().map(|preview| preview.created_at)
    }
}

/// List tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    /// Every conversation.
    #[default]
    All,
    /// Favorites only.
    Favorites,
}

/// Search and tab selection applied to the list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListFilter {
    /// Case-insensitive substring matched against name and email.
    pub search: String,
    /// Selected tab.
    pub tab: Tab,
}

impl ListFilter {
    /// Whether `conversation` passes the search and tab.
    pub fn matches(&self, conversation: &Conversation) -> bool {
        if self.tab == Tab::Favorites && !conversation.is_favorite {
            return false;
        }

        let needle = self.search.trim().to_lowercase();
        needle.is_empty()
            || conversation.profile.name.to_lowercase().contains(&needle)
            || conversation.profile.email.to_lowercase().contains(&needle)
    }

    /// Filter and sort `conversations`, given in listing order.
    pub fn apply<'a>(
        &self,
        conversations: impl IntoIterator<Item = &'a Conversation>,
    ) -> Vec<&'a Conversation> {
        let mut visible: Vec<&Conversation> =
            conversations.into_iter().filter(|conversation| self.matches(conversation)).collect();
        visible.sort_by(|a, b| {
            b.is_pinned.cmp(&a.is_pinned).then_with(|| b.last_activity().cmp(&a.last_activity()))
        });
        visible
    }
}

/// Result of a pin toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinChange {
    /// Conversation is now pinned.
    Pinned,
    /// Conversation is now unpinned.
    Unpinned,
}

/// Conversation list reducer.
#[derive(Debug, Clone)]
pub struct ConversationList {
    conversations: Vec<Conversation>,
    index: HashMap<UserId, usize>,
    active: Option<UserId>,
    pin_limit: usize,
}

impl ConversationList {
    /// Empty list enforcing `pin_limit`.
    pub fn new(pin_limit: usize) -> Self {
        Self { conversations: Vec::new(), index: HashMap::new(), active: None, pin_limit }
    }

    /// Merge a user listing.
    ///
    /// New users are appended in listing order. Known users take the fresh
    /// profile and a newer last message, but keep local pin, favorite, unread
    /// and presence state. Server pins beyond the limit are dropped.
    pub fn merge_listing(&mut self, users: Vec<WireUser>) {
        for user in users {
            match self.index.get(&user.id).copied() {
                Some(position) => {
                    let existing = &mut self.conversations[position];
                    existing.profile =
                        Profile { name: user.name, email: user.email, avatar: user.avatar };
                    if let Some(wire) = &user.last_message {
                        let preview = MessagePreview::from(wire);
                        if existing.last_activity().is_none_or(|known| preview.created_at >= known)
                        {
                            existing.last_message = Some(preview);
                        }
                    }
                },
                None => {
                    let mut conversation = Conversation::from_wire(user);
                    if conversation.is_pinned && self.pinned_count() >= self.pin_limit {
                        let user_id = conversation.user_id;
                        warn!(user_id, "listing exceeds pin limit, unpinning");
                        conversation.is_pinned = false;
                    }
                    if Some(conversation.user_id) == self.active {
                        conversation.unread_count = 0;
                    }
                    self.push(conversation);
                },
            }
        }
    }

    /// Insert a placeholder for an unknown counterpart. Returns whether one was
    /// inserted.
    pub fn ensure(&mut self, user_id: UserId) -> bool {
        if self.index.contains_key(&user_id) {
            return false;
        }
        debug!(user_id, "placeholder conversation created");
        self.push(Conversation::placeholder(user_id));
        true
    }

    /// Number of conversations.
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Conversations in listing order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Conversation> {
        self.conversations.iter()
    }

    /// Owned copy in listing order.
    pub fn snapshot(&self) -> Vec<Conversation> {
        self.conversations.clone()
    }

    /// Look up a conversation.
    pub fn get(&self, user_id: UserId) -> Option<&Conversation> {
        self.index.get(&user_id).map(|&position| &self.conversations[position])
    }

    /// Counterpart of the active conversation.
    pub fn active(&self) -> Option<UserId> {
        self.active
    }

    /// Configured pin limit.
    pub fn pin_limit(&self) -> usize {
        self.pin_limit
    }

    /// Number of pinned conversations.
    pub fn pinned_count(&self) -> usize {
        self.conversations.iter().filter(|conversation| conversation.is_pinned).count()
    }

    /// Sum of unread counts.
    pub fn unread_total(&self) -> u32 {
        self.conversations.iter().map(|conversation| conversation.unread_count).sum()
    }

    /// Filtered, sorted view.
    pub fn view(&self, filter: &ListFilter) -> Vec<&Conversation> {
        filter.apply(&self.conversations)
    }

    /// Make `user_id` the active conversation and clear its unread count.
    /// Returns the unread count that was cleared.
    ///
    /// # Errors
    ///
    /// - `ConversationError::UnknownConversation` if no such conversation
    pub fn activate(&mut self, user_id: UserId) -> Result<u32, ConversationError> {
        let conversation = self.get_mut(user_id)?;
        let cleared = std::mem::take(&mut conversation.unread_count);
        self.active = Some(user_id);
        Ok(cleared)
    }

    /// Leave the active conversation.
    pub fn deactivate(&mut self) {
        self.active = None;
    }

    /// Flip the pin flag.
    ///
    /// # Errors
    ///
    /// - `ConversationError::UnknownConversation` if no such conversation
    /// - `ConversationError::PinLimitReached` if pinning would exceed the
    ///   limit; nothing changes
    pub fn toggle_pin(&mut self, user_id: UserId) -> Result<PinChange, ConversationError> {
        let pinned = self.get(user_id).map(|conversation| conversation.is_pinned).ok_or(
            ConversationError::UnknownConversation { user_id },
        )?;
        self.set_pinned(user_id, !pinned)?;
        Ok(if pinned { PinChange::Unpinned } else { PinChange::Pinned })
    }

    /// Set the pin flag, enforcing the limit. Used to roll back or reconcile a
    /// toggle with the server's state.
    ///
    /// # Errors
    ///
    /// - `ConversationError::UnknownConversation` if no such conversation
    /// - `ConversationError::PinLimitReached` if pinning would exceed the limit
    pub fn set_pinned(&mut self, user_id: UserId, pinned: bool) -> Result<(), ConversationError> {
        let limit = self.pin_limit;
        let at_limit = self.pinned_count() >= limit;
        let conversation = self.get_mut(user_id)?;
        if pinned && !conversation.is_pinned && at_limit {
            return Err(ConversationError::PinLimitReached { limit });
        }
        conversation.is_pinned = pinned;
        Ok(())
    }

    /// Flip the favorite flag. Returns the new value.
    ///
    /// # Errors
    ///
    /// - `ConversationError::UnknownConversation` if no such conversation
    pub fn toggle_favorite(&mut self, user_id: UserId) -> Result<bool, ConversationError> {
        let conversation = self.get_mut(user_id)?;
        conversation.is_favorite = !conversation.is_favorite;
        Ok(conversation.is_favorite)
    }

    /// Set the favorite flag.
    ///
    /// # Errors
    ///
    /// - `ConversationError::UnknownConversation` if no such conversation
    pub fn set_favorite(
        &mut self,
        user_id: UserId,
        favorite: bool,
    ) -> Result<(), ConversationError> {
        self.get_mut(user_id)?.is_favorite = favorite;
        Ok(())
    }

    /// Record a message exchanged with `counterpart`.
    ///
    /// Updates the last message unless a newer one is already recorded, and
    /// counts it as unread when it is inbound and the conversation is not
    /// active.
    ///
    /// # Errors
    ///
    /// - `ConversationError::UnknownConversation` if no such conversation
    pub fn record_message(
        &mut self,
        counterpart: UserId,
        preview: MessagePreview,
        inbound: bool,
    ) -> Result<(), ConversationError> {
        let active = self.active;
        let conversation = self.get_mut(counterpart)?;
        if inbound && active != Some(counterpart) {
            conversation.unread_count = conversation.unread_count.saturating_add(1);
        }
        if conversation.last_activity().is_none_or(|known| preview.created_at >= known) {
            conversation.last_message = Some(preview);
        }
        Ok(())
    }

    /// Swap the last message from `previous` to its confirmed form.
    ///
    /// No-op if the last message is no longer `previous`.
    pub fn confirm_last_message(
        &mut self,
        counterpart: UserId,
        previous: MessageId,
        confirmed: MessagePreview,
    ) {
        if let Ok(conversation) = self.get_mut(counterpart)
            && conversation.last_message.as_ref().is_some_and(|last| last.id == previous)
        {
            conversation.last_message = Some(confirmed);
        }
    }

    /// Replace the last message with `fallback` if it is still `retracted`.
    pub fn retract_last_message(
        &mut self,
        counterpart: UserId,
        retracted: MessageId,
        fallback: Option<MessagePreview>,
    ) {
        if let Ok(conversation) = self.get_mut(counterpart)
            && conversation.last_message.as_ref().is_some_and(|last| last.id == retracted)
        {
            conversation.last_message = fallback;
        }
    }

    /// Update the body shown for `id` after an edit or its rollback.
    pub fn refresh_preview(&mut self, counterpart: UserId, id: MessageId, body: Option<String>) {
        if let Ok(conversation) = self.get_mut(counterpart)
            && let Some(last) = conversation.last_message.as_mut()
            && last.id == id
        {
            last.body = body;
        }
    }

    /// Apply a presence change. Returns whether anything changed.
    pub fn set_online(&mut self, user_id: UserId, online: bool) -> bool {
        match self.get_mut(user_id) {
            Ok(conversation) if conversation.is_online != online => {
                conversation.is_online = online;
                true
            },
            _ => false,
        }
    }

    /// Merge a polled online-user set by id. Users absent from the set keep
    /// their state. Returns how many changed.
    pub fn merge_online(&mut self, users: &[OnlineUser]) -> usize {
        users.iter().filter(|user| self.set_online(user.id, user.is_online)).count()
    }

    fn push(&mut self, conversation: Conversation) {
        self.index.insert(conversation.user_id, self.conversations.len());
        self.conversations.push(conversation);
    }

    fn get_mut(&mut self, user_id: UserId) -> Result<&mut Conversation, ConversationError> {
        let position =
            *self.index.get(&user_id).ok_or(ConversationError::UnknownConversation { user_id })?;
        Ok(&mut self.conversations[position])
    }
}
