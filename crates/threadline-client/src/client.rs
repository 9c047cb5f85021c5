//! Client state machine.

use std::collections::HashMap;

use threadline_core::{
    ConversationError, ConversationList, Draft, Environment, LoadKind, LoadOutcome, LoadTicket,
    LocalFile, LocalToken, MessageId, MessagePreview, MessageStore, PaginationLoader, PinChange,
    PresenceAction, PresenceTracker, ServerId, ServerOutcome, StoreError, UserId,
};
use threadline_proto::{ApiRequest, ApiResponse, PushEvent, WireMessage};
use tracing::{debug, info, warn};

use crate::{
    ClientAction, ClientError, ClientEvent, IngestEffect, Notice, NoticeKind, RealtimeBridge,
    RealtimeStatus, RequestId, SessionContext, TransportError,
};

/// What an in-flight request was issued for.
#[derive(Debug, Clone)]
enum Pending {
    Listing,
    History(LoadTicket),
    Send { token: LocalToken, counterpart: UserId, previous: Option<MessagePreview> },
    Edit { id: ServerId, counterpart: UserId },
    Delete { id: ServerId, counterpart: UserId },
    Pin { user_id: UserId, pinned: bool },
    Favorite { user_id: UserId, favorite: bool },
    OnlineUsers,
    MarkRead { user_id: UserId },
}

/// Messenger sync engine for one viewer session.
///
/// Owns the message window of the open conversation, the conversation list,
/// the history loader, the presence tracker and the realtime bridge. All
/// mutations go through [`Client::handle`].
pub struct Client<E: Environment> {
    env: E,
    context: SessionContext,
    store: MessageStore,
    conversations: ConversationList,
    loader: PaginationLoader,
    presence: PresenceTracker<E::Instant>,
    realtime: RealtimeBridge,
    pending: HashMap<RequestId, Pending>,
    next_request: u64,
    started: bool,
}

impl<E: Environment> Client<E> {
    /// Create a client for the session described by `context`.
    pub fn new(env: E, context: SessionContext) -> Self {
        let viewer = context.viewer.id;
        Self {
            store: MessageStore::new(viewer),
            conversations: ConversationList::new(context.config.pin_limit),
            loader: PaginationLoader::new(context.config.page_size),
            presence: PresenceTracker::new(&context.config),
            realtime: RealtimeBridge::new(viewer),
            pending: HashMap::new(),
            next_request: 1,
            started: false,
            env,
            context,
        }
    }

    /// Session context.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Viewer user id.
    pub fn viewer(&self) -> UserId {
        self.context.viewer.id
    }

    /// Whether [`ClientEvent::Start`] has been handled.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Message window of the open conversation.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Conversation list.
    pub fn conversations(&self) -> &ConversationList {
        &self.conversations
    }

    /// History loader.
    pub fn loader(&self) -> &PaginationLoader {
        &self.loader
    }

    /// Presence tracker.
    pub fn presence(&self) -> &PresenceTracker<E::Instant> {
        &self.presence
    }

    /// Realtime subscription state.
    pub fn realtime_status(&self) -> &RealtimeStatus {
        self.realtime.status()
    }

    /// Counterpart of the open conversation.
    pub fn active_conversation(&self) -> Option<UserId> {
        self.conversations.active()
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Process an event and return resulting actions.
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::Start { now } => Ok(self.handle_start(now)),
            ClientEvent::Tick { now } => Ok(self.handle_tick(now)),
            ClientEvent::Activity { now } => {
                self.presence.on_activity(now);
                Ok(Vec::new())
            },
            ClientEvent::RefreshConversations => Ok(self.request_listing().into_iter().collect()),
            ClientEvent::OpenConversation { user_id } => self.handle_open(user_id),
            ClientEvent::CloseConversation => Ok(self.handle_close()),
            ClientEvent::Scrolled { rows_from_top } => {
                let threshold = self.context.config.load_threshold_rows;
                if self.loader.should_load_older(rows_from_top, threshold) {
                    Ok(self.handle_load_older())
                } else {
                    Ok(Vec::new())
                }
            },
            ClientEvent::LoadOlder => Ok(self.handle_load_older()),
            ClientEvent::Send { draft } => self.handle_send(draft),
            ClientEvent::Edit { id, body } => self.handle_edit(id, &body),
            ClientEvent::Delete { id } => self.handle_delete(id),
            ClientEvent::TogglePin { user_id } => self.handle_toggle_pin(user_id),
            ClientEvent::ToggleFavorite { user_id } => self.handle_toggle_favorite(user_id),
            ClientEvent::Push(push) => Ok(self.handle_push(push)),
            ClientEvent::PushUnavailable { reason } => {
                self.realtime.degrade(&reason);
                Ok(Vec::new())
            },
            ClientEvent::Response { request_id, result } => {
                Ok(self.handle_response(request_id, result))
            },
            ClientEvent::Teardown => Ok(self.handle_teardown()),
        }
    }

    fn handle_start(&mut self, now: E::Instant) -> Vec<ClientAction> {
        if self.started {
            debug!("session already started");
            return Vec::new();
        }
        self.started = true;
        info!(viewer = self.viewer(), "session started");

        let mut actions: Vec<ClientAction> = self.request_listing().into_iter().collect();
        let presence = self.presence.start(now);
        actions.extend(self.presence_actions(presence));
        if let Some(channels) = self.realtime.connect(&self.context) {
            actions.push(ClientAction::Subscribe(channels));
        }
        actions
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let due = self.presence.on_tick(now);
        self.presence_actions(due)
    }

    fn presence_actions(&mut self, due: Vec<PresenceAction>) -> Vec<ClientAction> {
        due.into_iter()
            .map(|action| match action {
                PresenceAction::SendHeartbeat => ClientAction::Beacon(ApiRequest::Heartbeat),
                PresenceAction::PollOnlineUsers => {
                    self.request(Pending::OnlineUsers, ApiRequest::OnlineUsers)
                },
            })
            .collect()
    }

    fn handle_open(&mut self, user_id: UserId) -> Result<Vec<ClientAction>, ClientError> {
        if !self.started {
            return Err(ClientError::NotStarted);
        }
        let cleared = self.conversations.activate(user_id)?;
        debug!(user_id, cleared, "conversation opened");

        self.store.open(user_id);
        let ticket = self.loader.load_initial(user_id);
        let history = self.loader.request(&ticket);

        Ok(vec![
            ClientAction::MessagesChanged,
            ClientAction::ConversationsChanged,
            self.request(Pending::History(ticket), history),
            self.request(Pending::MarkRead { user_id }, ApiRequest::MarkRead { user_id }),
        ])
    }

    fn handle_close(&mut self) -> Vec<ClientAction> {
        if self.conversations.active().is_none() {
            return Vec::new();
        }
        self.conversations.deactivate();
        self.store.close();
        self.loader.close();
        vec![ClientAction::MessagesChanged, ClientAction::ConversationsChanged]
    }

    fn handle_load_older(&mut self) -> Vec<ClientAction> {
        let Some(ticket) = self.loader.load_older() else {
            return Vec::new();
        };
        debug!(user_id = ticket.user_id, page = ticket.page, "loading older history");
        let request = self.loader.request(&ticket);
        vec![self.request(Pending::History(ticket), request)]
    }

    fn handle_send(&mut self, draft: Draft) -> Result<Vec<ClientAction>, ClientError> {
        let counterpart = self.store.counterpart().ok_or(ClientError::NoActiveConversation)?;
        let previous = self
            .conversations
            .get(counterpart)
            .and_then(|conversation| conversation.last_message.clone());

        let token = self.store.append_optimistic(&draft, self.env.wall_clock())?;
        if let Some(message) = self.store.get_by_token(token) {
            self.conversations.record_message(counterpart, MessagePreview::from(message), false)?;
        }

        let request = ApiRequest::Send {
            receiver_id: counterpart,
            body: draft.normalized_body(),
            attachment: draft.attachment.as_ref().map(LocalFile::to_upload),
        };
        Ok(vec![
            ClientAction::MessagesChanged,
            ClientAction::ConversationsChanged,
            ClientAction::ScrollToLatest,
            self.request(Pending::Send { token, counterpart, previous }, request),
        ])
    }

    fn handle_edit(&mut self, id: MessageId, body: &str) -> Result<Vec<ClientAction>, ClientError> {
        let counterpart = self.store.counterpart().ok_or(ClientError::NoActiveConversation)?;
        let message = self.store.get(&id).ok_or(StoreError::UnknownMessage { id })?;
        if message.sender_id != self.viewer() {
            return Err(StoreError::UnknownMessage { id }.into());
        }

        let server_id = id.server_id().ok_or(StoreError::NotConfirmed { id })?;
        self.store.edit_local(id, body, self.env.wall_clock())?;
        let new_body = self.store.get(&id).and_then(|message| message.body.clone());
        self.conversations.refresh_preview(counterpart, id, new_body.clone());

        let request =
            ApiRequest::Edit { message_id: server_id, body: new_body.unwrap_or_default() };
        Ok(vec![
            ClientAction::MessagesChanged,
            ClientAction::ConversationsChanged,
            self.request(Pending::Edit { id: server_id, counterpart }, request),
        ])
    }

    fn handle_delete(&mut self, id: MessageId) -> Result<Vec<ClientAction>, ClientError> {
        let counterpart = self.store.counterpart().ok_or(ClientError::NoActiveConversation)?;
        let message = self.store.get(&id).ok_or(StoreError::UnknownMessage { id })?;
        if message.sender_id != self.viewer() {
            return Err(StoreError::UnknownMessage { id }.into());
        }

        let server_id = id.server_id().ok_or(StoreError::NotConfirmed { id })?;
        self.store.remove(id)?;
        let fallback = self.store.last().map(MessagePreview::from);
        self.conversations.retract_last_message(counterpart, id, fallback);

        Ok(vec![
            ClientAction::MessagesChanged,
            ClientAction::ConversationsChanged,
            self.request(
                Pending::Delete { id: server_id, counterpart },
                ApiRequest::Delete { message_id: server_id },
            ),
        ])
    }

    fn handle_toggle_pin(&mut self, user_id: UserId) -> Result<Vec<ClientAction>, ClientError> {
        match self.conversations.toggle_pin(user_id) {
            Ok(change) => {
                let pinned = change == PinChange::Pinned;
                Ok(vec![
                    ClientAction::ConversationsChanged,
                    self.request(
                        Pending::Pin { user_id, pinned },
                        ApiRequest::TogglePin { user_id },
                    ),
                ])
            },
            Err(ConversationError::PinLimitReached { limit }) => {
                Ok(vec![ClientAction::Notice(Notice::new(
                    NoticeKind::PinLimitReached,
                    format!("You can pin up to {limit} conversations"),
                ))])
            },
            Err(error) => Err(error.into()),
        }
    }

    fn handle_toggle_favorite(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let favorite = self.conversations.toggle_favorite(user_id)?;
        Ok(vec![
            ClientAction::ConversationsChanged,
            self.request(
                Pending::Favorite { user_id, favorite },
                ApiRequest::ToggleFavorite { user_id },
            ),
        ])
    }

    fn handle_push(&mut self, push: PushEvent) -> Vec<ClientAction> {
        match push {
            PushEvent::MessageSent { message } => {
                let effect =
                    self.realtime.ingest_message(message, &mut self.store, &mut self.conversations);
                self.ingest_actions(effect)
            },
            PushEvent::UserOnline { user_id } => self.presence_change(user_id, true),
            PushEvent::UserOffline { user_id } => self.presence_change(user_id, false),
        }
    }

    fn ingest_actions(&mut self, effect: IngestEffect) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        if effect.messages_changed {
            actions.push(ClientAction::MessagesChanged);
        }
        if effect.conversations_changed {
            actions.push(ClientAction::ConversationsChanged);
        }
        if effect.read_in_place
            && let Some(user_id) = self.store.counterpart()
        {
            self.store.mark_incoming_read();
            actions.push(ClientAction::ScrollToLatest);
            let request = ApiRequest::MarkRead { user_id };
            actions.push(self.request(Pending::MarkRead { user_id }, request));
        }
        if let Some(user_id) = effect.unknown_counterpart {
            debug!(user_id, "message from unlisted user, refreshing listing");
            actions.extend(self.request_listing());
        }
        actions
    }

    fn presence_change(&mut self, user_id: UserId, online: bool) -> Vec<ClientAction> {
        if self.presence.apply_push(&mut self.conversations, user_id, online) {
            vec![ClientAction::ConversationsChanged]
        } else {
            Vec::new()
        }
    }

    fn handle_response(
        &mut self,
        request_id: RequestId,
        result: Result<ApiResponse, TransportError>,
    ) -> Vec<ClientAction> {
        let Some(pending) = self.pending.remove(&request_id) else {
            debug!(%request_id, "response for unknown request ignored");
            return Vec::new();
        };

        match (pending, result) {
            (Pending::Listing, Ok(ApiResponse::Conversations(users))) => {
                debug!(count = users.len(), "conversation listing loaded");
                self.conversations.merge_listing(users);
                vec![ClientAction::ConversationsChanged]
            },
            (Pending::Listing, result) => {
                warn!(%request_id, error = ?result.err(), "conversation listing failed");
                vec![ClientAction::Notice(Notice::new(
                    NoticeKind::ListingFailed,
                    "Could not load conversations",
                ))]
            },
            (Pending::History(ticket), Ok(ApiResponse::History(page))) => {
                self.complete_history(ticket, page.data, page.has_next_page)
            },
            (Pending::History(ticket), result) => {
                match self.loader.fail(ticket) {
                    LoadOutcome::Failed => {
                        warn!(
                            user_id = ticket.user_id,
                            page = ticket.page,
                            error = ?result.err(),
                            "history load failed"
                        );
                        vec![ClientAction::Notice(Notice::new(
                            NoticeKind::HistoryFailed,
                            "Could not load messages",
                        ))]
                    },
                    LoadOutcome::Stale | LoadOutcome::Applied { .. } => Vec::new(),
                }
            },
            (Pending::Send { token, counterpart, previous }, Ok(ApiResponse::Sent(canonical))) => {
                self.complete_send(token, counterpart, previous, ServerOutcome::Accepted(canonical))
            },
            (Pending::Send { token, counterpart, previous }, result) => {
                warn!(%token, error = ?result.err(), "send rejected");
                let mut actions =
                    self.complete_send(token, counterpart, previous, ServerOutcome::Rejected);
                actions.push(ClientAction::Notice(Notice::new(
                    NoticeKind::SendFailed,
                    "Message could not be sent",
                )));
                actions
            },
            (Pending::Edit { id, counterpart }, Ok(ApiResponse::Edited(canonical))) => {
                self.complete_edit(id, counterpart, ServerOutcome::Accepted(canonical))
            },
            (Pending::Edit { id, counterpart }, result) => {
                warn!(id, error = ?result.err(), "edit rejected");
                let mut actions = self.complete_edit(id, counterpart, ServerOutcome::Rejected);
                actions.push(ClientAction::Notice(Notice::new(
                    NoticeKind::EditFailed,
                    "Message could not be edited",
                )));
                actions
            },
            (Pending::Delete { id, counterpart }, result) => {
                let accepted = matches!(result, Ok(ApiResponse::Ack));
                if let Err(error) = self.store.confirm_remove(id, accepted) {
                    debug!(id, %error, "delete outcome for closed window");
                    return Vec::new();
                }
                if accepted {
                    return Vec::new();
                }

                warn!(id, error = ?result.err(), "delete rejected");
                if let Some(last) = self.store.last() {
                    let preview = MessagePreview::from(last);
                    let _ = self.conversations.record_message(counterpart, preview, false);
                }
                vec![
                    ClientAction::MessagesChanged,
                    ClientAction::ConversationsChanged,
                    ClientAction::Notice(Notice::new(
                        NoticeKind::DeleteFailed,
                        "Message could not be deleted",
                    )),
                ]
            },
            (Pending::Pin { user_id, pinned }, Ok(ApiResponse::Toggled(state))) => {
                if state.active == pinned {
                    return Vec::new();
                }
                debug!(user_id, server = state.active, "pin state differs from server");
                self.reconcile_pin(user_id, state.active);
                vec![ClientAction::ConversationsChanged]
            },
            (Pending::Pin { user_id, pinned }, result) => {
                warn!(user_id, error = ?result.err(), "pin toggle rejected, rolling back");
                self.reconcile_pin(user_id, !pinned);
                vec![
                    ClientAction::ConversationsChanged,
                    ClientAction::Notice(Notice::new(
                        NoticeKind::PinFailed,
                        "Pin could not be updated",
                    )),
                ]
            },
            (Pending::Favorite { user_id, favorite }, Ok(ApiResponse::Toggled(state))) => {
                if state.active == favorite
                    || self.conversations.set_favorite(user_id, state.active).is_err()
                {
                    return Vec::new();
                }
                vec![ClientAction::ConversationsChanged]
            },
            (Pending::Favorite { user_id, .. }, result) => {
                warn!(user_id, error = ?result.err(), "favorite toggle failed");
                Vec::new()
            },
            (Pending::OnlineUsers, Ok(ApiResponse::OnlineUsers(users))) => {
                if self.presence.apply_poll(&mut self.conversations, &users) > 0 {
                    vec![ClientAction::ConversationsChanged]
                } else {
                    Vec::new()
                }
            },
            (Pending::OnlineUsers, result) => {
                debug!(error = ?result.err(), "online-user poll failed");
                Vec::new()
            },
            (Pending::MarkRead { user_id }, result) => {
                if let Err(error) = result {
                    debug!(user_id, %error, "mark-read failed");
                }
                Vec::new()
            },
        }
    }

    fn complete_history(
        &mut self,
        ticket: LoadTicket,
        batch: Vec<WireMessage>,
        has_next_page: bool,
    ) -> Vec<ClientAction> {
        match self.loader.complete(ticket, has_next_page) {
            LoadOutcome::Applied { kind: LoadKind::Initial, .. } => {
                let placed = self.store.replace(batch);
                debug!(user_id = ticket.user_id, placed, "newest history loaded");
                if let Some(last) = self.store.last() {
                    let preview = MessagePreview::from(last);
                    let _ = self.conversations.record_message(ticket.user_id, preview, false);
                }
                vec![
                    ClientAction::MessagesChanged,
                    ClientAction::ConversationsChanged,
                    ClientAction::ScrollToLatest,
                ]
            },
            LoadOutcome::Applied { kind: LoadKind::Older, .. } => {
                let added = self.store.prepend_history(batch);
                debug!(user_id = ticket.user_id, page = ticket.page, added, "older history loaded");
                vec![
                    ClientAction::MessagesChanged,
                    ClientAction::HistoryPrepended { user_id: ticket.user_id, added },
                ]
            },
            LoadOutcome::Stale | LoadOutcome::Failed => Vec::new(),
        }
    }

    fn complete_send(
        &mut self,
        token: LocalToken,
        counterpart: UserId,
        previous: Option<MessagePreview>,
        outcome: ServerOutcome,
    ) -> Vec<ClientAction> {
        let pending_id = MessageId::Pending(token);
        if let ServerOutcome::Accepted(Some(canonical)) = &outcome {
            self.realtime.remember(canonical.id);
        }
        let canonical_preview = match &outcome {
            ServerOutcome::Accepted(Some(canonical)) => Some(MessagePreview::from(canonical)),
            ServerOutcome::Accepted(None) | ServerOutcome::Rejected => None,
        };
        let rejected = outcome == ServerOutcome::Rejected;

        match self.store.confirm_send(token, outcome) {
            Ok(Some(message)) => {
                let preview = MessagePreview::from(&message);
                self.conversations.confirm_last_message(counterpart, pending_id, preview.clone());
                // A later send may have been confirmed first.
                let _ = self.conversations.record_message(counterpart, preview, false);
            },
            Ok(None) => {
                let fallback = self.store.last().map(MessagePreview::from);
                self.conversations.retract_last_message(counterpart, pending_id, fallback);
            },
            Err(error) => {
                debug!(%token, %error, "send outcome for closed window");
                if rejected {
                    self.conversations.retract_last_message(counterpart, pending_id, previous);
                } else if let Some(preview) = canonical_preview {
                    let confirmed = preview.clone();
                    self.conversations.confirm_last_message(counterpart, pending_id, confirmed);
                    let _ = self.conversations.record_message(counterpart, preview, false);
                }
            },
        }
        vec![ClientAction::MessagesChanged, ClientAction::ConversationsChanged]
    }

    fn complete_edit(
        &mut self,
        id: ServerId,
        counterpart: UserId,
        outcome: ServerOutcome,
    ) -> Vec<ClientAction> {
        if let Err(error) = self.store.confirm_edit(id, outcome) {
            debug!(id, %error, "edit outcome for closed window");
            return Vec::new();
        }
        let message_id = MessageId::Confirmed(id);
        let body = self.store.get(&message_id).and_then(|message| message.body.clone());
        self.conversations.refresh_preview(counterpart, message_id, body);
        vec![ClientAction::MessagesChanged, ClientAction::ConversationsChanged]
    }

    fn reconcile_pin(&mut self, user_id: UserId, pinned: bool) {
        if let Err(error) = self.conversations.set_pinned(user_id, pinned) {
            warn!(user_id, pinned, %error, "pin state could not be applied");
        }
    }

    fn handle_teardown(&mut self) -> Vec<ClientAction> {
        if !self.started {
            return Vec::new();
        }
        self.started = false;
        info!(viewer = self.viewer(), "session ending");

        let mut actions = Vec::new();
        if self.presence.stop() {
            actions.push(ClientAction::Beacon(ApiRequest::GoOffline));
        }
        if let Some(channels) = self.realtime.disconnect() {
            actions.push(ClientAction::Unsubscribe(channels));
        }
        self.pending.clear();
        actions
    }

    fn request_listing(&mut self) -> Option<ClientAction> {
        if self.pending.values().any(|pending| matches!(pending, Pending::Listing)) {
            debug!("listing already in flight");
            return None;
        }
        Some(self.request(Pending::Listing, ApiRequest::ListConversations))
    }

    fn request(&mut self, pending: Pending, request: ApiRequest) -> ClientAction {
        let request_id = RequestId::new(self.next_request);
        self.next_request += 1;
        self.pending.insert(request_id, pending);
        ClientAction::Request { request_id, request }
    }
}
