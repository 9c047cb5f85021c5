//! Sync-to-Application translation layer.
//!
//! The [`Bridge`] wraps the sans-IO [`threadline_client::Client`] and adapts
//! it to the application lifecycle.
//!
//! # Responsibilities
//!
//! - Converts [`crate::AppAction`]s into client events.
//! - Accumulates [`Outbound`] I/O (requests, beacons, channel subscriptions)
//!   for the driver to perform in the next cycle.
//! - Interprets client actions and publishes fresh snapshots of the
//!   conversation list and message window as [`crate::AppEvent`]s, once per
//!   batch.
//! - Manages time ticks generically to support both real time and
//!   deterministic simulation.

use threadline_client::{
    Client, ClientAction, ClientError, ClientEvent, Environment, RealtimeStatus, RequestId,
    SessionContext,
};
use threadline_proto::{ApiRequest, Channel};

use crate::{AppAction, AppEvent, Inbound};

/// I/O the driver performs on behalf of the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Execute a request and publish its completion on the bus.
    Request {
        /// Id the completion is reported under.
        request_id: RequestId,
        /// Request to execute.
        request: ApiRequest,
    },
    /// Execute a request and ignore the outcome.
    Beacon(ApiRequest),
    /// Subscribe to push channels.
    Subscribe(Vec<Channel>),
    /// Unsubscribe from push channels.
    Unsubscribe(Vec<Channel>),
}

/// Bridge between App and Client sync logic.
///
/// Generic over Environment to support both production and simulation.
pub struct Bridge<E: Environment> {
    env: E,
    client: Client<E>,
    outgoing: Vec<Outbound>,
    published_realtime: RealtimeStatus,
}

impl<E: Environment> Bridge<E> {
    /// Create a bridge for the session described by `context`.
    pub fn new(env: E, context: SessionContext) -> Self {
        let client = Client::new(env.clone(), context);
        Self { env, client, outgoing: Vec::new(), published_realtime: RealtimeStatus::Idle }
    }

    /// Viewer user id.
    pub fn viewer(&self) -> u64 {
        self.client.viewer()
    }

    /// Wrapped client, for inspection.
    pub fn client(&self) -> &Client<E> {
        &self.client
    }

    /// Start the session.
    pub fn start(&mut self, now: E::Instant) -> Vec<AppEvent> {
        let result = self.client.handle(ClientEvent::Start { now });
        let mut events = vec![AppEvent::Started { viewer: self.client.viewer() }];
        events.extend(self.handle_client_result(result));
        events
    }

    /// Process an App action and return resulting App events.
    pub fn process_app_action(&mut self, action: AppAction) -> Vec<AppEvent> {
        let event = match action {
            AppAction::Activity => ClientEvent::Activity { now: self.env.now() },
            AppAction::Refresh => ClientEvent::RefreshConversations,
            AppAction::OpenConversation { user_id } => ClientEvent::OpenConversation { user_id },
            AppAction::CloseConversation => ClientEvent::CloseConversation,
            AppAction::SendMessage { draft } => ClientEvent::Send { draft },
            AppAction::EditMessage { id, body } => ClientEvent::Edit { id, body },
            AppAction::DeleteMessage { id } => ClientEvent::Delete { id },
            AppAction::TogglePin { user_id } => ClientEvent::TogglePin { user_id },
            AppAction::ToggleFavorite { user_id } => ClientEvent::ToggleFavorite { user_id },
            AppAction::Scrolled { rows_from_top } => ClientEvent::Scrolled { rows_from_top },
            AppAction::LoadOlder => ClientEvent::LoadOlder,
            AppAction::Render | AppAction::Quit => return vec![],
        };
        let result = self.client.handle(event);
        self.handle_client_result(result)
    }

    /// Handle something that arrived on the bus.
    pub fn handle_inbound(&mut self, inbound: Inbound) -> Vec<AppEvent> {
        let event = match inbound {
            Inbound::Response { request_id, result } => {
                ClientEvent::Response { request_id, result }
            },
            Inbound::Push(push) => ClientEvent::Push(push),
            Inbound::PushUnavailable { reason } => ClientEvent::PushUnavailable { reason },
        };
        let result = self.client.handle(event);
        self.handle_client_result(result)
    }

    /// Process a time tick.
    pub fn handle_tick(&mut self, now: E::Instant) -> Vec<AppEvent> {
        let result = self.client.handle(ClientEvent::Tick { now });
        self.handle_client_result(result)
    }

    /// End the session.
    pub fn teardown(&mut self) -> Vec<AppEvent> {
        let result = self.client.handle(ClientEvent::Teardown);
        let mut events = self.handle_client_result(result);
        events.push(AppEvent::Stopped);
        events
    }

    /// Take pending outbound I/O.
    pub fn take_outgoing(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outgoing)
    }

    fn handle_client_result(
        &mut self,
        result: Result<Vec<ClientAction>, ClientError>,
    ) -> Vec<AppEvent> {
        match result {
            Ok(actions) => self.process_client_actions(actions),
            Err(e) => vec![AppEvent::Error { message: e.to_string() }],
        }
    }

    fn process_client_actions(&mut self, actions: Vec<ClientAction>) -> Vec<AppEvent> {
        let mut notices = Vec::new();
        let mut conversations_changed = false;
        let mut messages_changed = false;
        let mut prepended = false;
        let mut scroll_to_latest = false;

        for action in actions {
            match action {
                ClientAction::Request { request_id, request } => {
                    self.outgoing.push(Outbound::Request { request_id, request });
                },
                ClientAction::Beacon(request) => self.outgoing.push(Outbound::Beacon(request)),
                ClientAction::Subscribe(channels) => {
                    self.outgoing.push(Outbound::Subscribe(channels));
                },
                ClientAction::Unsubscribe(channels) => {
                    self.outgoing.push(Outbound::Unsubscribe(channels));
                },
                ClientAction::MessagesChanged => messages_changed = true,
                ClientAction::ConversationsChanged => conversations_changed = true,
                ClientAction::HistoryPrepended { .. } => {
                    messages_changed = true;
                    prepended = true;
                },
                ClientAction::ScrollToLatest => scroll_to_latest = true,
                ClientAction::Notice(notice) => notices.push(AppEvent::Notice(notice)),
            }
        }

        let mut events = Vec::new();
        if conversations_changed {
            events.push(AppEvent::ConversationsUpdated {
                conversations: self.client.conversations().snapshot(),
                active: self.client.active_conversation(),
            });
        }
        if messages_changed {
            events.push(AppEvent::MessagesUpdated {
                user_id: self.client.store().counterpart(),
                messages: self.client.store().snapshot(),
                keep_anchor: prepended,
            });
        }
        if scroll_to_latest {
            events.push(AppEvent::ScrollToLatest);
        }
        if self.client.realtime_status() != &self.published_realtime {
            self.published_realtime = self.client.realtime_status().clone();
            events.push(AppEvent::RealtimeChanged(self.published_realtime.clone()));
        }
        events.extend(notices);
        events
    }
}
