//! Client session wired directly to the simulated backend.
//!
//! `SimSession` runs a sans-IO [`Client`] without the app layer: every
//! request action is executed against a [`SharedBackend`] and its response
//! fed straight back, and queued pushes on subscribed channels are delivered
//! until the client goes quiet. Several sessions may share one backend to
//! test viewers talking to each other.
//!
//! Responses of chosen kinds can be held back and released later, in order
//! or reversed.

use std::{
    collections::{HashSet, VecDeque},
    time::Duration,
};

use threadline_client::{
    Client, ClientAction, ClientError, ClientEvent, Environment, Notice, RequestId, SessionContext,
};
use threadline_proto::{ApiRequest, Channel, PushEvent, RequestKind};
use tracing::trace;

use crate::{
    SimEnv,
    invariants::ClientSnapshot,
    sim_backend::{SharedBackend, lock_backend},
};

/// Upper bound on actions processed per pump, to surface feedback loops.
const MAX_PUMP_ACTIONS: usize = 10_000;

/// A client plus the plumbing that executes its actions.
pub struct SimSession {
    env: SimEnv,
    backend: SharedBackend,
    client: Client<SimEnv>,
    subscriptions: HashSet<Channel>,
    held_kinds: HashSet<RequestKind>,
    held: Vec<(RequestId, ApiRequest)>,
    last_message_push: Option<PushEvent>,
    requests: Vec<ApiRequest>,
}

impl SimSession {
    /// New, not yet started session.
    pub fn new(env: SimEnv, backend: SharedBackend, context: SessionContext) -> Self {
        let client = Client::new(env.clone(), context);
        Self {
            env,
            backend,
            client,
            subscriptions: HashSet::new(),
            held_kinds: HashSet::new(),
            held: Vec::new(),
            last_message_push: None,
            requests: Vec::new(),
        }
    }

    /// Start the session and settle.
    pub fn start(&mut self) -> Vec<Notice> {
        let now = self.env.now();
        self.handle(ClientEvent::Start { now }).unwrap_or_default()
    }

    /// Feed one event and settle. Returns the notices raised on the way.
    ///
    /// # Errors
    ///
    /// The client's error for `event` itself; nothing is executed then.
    pub fn handle(
        &mut self,
        event: ClientEvent<<SimEnv as Environment>::Instant>,
    ) -> Result<Vec<Notice>, ClientError> {
        let actions = self.client.handle(event)?;
        Ok(self.pump(actions))
    }

    /// Deliver queued pushes and settle.
    pub fn sync(&mut self) -> Vec<Notice> {
        self.pump(Vec::new())
    }

    /// Advance the clock, tick and settle.
    pub fn advance(&mut self, by: Duration) -> Vec<Notice> {
        self.env.advance(by);
        let now = self.env.now();
        self.handle(ClientEvent::Tick { now }).unwrap_or_default()
    }

    /// Deliver the most recent `MessageSent` push a second time.
    pub fn redeliver_last(&mut self) -> Vec<Notice> {
        match self.last_message_push.clone() {
            Some(push) => self.handle(ClientEvent::Push(push)).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Hold back responses to requests of `kind`.
    pub fn hold(&mut self, kind: RequestKind) {
        self.held_kinds.insert(kind);
    }

    /// Number of held requests.
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Complete held requests in issue order, stop holding and settle.
    pub fn release_held(&mut self) -> Vec<Notice> {
        self.held_kinds.clear();
        let held = std::mem::take(&mut self.held);
        self.complete(held)
    }

    /// Complete held requests newest first, stop holding and settle.
    pub fn release_held_reversed(&mut self) -> Vec<Notice> {
        self.held_kinds.clear();
        let mut held = std::mem::take(&mut self.held);
        held.reverse();
        self.complete(held)
    }

    /// The client.
    pub fn client(&self) -> &Client<SimEnv> {
        &self.client
    }

    /// The shared backend.
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// The environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Channels currently subscribed.
    pub fn subscriptions(&self) -> &HashSet<Channel> {
        &self.subscriptions
    }

    /// Requests issued so far, beacons included.
    pub fn requests(&self) -> &[ApiRequest] {
        &self.requests
    }

    /// Observable state for invariant checks.
    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot::from_client(&self.client)
    }

    fn complete(&mut self, held: Vec<(RequestId, ApiRequest)>) -> Vec<Notice> {
        let viewer = self.client.viewer();
        let mut notices = Vec::new();
        for (request_id, request) in held {
            let result = lock_backend(&self.backend).execute(viewer, request_id, &request);
            if let Ok(actions) = self.client.handle(ClientEvent::Response { request_id, result }) {
                notices.extend(self.pump(actions));
            }
        }
        notices
    }

    /// Execute actions until neither actions nor deliverable pushes remain.
    fn pump(&mut self, actions: Vec<ClientAction>) -> Vec<Notice> {
        let viewer = self.client.viewer();
        let mut queue: VecDeque<ClientAction> = actions.into();
        let mut notices = Vec::new();
        let mut processed = 0;

        loop {
            while let Some(action) = queue.pop_front() {
                processed += 1;
                if processed > MAX_PUMP_ACTIONS {
                    tracing::warn!(processed, "pump limit reached");
                    return notices;
                }
                match action {
                    ClientAction::Request { request_id, request } => {
                        self.requests.push(request.clone());
                        if self.held_kinds.contains(&request.kind()) {
                            self.held.push((request_id, request));
                            continue;
                        }
                        let result =
                            lock_backend(&self.backend).execute(viewer, request_id, &request);
                        if let Ok(next) =
                            self.client.handle(ClientEvent::Response { request_id, result })
                        {
                            queue.extend(next);
                        }
                    },
                    ClientAction::Beacon(request) => {
                        self.requests.push(request.clone());
                        let mut backend = lock_backend(&self.backend);
                        let _ = backend.execute(viewer, RequestId::new(0), &request);
                    },
                    ClientAction::Subscribe(channels) => self.subscriptions.extend(channels),
                    ClientAction::Unsubscribe(channels) => {
                        for channel in &channels {
                            self.subscriptions.remove(channel);
                        }
                    },
                    ClientAction::Notice(notice) => notices.push(notice),
                    ClientAction::MessagesChanged
                    | ClientAction::ConversationsChanged
                    | ClientAction::HistoryPrepended { .. }
                    | ClientAction::ScrollToLatest => {},
                }
            }

            let deliveries = lock_backend(&self.backend).take_pushes_for(viewer);
            if deliveries.is_empty() {
                return notices;
            }
            for delivery in deliveries {
                if !self.subscriptions.contains(&delivery.channel) {
                    trace!(channel = %delivery.channel, "push dropped, not subscribed");
                    continue;
                }
                if matches!(delivery.event, PushEvent::MessageSent { .. }) {
                    self.last_message_push = Some(delivery.event.clone());
                }
                if let Ok(next) = self.client.handle(ClientEvent::Push(delivery.event)) {
                    queue.extend(next);
                }
            }
        }
    }
}
