//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the CLI's network driver but
//! for deterministic testing. It implements [`Driver`] so the same
//! [`threadline_app::Runtime`] orchestration code runs in both production and
//! simulation.
//!
//! Requests execute synchronously against a [`SharedBackend`]; their
//! completions and the backend's queued pushes travel through a real
//! [`EventBus`], exactly like the network driver's. Tests can hold back
//! responses of chosen kinds and release them later, in order or reversed,
//! to reproduce slow and out-of-order completions, and can take realtime
//! down to exercise the polling fallback.

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use threadline_app::{
    App, AppAction, AppEvent, BusReceiver, DEFAULT_BUS_CAPACITY, Driver, EventBus, Inbound,
    Runtime,
};
use threadline_client::{Environment, RequestId};
use threadline_core::UserId;
use threadline_proto::{ApiRequest, Channel, RequestKind};
use tracing::{debug, trace};

use crate::{
    SimEnv,
    invariants::{ClientSnapshot, InvariantRegistry, SystemSnapshot},
    sim_backend::{SharedBackend, lock_backend},
    sim_env::SimInstant,
};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// Shared state for event injection.
///
/// This allows injection from outside async contexts.
#[derive(Default)]
struct SharedState {
    pending_events: VecDeque<AppEvent>,
    held_kinds: HashSet<RequestKind>,
    held: Vec<(RequestId, ApiRequest)>,
    subscriptions: HashSet<Channel>,
    realtime_down: bool,
    executed: Vec<ApiRequest>,
    beacons: Vec<ApiRequest>,
    renders: usize,
    stopped: bool,
}

/// Simulation driver for deterministic testing.
///
/// Implements [`Driver`] trait so the same [`threadline_app::Runtime`]
/// orchestration code runs in both production and simulation tests.
pub struct SimDriver {
    viewer: UserId,
    env: SimEnv,
    backend: SharedBackend,
    bus: EventBus,
    receiver: BusReceiver,
    state: Arc<Mutex<SharedState>>,
    invariants: Option<(InvariantRegistry, usize)>,
}

impl SimDriver {
    /// Create a driver for `viewer` against `backend`.
    pub fn new(viewer: UserId, env: SimEnv, backend: SharedBackend) -> Self {
        let (bus, receiver) = EventBus::bounded(DEFAULT_BUS_CAPACITY);
        Self {
            viewer,
            env,
            backend,
            bus,
            receiver,
            state: Arc::new(Mutex::new(SharedState::default())),
            invariants: None,
        }
    }

    /// Enable invariant checking on every render. The app does not know the
    /// pin limit, so it is passed here.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry, pin_limit: usize) -> Self {
        self.invariants = Some((registry, pin_limit));
        self
    }

    /// Viewer this driver acts for.
    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    /// Shared backend.
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// Inject an `AppEvent` for processing.
    pub fn inject_event(&self, event: AppEvent) {
        self.lock().pending_events.push_back(event);
    }

    /// Inject a tick event.
    pub fn inject_tick(&self) {
        self.lock().pending_events.push_back(AppEvent::Tick);
    }

    /// Hold back responses to requests of `kind` until released.
    pub fn hold(&self, kind: RequestKind) {
        self.lock().held_kinds.insert(kind);
    }

    /// Number of requests currently held back.
    pub fn held_count(&self) -> usize {
        self.lock().held.len()
    }

    /// Execute held requests in the order they were issued and stop holding.
    pub fn release_held(&self) {
        let held = self.take_held();
        self.complete_all(held);
    }

    /// Execute held requests newest first and stop holding.
    pub fn release_held_reversed(&self) {
        let mut held = self.take_held();
        held.reverse();
        self.complete_all(held);
    }

    /// Take realtime down. Later subscriptions fail and queued pushes are
    /// dropped.
    pub fn set_realtime_down(&self, down: bool) {
        self.lock().realtime_down = down;
    }

    /// Channels currently subscribed.
    pub fn subscriptions(&self) -> HashSet<Channel> {
        self.lock().subscriptions.clone()
    }

    /// Requests executed (or held) so far, in issue order.
    pub fn executed(&self) -> Vec<ApiRequest> {
        self.lock().executed.clone()
    }

    /// Beacons sent so far.
    pub fn beacons(&self) -> Vec<ApiRequest> {
        self.lock().beacons.clone()
    }

    /// Number of renders.
    pub fn render_count(&self) -> usize {
        self.lock().renders
    }

    /// Whether [`Driver::stop`] was called.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Check if there are pending events to process.
    pub fn has_pending(&self) -> bool {
        !self.lock().pending_events.is_empty()
            || !self.receiver.is_empty()
            || lock_backend(&self.backend).has_pushes_for(self.viewer)
    }

    /// Check invariants against App state.
    pub fn check_invariants(&self, app: &App, context: &str) {
        if let Some((registry, pin_limit)) = &self.invariants {
            let snapshot =
                SystemSnapshot::single(ClientSnapshot::from_app(app, self.viewer, *pin_limit));
            registry.assert_all(&snapshot, context);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_held(&self) -> Vec<(RequestId, ApiRequest)> {
        let mut state = self.lock();
        state.held_kinds.clear();
        std::mem::take(&mut state.held)
    }

    fn complete_all(&self, requests: Vec<(RequestId, ApiRequest)>) {
        for (request_id, request) in requests {
            let result = lock_backend(&self.backend).execute(self.viewer, request_id, &request);
            self.bus.publish(Inbound::Response { request_id, result });
        }
    }

    /// Move the backend's pushes for this viewer onto the bus, keeping only
    /// those on subscribed channels.
    fn deliver_pushes(&self) {
        let deliveries = lock_backend(&self.backend).take_pushes_for(self.viewer);
        let state = self.lock();
        for delivery in deliveries {
            if state.realtime_down || !state.subscriptions.contains(&delivery.channel) {
                trace!(channel = %delivery.channel, "push dropped");
                continue;
            }
            self.bus.publish(Inbound::Push(delivery.event));
        }
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    async fn poll_event(&mut self, app: &mut App) -> Result<Vec<AppAction>, Self::Error> {
        let event = self.lock().pending_events.pop_front();
        Ok(event.map(|event| app.handle(event)).unwrap_or_default())
    }

    async fn execute(
        &mut self,
        request_id: RequestId,
        request: ApiRequest,
    ) -> Result<(), Self::Error> {
        let held = {
            let mut state = self.lock();
            state.executed.push(request.clone());
            if state.held_kinds.contains(&request.kind()) {
                state.held.push((request_id, request.clone()));
                true
            } else {
                false
            }
        };
        if held {
            debug!(%request_id, kind = ?request.kind(), "response held");
            return Ok(());
        }

        let result = lock_backend(&self.backend).execute(self.viewer, request_id, &request);
        if self.bus.publish_wait(Inbound::Response { request_id, result }).await {
            Ok(())
        } else {
            Err(SimDriverError("event bus closed".into()))
        }
    }

    async fn beacon(&mut self, request: ApiRequest) -> Result<(), Self::Error> {
        self.lock().beacons.push(request.clone());
        let _ = lock_backend(&self.backend).execute(self.viewer, RequestId::new(0), &request);
        Ok(())
    }

    async fn subscribe(&mut self, channels: Vec<Channel>) -> Result<(), Self::Error> {
        let down = {
            let mut state = self.lock();
            if !state.realtime_down {
                state.subscriptions.extend(channels);
            }
            state.realtime_down
        };
        if down {
            let reason = "simulated realtime outage".into();
            self.bus.publish(Inbound::PushUnavailable { reason });
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, channels: Vec<Channel>) -> Result<(), Self::Error> {
        let mut state = self.lock();
        for channel in &channels {
            state.subscriptions.remove(channel);
        }
        Ok(())
    }

    async fn recv_inbound(&mut self) -> Option<Inbound> {
        self.deliver_pushes();
        self.receiver.try_recv()
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn render(&mut self, app: &App) -> Result<(), Self::Error> {
        self.lock().renders += 1;
        self.check_invariants(app, "after render");
        Ok(())
    }

    fn stop(&mut self) {
        self.lock().stopped = true;
    }
}

/// Step `runtime` until the driver has nothing left to deliver.
///
/// Returns `true` if the app asked to quit. Gives up after `max_cycles`.
///
/// # Errors
///
/// Propagates driver errors.
pub async fn run_until_idle(
    runtime: &mut Runtime<SimDriver, SimEnv>,
    max_cycles: usize,
) -> Result<bool, SimDriverError> {
    for _ in 0..max_cycles {
        if runtime.step().await? {
            return Ok(true);
        }
        if !runtime.driver().has_pending() {
            return Ok(false);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use threadline_app::KeyInput;
    use threadline_proto::{ApiResponse, PushEvent};

    use super::*;
    use crate::sim_backend::create_shared_backend;

    fn driver() -> SimDriver {
        let env = SimEnv::with_seed(3);
        let backend = create_shared_backend(env.clone());
        lock_backend(&backend).add_users(3);
        SimDriver::new(1, env, backend)
    }

    #[test]
    fn inject_event_queues_event() {
        let driver = driver();
        driver.inject_event(AppEvent::Key(KeyInput::Char('a')));

        assert!(driver.has_pending());
    }

    #[tokio::test]
    async fn poll_event_processes_event() {
        let mut driver = driver();
        let mut app = App::new();
        driver.inject_event(AppEvent::Key(KeyInput::Char('a')));

        let actions = driver.poll_event(&mut app).await.unwrap();
        assert!(actions.contains(&AppAction::Render));
        assert_eq!(app.composer().text(), "a");
    }

    #[tokio::test]
    async fn execute_publishes_response() {
        let mut driver = driver();

        driver.execute(RequestId::new(4), ApiRequest::ListConversations).await.unwrap();

        let Some(Inbound::Response { result: Ok(ApiResponse::Conversations(users)), .. }) =
            driver.recv_inbound().await
        else {
            panic!("expected a listing response");
        };
        assert_eq!(users.len(), 2);
    }

    #[tokio::test]
    async fn held_responses_release_reversed() {
        let mut driver = driver();
        driver.hold(RequestKind::History);

        for (raw, page) in [(1, 1), (2, 2)] {
            let request = ApiRequest::History { user_id: 2, page, page_size: 20 };
            driver.execute(RequestId::new(raw), request).await.unwrap();
        }
        assert_eq!(driver.held_count(), 2);
        assert!(driver.recv_inbound().await.is_none());

        driver.release_held_reversed();

        let Some(Inbound::Response { request_id, .. }) = driver.recv_inbound().await else {
            panic!("expected a held response");
        };
        assert_eq!(request_id, RequestId::new(2));
    }

    #[tokio::test]
    async fn pushes_only_reach_subscribed_channels() {
        let mut driver = driver();
        lock_backend(driver.backend()).post_message(2, 1, "before subscribe");
        assert!(driver.recv_inbound().await.is_none());

        driver.subscribe(vec![Channel::Private { user_id: 1 }]).await.unwrap();
        lock_backend(driver.backend()).post_message(2, 1, "after subscribe");

        let Some(Inbound::Push(PushEvent::MessageSent { message })) = driver.recv_inbound().await
        else {
            panic!("expected a pushed message");
        };
        assert_eq!(message.body.as_deref(), Some("after subscribe"));
    }

    #[tokio::test]
    async fn realtime_outage_fails_subscription() {
        let mut driver = driver();
        driver.set_realtime_down(true);

        driver.subscribe(vec![Channel::Presence]).await.unwrap();

        assert!(matches!(driver.recv_inbound().await, Some(Inbound::PushUnavailable { .. })));
        assert!(driver.subscriptions().is_empty());
    }
}
