//! Generic runtime for application orchestration.
//!
//! The Runtime drives the application event loop, coordinating between:
//! - [`App`]: UI state machine
//! - [`Bridge`]: sync bridge to the Client
//! - [`Driver`]: Platform-specific I/O

use threadline_client::{Environment, SessionContext};
use tracing::{debug, warn};

use crate::{App, AppAction, AppEvent, Bridge, Driver, Outbound};

/// Upper bound on inbound events handled per cycle, so input stays
/// responsive under a push flood.
const MAX_INBOUND_PER_CYCLE: usize = 64;

/// Generic runtime that orchestrates App, Bridge, and Driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment for time and randomness
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    app: App,
    bridge: Bridge<E>,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Create a new runtime with the given driver and environment.
    pub fn new(driver: D, env: E, context: SessionContext) -> Self {
        Self { driver, app: App::new(), bridge: Bridge::new(env, context) }
    }

    /// Run the main event loop until the app quits.
    ///
    /// Each cycle:
    /// 1. Polls the driver for user input
    /// 2. Drains request completions and push events from the bus
    /// 3. Ticks the client for presence cadence
    /// 4. Flushes outbound I/O through the driver
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        self.driver.render(&self.app)?;
        let mut quit = self.start().await?;
        while !quit {
            quit = self.step().await?;
        }

        self.shutdown().await?;
        self.driver.stop();
        Ok(())
    }

    /// Start the session.
    ///
    /// Returns `true` if the application should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn start(&mut self) -> Result<bool, D::Error> {
        let now = self.driver.now();
        let events = self.bridge.start(now);
        self.process_bridge_events(events).await
    }

    /// Process one cycle of the event loop.
    ///
    /// Returns `true` if the application should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn step(&mut self) -> Result<bool, D::Error> {
        let actions = self.driver.poll_event(&mut self.app).await?;
        if !actions.is_empty() && self.process_actions(actions).await? {
            return Ok(true);
        }

        for _ in 0..MAX_INBOUND_PER_CYCLE {
            let Some(inbound) = self.driver.recv_inbound().await else {
                break;
            };
            debug!(event = inbound.label(), "inbound");
            let events = self.bridge.handle_inbound(inbound);
            if self.process_bridge_events(events).await? {
                return Ok(true);
            }
        }

        let now = self.driver.now();
        let events = self.bridge.handle_tick(now);
        self.process_bridge_events(events).await
    }

    /// End the session: offline beacon and unsubscribe.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn shutdown(&mut self) -> Result<(), D::Error> {
        let events = self.bridge.teardown();
        for event in events {
            let actions = self.app.handle(event);
            self.render_only(actions);
        }
        self.flush_outgoing().await
    }

    /// Process actions returned by the App.
    ///
    /// Returns `true` if should quit.
    async fn process_actions(&mut self, initial_actions: Vec<AppAction>) -> Result<bool, D::Error> {
        let mut pending_actions = initial_actions;

        while !pending_actions.is_empty() {
            let actions = std::mem::take(&mut pending_actions);

            for action in actions {
                match action {
                    AppAction::Render => self.driver.render(&self.app)?,
                    AppAction::Quit => return Ok(true),

                    // Sync operations go through the bridge
                    AppAction::Activity
                    | AppAction::Refresh
                    | AppAction::OpenConversation { .. }
                    | AppAction::CloseConversation
                    | AppAction::SendMessage { .. }
                    | AppAction::EditMessage { .. }
                    | AppAction::DeleteMessage { .. }
                    | AppAction::TogglePin { .. }
                    | AppAction::ToggleFavorite { .. }
                    | AppAction::Scrolled { .. }
                    | AppAction::LoadOlder => {
                        let events = self.bridge.process_app_action(action);
                        for event in events {
                            pending_actions.extend(self.app.handle(event));
                        }
                        self.flush_outgoing().await?;
                    },
                }
            }
        }
        Ok(false)
    }

    /// Process events from Bridge back to App.
    async fn process_bridge_events(&mut self, events: Vec<AppEvent>) -> Result<bool, D::Error> {
        self.flush_outgoing().await?;
        for event in events {
            let actions = self.app.handle(event);
            if self.process_actions(actions).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Render for actions produced during shutdown; sync actions are dropped.
    fn render_only(&mut self, actions: Vec<AppAction>) {
        for action in actions {
            match action {
                AppAction::Render => {
                    if let Err(e) = self.driver.render(&self.app) {
                        warn!("failed to render: {e}");
                    }
                },
                AppAction::Quit => {},
                other => debug!(?other, "ignoring action during shutdown"),
            }
        }
    }

    /// Hand all pending outbound I/O to the driver.
    async fn flush_outgoing(&mut self) -> Result<(), D::Error> {
        for outbound in self.bridge.take_outgoing() {
            match outbound {
                Outbound::Request { request_id, request } => {
                    self.driver.execute(request_id, request).await?;
                },
                Outbound::Beacon(request) => self.driver.beacon(request).await?,
                Outbound::Subscribe(channels) => self.driver.subscribe(channels).await?,
                Outbound::Unsubscribe(channels) => self.driver.unsubscribe(channels).await?,
            }
        }
        Ok(())
    }

    /// Get a reference to the App
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Get a mutable reference to the App
    pub fn app_mut(&mut self) -> &mut App {
        &mut self.app
    }

    /// Get a reference to the Bridge
    pub fn bridge(&self) -> &Bridge<E> {
        &self.bridge
    }

    /// Get a reference to the Driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get a mutable reference to the Driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
