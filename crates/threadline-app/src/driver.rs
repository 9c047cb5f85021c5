//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the application runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{future::Future, ops::Sub, time::Duration};

use threadline_client::RequestId;
use threadline_proto::{ApiRequest, Channel};

use crate::{App, AppAction, Inbound};

/// Abstracts I/O operations for the application runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration logic. This ensures
/// the same orchestration code runs against the real backend and in
/// simulation.
///
/// Request and push completions are not returned from the methods that start
/// them. Implementations publish them on an [`crate::EventBus`] and hand
/// them back through [`Driver::recv_inbound`].
///
/// # Implementations
///
/// - **CLI**: line input from stdin, HTTP via reqwest, Pusher websocket
/// - **Simulation**: in-memory backend with failure injection and virtual
///   time
///
/// # Associated Types
///
/// - [`Error`](Driver::Error): Platform-specific error type
/// - [`Instant`](Driver::Instant): Time representation (real or virtual)
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Poll for user input and feed it to the app.
    ///
    /// Returns the actions the app produced; empty when no input was ready.
    fn poll_event(
        &mut self,
        app: &mut App,
    ) -> impl Future<Output = Result<Vec<AppAction>, Self::Error>> + Send;

    /// Start executing a request. The completion arrives as
    /// [`Inbound::Response`] with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be dispatched at all.
    fn execute(
        &mut self,
        request_id: RequestId,
        request: ApiRequest,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Execute a fire-and-forget request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be dispatched at all.
    fn beacon(
        &mut self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Subscribe to push channels.
    ///
    /// # Errors
    ///
    /// Returns an error if the push connection is gone.
    fn subscribe(
        &mut self,
        channels: Vec<Channel>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Unsubscribe from push channels.
    ///
    /// # Errors
    ///
    /// Returns an error if the push connection is gone.
    fn unsubscribe(
        &mut self,
        channels: Vec<Channel>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Next buffered inbound event, or `None` if nothing is ready.
    fn recv_inbound(&mut self) -> impl Future<Output = Option<Inbound>> + Send;

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Render the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, app: &App) -> Result<(), Self::Error>;

    /// Stop background tasks and clean up resources.
    fn stop(&mut self);
}
