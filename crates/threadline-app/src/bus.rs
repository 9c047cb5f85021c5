//! Inbound event bus.
//!
//! Transport tasks (HTTP requests in flight, the push socket) publish what
//! they receive onto a bounded channel; the driver drains it and the runtime
//! feeds each [`Inbound`] through the bridge. This replaces callback
//! subscriptions with explicit message passing.
//!
//! Realtime events are published with [`EventBus::publish`], which drops the
//! event when the bus is full; the next listing or history load repairs the
//! gap. Request completions use [`EventBus::publish_wait`] so no in-flight
//! request is left unresolved.

use threadline_client::{RequestId, TransportError};
use threadline_proto::{ApiResponse, PushEvent};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Default number of buffered inbound events.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Something that arrived from outside the process.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A request completed.
    Response {
        /// Request the response belongs to.
        request_id: RequestId,
        /// Decoded body or failure.
        result: Result<ApiResponse, TransportError>,
    },
    /// Push event received.
    Push(PushEvent),
    /// Realtime could not be established or was lost.
    PushUnavailable {
        /// Failure description.
        reason: String,
    },
}

impl Inbound {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Response { .. } => "response",
            Self::Push(event) => event.name(),
            Self::PushUnavailable { .. } => "push-unavailable",
        }
    }
}

/// Sending half of the bus. Cheap to clone into transport tasks.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::Sender<Inbound>,
}

/// Receiving half of the bus, owned by the driver.
#[derive(Debug)]
pub struct BusReceiver {
    rx: mpsc::Receiver<Inbound>,
}

impl EventBus {
    /// Create a bus buffering at most `capacity` events.
    pub fn bounded(capacity: usize) -> (Self, BusReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, BusReceiver { rx })
    }

    /// Publish without waiting. Returns `false` if the event was dropped.
    pub fn publish(&self, event: Inbound) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(event = event.label(), "event bus full, dropping event");
                false
            },
            Err(TrySendError::Closed(event)) => {
                debug!(event = event.label(), "event bus closed");
                false
            },
        }
    }

    /// Publish, waiting for room. Returns `false` if the receiver is gone.
    pub async fn publish_wait(&self, event: Inbound) -> bool {
        self.tx.send(event).await.is_ok()
    }
}

impl BusReceiver {
    /// Next buffered event, if any.
    pub fn try_recv(&mut self) -> Option<Inbound> {
        self.rx.try_recv().ok()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Wait for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.rx.recv().await
    }
}
