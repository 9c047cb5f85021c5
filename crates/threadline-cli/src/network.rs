//! Network driver.
//!
//! Implements [`Driver`] against a real messenger server: requests run on
//! spawned tasks over [`HttpTransport`], the Pusher socket runs on its own
//! task, and both publish what they receive on the [`EventBus`]. Input and
//! rendering go through the line-mode [`Console`].

use std::time::Instant;

use threadline_app::{
    App, AppAction, BusReceiver, DEFAULT_BUS_CAPACITY, Driver, EventBus, Inbound,
};
use threadline_client::{
    RealtimeCredentials, RequestId,
    transport::{
        HttpTransport,
        push::{self, PushConnection, PushMessage},
    },
};
use threadline_proto::{ApiRequest, Channel};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use crate::{CliError, Console};

/// Driver for a session against a real server.
pub struct NetworkDriver {
    console: Console,
    http: HttpTransport,
    credentials: Option<RealtimeCredentials>,
    bus: EventBus,
    receiver: BusReceiver,
    push: Option<PushConnection>,
    forwarder: Option<JoinHandle<()>>,
}

impl NetworkDriver {
    /// Create a driver. Must be called within a tokio runtime.
    pub fn new(http: HttpTransport, credentials: Option<RealtimeCredentials>) -> Self {
        let (bus, receiver) = EventBus::bounded(DEFAULT_BUS_CAPACITY);
        Self {
            console: Console::spawn(),
            http,
            credentials,
            bus,
            receiver,
            push: None,
            forwarder: None,
        }
    }

    /// Open the push socket and forward its output onto the bus.
    fn connect_push(&mut self, credentials: &RealtimeCredentials) -> &PushConnection {
        let (sink, mut messages) = mpsc::channel(DEFAULT_BUS_CAPACITY);
        let bus = self.bus.clone();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                match message {
                    PushMessage::Event(event) => {
                        bus.publish(Inbound::Push(event));
                    },
                    PushMessage::Unavailable { reason } => {
                        bus.publish_wait(Inbound::PushUnavailable { reason }).await;
                    },
                }
            }
        }));

        info!(cluster = %credentials.cluster, "connecting realtime");
        self.push.insert(push::connect(credentials, self.http.clone(), sink))
    }
}

impl Driver for NetworkDriver {
    type Error = CliError;
    type Instant = Instant;

    async fn poll_event(&mut self, app: &mut App) -> Result<Vec<AppAction>, Self::Error> {
        Ok(self.console.poll(app).await)
    }

    async fn execute(
        &mut self,
        request_id: RequestId,
        request: ApiRequest,
    ) -> Result<(), Self::Error> {
        let http = self.http.clone();
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let result = http.execute(request_id, &request).await;
            if !bus.publish_wait(Inbound::Response { request_id, result }).await {
                debug!(%request_id, "response dropped, bus closed");
            }
        });
        Ok(())
    }

    async fn beacon(&mut self, request: ApiRequest) -> Result<(), Self::Error> {
        // The offline beacon is the last request of a session and must leave
        // before the process exits.
        if request == ApiRequest::GoOffline {
            self.http.beacon(&request).await;
            return Ok(());
        }

        let http = self.http.clone();
        tokio::spawn(async move { http.beacon(&request).await });
        Ok(())
    }

    async fn subscribe(&mut self, channels: Vec<Channel>) -> Result<(), Self::Error> {
        if let Some(push) = &self.push {
            push.subscribe(channels);
            return Ok(());
        }

        match self.credentials.clone() {
            Some(credentials) => self.connect_push(&credentials).subscribe(channels),
            None => {
                let reason = "no realtime credentials".to_owned();
                if !self.bus.publish_wait(Inbound::PushUnavailable { reason }).await {
                    return Err(CliError::BusClosed);
                }
            },
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, channels: Vec<Channel>) -> Result<(), Self::Error> {
        if let Some(push) = &self.push {
            push.unsubscribe(channels);
        }
        Ok(())
    }

    async fn recv_inbound(&mut self) -> Option<Inbound> {
        self.receiver.try_recv()
    }

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn render(&mut self, app: &App) -> Result<(), Self::Error> {
        Ok(self.console.render(app)?)
    }

    fn stop(&mut self) {
        if let Some(push) = self.push.take() {
            push.close();
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.console.stop();
    }
}
