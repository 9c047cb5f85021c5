//! In-process driver.
//!
//! Runs a session against the simulated server from `threadline-harness`,
//! with the same line-mode console as the network driver. The virtual clock
//! follows real time so heartbeats and polls fire on schedule, and simulated
//! peers can chat and change presence on their own.

use std::time::{Duration, Instant};

use threadline_app::{App, AppAction, Driver, Inbound};
use threadline_client::{Environment, RequestId};
use threadline_core::UserId;
use threadline_harness::{SimDriver, SimEnv, SimInstant, lock_backend};
use threadline_proto::{ApiRequest, Channel};
use tracing::debug;

use crate::{CliError, Console};

/// Driver for a session against the in-process server.
pub struct LocalDriver {
    console: Console,
    sim: SimDriver,
    env: SimEnv,
    started: Instant,
    peers: Vec<UserId>,
    chatter: Option<Duration>,
    next_chatter: Duration,
    chatter_count: u64,
}

impl LocalDriver {
    /// Wrap `sim`. Must be called within a tokio runtime.
    ///
    /// With `chatter`, a random peer sends a message and changes presence
    /// that often.
    pub fn new(sim: SimDriver, env: SimEnv, peers: Vec<UserId>, chatter: Option<Duration>) -> Self {
        Self {
            console: Console::spawn(),
            sim,
            next_chatter: chatter.unwrap_or_default(),
            env,
            started: Instant::now(),
            peers,
            chatter,
            chatter_count: 0,
        }
    }

    /// Advance the virtual clock to match real elapsed time.
    fn follow_real_time(&self) {
        let real = self.started.elapsed();
        let simulated = self.env.elapsed();
        if real > simulated {
            self.env.advance(real - simulated);
        }
    }

    fn chat(&mut self) {
        let Some(every) = self.chatter else {
            return;
        };
        if self.peers.is_empty() || self.env.elapsed() < self.next_chatter {
            return;
        }
        self.next_chatter = self.env.elapsed() + every;
        self.chatter_count += 1;

        let len = self.peers.len() as u64;
        let peer = self.peers[(self.env.random_u64() % len) as usize];
        let online = self.env.random_u64() % 2 == 0;
        let viewer = self.sim.viewer();
        debug!(peer, online, "simulated peer activity");

        let mut backend = lock_backend(self.sim.backend());
        backend.post_message(peer, viewer, format!("ping {}", self.chatter_count));
        backend.set_online(peer, online);
    }
}

impl Driver for LocalDriver {
    type Error = CliError;
    type Instant = SimInstant;

    async fn poll_event(&mut self, app: &mut App) -> Result<Vec<AppAction>, Self::Error> {
        let actions = self.console.poll(app).await;
        self.follow_real_time();
        self.chat();
        Ok(actions)
    }

    async fn execute(
        &mut self,
        request_id: RequestId,
        request: ApiRequest,
    ) -> Result<(), Self::Error> {
        Ok(self.sim.execute(request_id, request).await?)
    }

    async fn beacon(&mut self, request: ApiRequest) -> Result<(), Self::Error> {
        Ok(self.sim.beacon(request).await?)
    }

    async fn subscribe(&mut self, channels: Vec<Channel>) -> Result<(), Self::Error> {
        Ok(self.sim.subscribe(channels).await?)
    }

    async fn unsubscribe(&mut self, channels: Vec<Channel>) -> Result<(), Self::Error> {
        Ok(self.sim.unsubscribe(channels).await?)
    }

    async fn recv_inbound(&mut self) -> Option<Inbound> {
        self.sim.recv_inbound().await
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn render(&mut self, app: &App) -> Result<(), Self::Error> {
        self.sim.render(app)?;
        Ok(self.console.render(app)?)
    }

    fn stop(&mut self) {
        self.sim.stop();
        self.console.stop();
    }
}
