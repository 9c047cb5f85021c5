//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` drives the sync engine with real time: `std::time::Instant`
//! for heartbeat and poll cadence, the system clock for optimistic message
//! stamps, tokio for sleeping and getrandom for local tokens.

use std::time::Duration;

use chrono::{DateTime, Utc};
use threadline_core::Environment;

/// Production environment using system time and the OS RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. RNG failure indicates OS-level issues and
/// the client cannot mint unique local tokens without it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
