//! Simulated environment with virtual time and seeded randomness.
//!
//! `SimEnv` implements [`Environment`] without touching the system clock or
//! OS entropy. Time only moves when a test calls [`SimEnv::advance`] (or
//! awaits [`Environment::sleep`]), and every random byte comes from a
//! ChaCha stream seeded by the test. Two runs with the same seed and the same
//! inputs produce the same outputs.
//!
//! Clones share the clock and the RNG, so a client, its driver and the
//! simulated backend all observe the same time.

use std::{
    ops::Sub,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use threadline_core::env::Environment;

/// Wall-clock time at virtual instant zero: 2024-01-01T00:00:00Z.
const EPOCH_SECS: i64 = 1_704_067_200;

/// Instant on the virtual clock, measured from the start of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the start of the simulation.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

struct Inner {
    elapsed: Duration,
    rng: ChaCha8Rng,
}

/// Deterministic environment for simulation and tests.
#[derive(Clone)]
pub struct SimEnv {
    inner: Arc<Mutex<Inner>>,
    epoch: DateTime<Utc>,
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("elapsed", &self.elapsed()).finish_non_exhaustive()
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Environment seeded with zero.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with an explicit RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        let epoch = Utc.timestamp_opt(EPOCH_SECS, 0).single().unwrap_or(DateTime::UNIX_EPOCH);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                elapsed: Duration::ZERO,
                rng: ChaCha8Rng::seed_from_u64(seed),
            })),
            epoch,
        }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, by: Duration) {
        let mut inner = self.lock();
        inner.elapsed = inner.elapsed.saturating_add(by);
    }

    /// Time since the start of the simulation.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> Self::Instant {
        SimInstant(self.elapsed())
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or(chrono::Duration::MAX);
        self.epoch.checked_add_signed(elapsed).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}
