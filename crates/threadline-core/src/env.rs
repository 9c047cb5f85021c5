//! Environment abstraction for deterministic testing.
//!
//! Decouples synchronization logic from system resources (time, randomness).
//! Enables deterministic simulation (virtual clock, seeded RNG) and production
//! use with real system resources.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Abstract environment providing time, randomness, and async primitives.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use virtual time.
    type Instant: Copy + Ord + Send + Sync + std::fmt::Debug + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    ///
    /// Drives heartbeat and poll cadence. Subsequent calls must return times
    /// >= previous calls.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time.
    ///
    /// Stamps optimistic messages so they sort with server-confirmed ones.
    /// May jump; ordering code must not assume it is monotonic.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not synchronization logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Given the same seed, simulation environments produce the same bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Time elapsed from `since` to `now`, saturating at zero.
pub fn elapsed<I>(now: I, since: I) -> Duration
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    if now >= since { now - since } else { Duration::ZERO }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct Tick(u64);

    impl std::ops::Sub for Tick {
        type Output = Duration;
        fn sub(self, rhs: Self) -> Duration {
            Duration::from_secs(self.0 - rhs.0)
        }
    }

    #[test]
    fn elapsed_saturates_when_clock_is_behind() {
        assert_eq!(elapsed(Tick(10), Tick(4)), Duration::from_secs(6));
        assert_eq!(elapsed(Tick(4), Tick(10)), Duration::ZERO);
    }
}
