//! Synchronization tunables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables shared by the synchronization components.
///
/// Durations are (de)serialized as whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Messages per history page.
    pub page_size: u32,
    /// Distance from the top edge, in rows, that triggers loading older
    /// history.
    pub load_threshold_rows: usize,
    /// Fixed heartbeat cadence.
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,
    /// Quiet period after user activity before an extra heartbeat is sent.
    #[serde(with = "duration_secs")]
    pub activity_debounce: Duration,
    /// Online-user poll cadence.
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    /// Maximum number of pinned conversations.
    pub pin_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            load_threshold_rows: 3,
            heartbeat_interval: Duration::from_secs(120),
            activity_debounce: Duration::from_secs(3),
            poll_interval: Duration::from_secs(60),
            pin_limit: 3,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
