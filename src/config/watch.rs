use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Result;

/// Tuning for the watch engine: channel buffers, the blocking-query wait
/// budget, and the cap on simultaneously outstanding fetches.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Buffer size for the shared event queue between views and the
    /// dispatcher. Views apply backpressure when it is full; nothing is
    /// dropped.
    ///
    /// **Default**: 1000
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,

    /// Buffer size of the renderer-facing notification channel.
    ///
    /// **Default**: 64
    #[serde(default = "default_notify_buffer_size")]
    pub notify_buffer_size: usize,

    /// Maximum time a single blocking query may hold the connection open
    /// waiting for a change (unit: seconds). The backend returns an
    /// unchanged cursor once this elapses.
    ///
    /// **Default**: 60
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: u64,

    /// Maximum number of fetches allowed in flight at once across all
    /// views. Excess views queue for a permit instead of fetching.
    /// 0 disables the cap.
    ///
    /// **Default**: 0 (unlimited)
    #[serde(default)]
    pub max_concurrent_fetches: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            event_queue_size: default_event_queue_size(),
            notify_buffer_size: default_notify_buffer_size(),
            wait_time_secs: default_wait_time_secs(),
            max_concurrent_fetches: 0,
        }
    }
}

impl WatchConfig {
    /// Validates watch configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.event_queue_size == 0 {
            return Err(ConfigError::Message(
                "watch.event_queue_size must be greater than 0".into(),
            )
            .into());
        }

        if self.notify_buffer_size == 0 {
            return Err(ConfigError::Message(
                "watch.notify_buffer_size must be greater than 0".into(),
            )
            .into());
        }

        if self.wait_time_secs == 0 {
            return Err(ConfigError::Message(
                "watch.wait_time_secs must be greater than 0".into(),
            )
            .into());
        }

        if self.wait_time_secs > 600 {
            warn!(
                "watch.wait_time_secs ({}) is very large; most backends cap \
                 blocking queries near 10 minutes",
                self.wait_time_secs
            );
        }

        Ok(())
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs)
    }
}

fn default_event_queue_size() -> usize {
    1000
}
fn default_notify_buffer_size() -> usize {
    64
}
fn default_wait_time_secs() -> u64 {
    60
}
