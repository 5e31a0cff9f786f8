//! Engine tunables.

use std::time::Duration;

use crate::error::{Result, WatchError};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_RECORD_QUEUE: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    /// Tick cadence, and the width of each per-process CPU measurement.
    pub interval: Duration,
    /// Per-subscriber bound on queued persistence records.
    pub record_queue_capacity: usize,
    /// Longest the loop waits for room in one subscriber's record queue; `None` means `interval`.
    pub publish_timeout: Option<Duration>,
    /// Re-read the process table at the start of every tick, picking up new instances.
    pub rescan_each_tick: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            record_queue_capacity: DEFAULT_RECORD_QUEUE,
            publish_timeout: None,
            rescan_each_tick: false,
        }
    }
}

impl WatchConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(WatchError::InvalidInterval(self.interval));
        }
        if self.record_queue_capacity == 0 {
            return Err(WatchError::InvalidQueueCapacity);
        }
        Ok(())
    }

    pub fn publish_timeout(&self) -> Duration {
        self.publish_timeout.unwrap_or(self.interval)
    }
}
