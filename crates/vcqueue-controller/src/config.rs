//! Controller tuning knobs

use std::time::Duration;

use vcqueue_workqueue::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};

/// Failures tolerated per item before it is dropped.
///
/// With the default 5ms base delay the retries are spaced 5ms, 10ms, 20ms,
/// ... 82s apart, roughly 2.7 minutes in total.
pub const DEFAULT_MAX_RETRIES: u32 = 15;

/// Delay before a Closing queue is checked for drain again
pub const DEFAULT_DRAIN_RECHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Watch timeout (seconds), kept below the client read timeout (30s) so the
/// API server closes idle watches before the client gives up on them
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Runtime configuration of the queue controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Concurrent queue reconciliation workers
    pub queue_workers: usize,
    /// Concurrent command workers
    pub command_workers: usize,
    /// Failures tolerated per item before it is dropped
    pub max_retries: u32,
    /// First retry delay
    pub base_delay: Duration,
    /// Retry delay cap
    pub max_delay: Duration,
    /// Re-check interval for Closing queues
    pub drain_recheck_interval: Duration,
    /// Server-side watch timeout in seconds
    pub watch_timeout_secs: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            queue_workers: 1,
            command_workers: 1,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            drain_recheck_interval: DEFAULT_DRAIN_RECHECK_INTERVAL,
            watch_timeout_secs: WATCH_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_controller_policy() {
        let config = ControllerConfig::default();
        assert_eq!(config.max_retries, 15);
        assert_eq!(config.base_delay, Duration::from_millis(5));
        assert_eq!(config.max_delay, Duration::from_secs(1000));
        assert_eq!(config.queue_workers, 1);
        assert_eq!(config.command_workers, 1);
        assert!(config.watch_timeout_secs < 30);
    }
}
