//! Runtime configuration for the sync engine

use std::time::Duration;

/// Default polling interval when push notifications are unavailable
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default capacity for the event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Tunables shared by the orchestrator and scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Time between polling passes while in the `Polling` state
    pub poll_interval: Duration,
    /// Buffered events per subscriber before the slowest one lags
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SyncConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        // broadcast::channel panics on zero capacity
        self.event_capacity = event_capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_builders() {
        let config = SyncConfig::default()
            .with_poll_interval(Duration::from_secs(3))
            .with_event_capacity(0);
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.event_capacity, 1);
    }
}
