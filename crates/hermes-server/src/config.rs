//! Connection manager configuration.

use std::time::Duration;

use hermes_pipe::PipeOptions;

/// Configuration for the [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    /// Scavenger cadence (default: 1 second).
    pub scan_interval: Duration,
    /// How long an `Inactive` connection may idle before the scavenger
    /// disposes it (default: 5 seconds). Disposal requires strictly more
    /// idle time than this.
    pub disconnect_timeout: Duration,
    /// Total time `close_connections` waits for disposals before abandoning
    /// the stragglers (default: 5 seconds).
    pub shutdown_timeout: Duration,
    /// Options for each connection's application-to-transport pipe.
    pub transport_pipe: PipeOptions,
    /// Options for each connection's transport-to-application pipe.
    pub application_pipe: PipeOptions,
    /// Suppress scavenger disposal, keeping idle connections alive while a
    /// human is inspecting the process.
    pub disposal_suppressed: bool,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(1),
            disconnect_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            transport_pipe: PipeOptions::default(),
            application_pipe: PipeOptions::default(),
            disposal_suppressed: false,
        }
    }
}

impl ConnectionManagerConfig {
    /// Create a configuration with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scavenger cadence.
    pub fn scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    /// Set the idle threshold for scavenger disposal.
    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Set the total shutdown wait.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set options for the application-to-transport pipes.
    pub fn transport_pipe(mut self, options: PipeOptions) -> Self {
        self.transport_pipe = options;
        self
    }

    /// Set options for the transport-to-application pipes.
    pub fn application_pipe(mut self, options: PipeOptions) -> Self {
        self.application_pipe = options;
        self
    }

    /// Suppress scavenger disposal.
    pub fn suppress_disposal(mut self, suppressed: bool) -> Self {
        self.disposal_suppressed = suppressed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionManagerConfig::default();
        assert_eq!(config.scan_interval, Duration::from_secs(1));
        assert_eq!(config.disconnect_timeout, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert!(!config.disposal_suppressed);
    }

    #[test]
    fn test_builder() {
        let config = ConnectionManagerConfig::new()
            .scan_interval(Duration::from_millis(100))
            .disconnect_timeout(Duration::from_millis(500))
            .shutdown_timeout(Duration::from_secs(1))
            .suppress_disposal(true);

        assert_eq!(config.scan_interval, Duration::from_millis(100));
        assert_eq!(config.disconnect_timeout, Duration::from_millis(500));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert!(config.disposal_suppressed);
    }
}
