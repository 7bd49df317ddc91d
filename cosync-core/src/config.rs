//! Centralized configuration for cosync.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the synchronizer and parser.

use std::time::Duration;

/// Central configuration for all cosync components.
///
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct CosyncConfig {
    pub sync: SyncConfig,
    pub parser: ParserConfig,
}

/// Synchronizer queue and polling configuration.
///
/// Controls how often blocked pollers re-check the shared tick state and
/// how much data may be buffered between the two sides.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Granularity of result and input polling
    pub poll_interval: Duration,
    /// Capacity of the host-bound input queue
    pub input_queue_capacity: usize,
    /// Capacity of the external-bound result queue
    pub result_queue_capacity: usize,
    /// Longest a submit may wait on a full queue before it is reported as interrupted
    pub queue_send_timeout: Duration,
    /// Capacity of the one-shot initialization buffer
    pub handshake_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            input_queue_capacity: 64,
            result_queue_capacity: 64,
            queue_send_timeout: Duration::from_secs(5),
            handshake_capacity: 4,
        }
    }
}

/// Input message parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Qualifier the external engine prepends to host-owned sender ids,
    /// stripped together with the following `.` before lookup
    pub host_qualifier: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            host_qualifier: "Host-0".to_string(),
        }
    }
}

impl CosyncConfig {
    /// Creates configuration with environment variable overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(interval) = std::env::var("COSYNC_POLL_INTERVAL_MS") {
            if let Ok(millis) = interval.parse::<u64>() {
                config.sync.poll_interval = Duration::from_millis(millis);
            }
        }

        if let Ok(timeout) = std::env::var("COSYNC_QUEUE_TIMEOUT_MS") {
            if let Ok(millis) = timeout.parse::<u64>() {
                config.sync.queue_send_timeout = Duration::from_millis(millis);
            }
        }

        if let Ok(qualifier) = std::env::var("COSYNC_HOST_QUALIFIER") {
            if !qualifier.is_empty() {
                config.parser.host_qualifier = qualifier;
            }
        }

        config
    }

    /// Creates a configuration with short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            sync: SyncConfig {
                poll_interval: Duration::from_millis(2),
                queue_send_timeout: Duration::from_millis(200),
                ..SyncConfig::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = CosyncConfig::default();

        assert_eq!(config.sync.poll_interval, Duration::from_millis(20));
        assert_eq!(config.sync.input_queue_capacity, 64);
        assert_eq!(config.sync.result_queue_capacity, 64);
        assert_eq!(config.sync.handshake_capacity, 4);
        assert_eq!(config.parser.host_qualifier, "Host-0");
    }

    #[test]
    fn test_testing_preset_shortens_timeouts() {
        let config = CosyncConfig::for_testing();
        let defaults = SyncConfig::default();

        assert!(config.sync.poll_interval < defaults.poll_interval);
        assert!(config.sync.queue_send_timeout < defaults.queue_send_timeout);
        assert_eq!(config.sync.handshake_capacity, defaults.handshake_capacity);
    }
}
