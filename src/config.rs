//! Dispatch configuration

use ramses_shared::{timing, DEFAULT_GATEWAY_ID};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("min_interval must be greater than zero")]
    ZeroInterval,

    #[error("min_interval ({0:?}) exceeds {}ms", timing::MAX_COMMAND_INTERVAL_MS)]
    IntervalTooLong(Duration),

    #[error("idle_timeout ({idle:?}) must be at least min_interval ({interval:?})")]
    IdleShorterThanInterval { idle: Duration, interval: Duration },

    #[error("default_timeout must be greater than zero")]
    ZeroTimeout,
}

/// Configuration for the device command manager
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Minimum gap between two sends to the same device
    pub min_interval: Duration,
    /// Empty-queue time after which a device worker retires
    pub idle_timeout: Duration,
    /// Transport timeout used when a command carries none
    pub default_timeout: Duration,
    /// Source address for packets with no bound companion
    pub gateway_id: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(timing::MIN_COMMAND_INTERVAL_MS),
            idle_timeout: Duration::from_millis(timing::WORKER_IDLE_TIMEOUT_MS),
            default_timeout: Duration::from_millis(timing::COMMAND_TIMEOUT_MS),
            gateway_id: DEFAULT_GATEWAY_ID.into(),
        }
    }
}

impl DispatchConfig {
    /// Reject settings under which per-device spacing could be violated
    ///
    /// A retired worker forgets the device's last send time, so the idle
    /// timeout has to cover at least one interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.min_interval > Duration::from_millis(timing::MAX_COMMAND_INTERVAL_MS) {
            return Err(ConfigError::IntervalTooLong(self.min_interval));
        }
        if self.idle_timeout < self.min_interval {
            return Err(ConfigError::IdleShorterThanInterval {
                idle: self.idle_timeout,
                interval: self.min_interval,
            });
        }
        if self.default_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Per-command timeout, falling back to the default for zero
    pub fn effective_timeout(&self, timeout: Duration) -> Duration {
        if timeout.is_zero() {
            self.default_timeout
        } else {
            timeout
        }
    }
}
