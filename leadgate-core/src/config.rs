//! Configuration types

use crate::{ConfigError, LeadgateError, LeadgateResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default unlocked-leads poll interval (3 minutes).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 180_000;

/// Default timeout for a single snapshot fetch.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Default timeout for a single ledger request.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Timing configuration for the unlock core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadgateConfig {
    /// How often the unlocked-leads cache polls the ledger.
    /// Also the staleness bound of the published snapshot.
    pub poll_interval: Duration,
    /// Timeout applied to each snapshot fetch.
    pub fetch_timeout: Duration,
    /// Timeout applied to each single-lead ledger request.
    pub request_timeout: Duration,
}

impl Default for LeadgateConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl LeadgateConfig {
    /// Load configuration from environment variables.
    ///
    /// - `LEADGATE_POLL_INTERVAL_MS` (default: 180000)
    /// - `LEADGATE_FETCH_TIMEOUT_MS` (default: 10000)
    /// - `LEADGATE_REQUEST_TIMEOUT_MS` (default: 15000)
    ///
    /// The result is validated before it is returned.
    pub fn from_env() -> LeadgateResult<Self> {
        let config = Self {
            poll_interval: env_millis("LEADGATE_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
            fetch_timeout: env_millis("LEADGATE_FETCH_TIMEOUT_MS", DEFAULT_FETCH_TIMEOUT_MS)?,
            request_timeout: env_millis("LEADGATE_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - all durations are positive
    /// - fetch_timeout does not exceed poll_interval
    pub fn validate(&self) -> LeadgateResult<()> {
        for (field, value) in [
            ("poll_interval", self.poll_interval),
            ("fetch_timeout", self.fetch_timeout),
            ("request_timeout", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(LeadgateError::Config(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:?}", value),
                    reason: format!("{} must be positive", field),
                }));
            }
        }

        // A fetch that outlives the interval would let the snapshot age past the bound.
        if self.fetch_timeout > self.poll_interval {
            return Err(LeadgateError::Config(ConfigError::InvalidValue {
                field: "fetch_timeout".to_string(),
                value: format!("{:?}", self.fetch_timeout),
                reason: "fetch_timeout must not exceed poll_interval".to_string(),
            }));
        }

        Ok(())
    }
}

fn env_millis(key: &str, default_ms: u64) -> LeadgateResult<Duration> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| {
                LeadgateError::Config(ConfigError::InvalidValue {
                    field: key.to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })
            }),
        Err(_) => Ok(Duration::from_millis(default_ms)),
    }
}
