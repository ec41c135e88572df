use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::serial::{ExchangePolicy, BACKOFF_STEP, COMMAND_TIMEOUT, INTER_FRAME_DELAY, MAX_RETRIES};

/// Upper bounds accepted from configuration
pub const MAX_CONFIGURED_RETRIES: u32 = 10;
pub const MAX_CONFIGURED_DELAY_MS: u64 = 60_000;

/// Hub tuning. Defaults are the timings the bridge firmware expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    pub max_retries: u32,
    pub response_timeout_ms: u64,
    pub inter_frame_delay_ms: u64,
    pub backoff_step_ms: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            response_timeout_ms: COMMAND_TIMEOUT.as_millis() as u64,
            inter_frame_delay_ms: INTER_FRAME_DELAY.as_millis() as u64,
            backoff_step_ms: BACKOFF_STEP.as_millis() as u64,
        }
    }
}

impl HubSettings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "response_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_retries > MAX_CONFIGURED_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "max_retries must be at most {}, got {}",
                MAX_CONFIGURED_RETRIES, self.max_retries
            )));
        }
        for (name, value) in [
            ("response_timeout_ms", self.response_timeout_ms),
            ("inter_frame_delay_ms", self.inter_frame_delay_ms),
            ("backoff_step_ms", self.backoff_step_ms),
        ] {
            if value > MAX_CONFIGURED_DELAY_MS {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at most {} ms, got {}",
                    name, MAX_CONFIGURED_DELAY_MS, value
                )));
            }
        }
        Ok(())
    }

    pub fn exchange_policy(&self) -> ExchangePolicy {
        ExchangePolicy {
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            inter_frame_delay: Duration::from_millis(self.inter_frame_delay_ms),
            backoff_step: Duration::from_millis(self.backoff_step_ms),
        }
    }
}
