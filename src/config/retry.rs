use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Divide strategies by operation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    // Re-creation of default variables at startup
    #[serde(default = "default_restore_variables")]
    pub restore_variables: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            restore_variables: default_restore_variables(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.restore_variables.validate("restore_variables")
    }
}

impl BackoffPolicy {
    pub(crate) fn validate(
        &self,
        policy_name: &str,
    ) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "{policy_name} max_retries must be > 0"
            ))));
        }

        if self.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "{policy_name} timeout_ms must be > 0"
            ))));
        }

        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "{} base_delay_ms {} exceeds max_delay_ms {}",
                policy_name, self.base_delay_ms, self.max_delay_ms
            ))));
        }

        Ok(())
    }
}

fn default_restore_variables() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 5,
        timeout_ms: 10_000,
        base_delay_ms: 1000,
        max_delay_ms: 30_000,
    }
}
fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    100
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
