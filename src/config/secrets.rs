use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Secret backend naming and multi-secret batch parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SecretsConfig {
    /// Canonical home of secured variables
    #[serde(default = "default_secret_name")]
    pub default_secret_name: String,

    /// Label key marking secrets owned by this subsystem
    #[serde(default = "default_label")]
    pub label: String,

    /// Upper bound for waiting on all async removals of one batch delete.
    /// 0 waits for as long as the backend takes.
    #[serde(default = "default_batch_delete_timeout")]
    pub batch_delete_timeout_in_ms: u64,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            default_secret_name: default_secret_name(),
            label: default_label(),
            batch_delete_timeout_in_ms: default_batch_delete_timeout(),
        }
    }
}

impl SecretsConfig {
    pub fn batch_delete_timeout(&self) -> Option<Duration> {
        match self.batch_delete_timeout_in_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_secret_name.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "secrets.default_secret_name must not be empty".to_string(),
            )));
        }

        if self.label.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "secrets.label must not be empty".to_string(),
            )));
        }

        Ok(())
    }
}

fn default_secret_name() -> String {
    "secured-variables-v2".to_string()
}
fn default_label() -> String {
    "app.kubernetes.io/secured-variables".to_string()
}
fn default_batch_delete_timeout() -> u64 {
    30_000
}
