use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// KV store connection parameters and blocking-query tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KvConfig {
    /// Base address of the KV store HTTP API
    #[serde(default = "default_address")]
    pub address: String,

    /// ACL token sent with every request
    #[serde(default)]
    pub token: Option<String>,

    /// Blocking-query wait for steady-state watches, in seconds
    #[serde(default = "default_watch_wait")]
    pub watch_wait_in_secs: u64,

    /// Timeout for non-blocking requests in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// Maximum operations the store accepts in one transaction
    #[serde(default = "default_txn_max_ops")]
    pub txn_max_ops: usize,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            token: None,
            watch_wait_in_secs: default_watch_wait(),
            request_timeout_in_ms: default_request_timeout(),
            txn_max_ops: default_txn_max_ops(),
        }
    }
}

impl KvConfig {
    pub fn watch_wait(&self) -> Duration {
        Duration::from_secs(self.watch_wait_in_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.address.starts_with("http://") && !self.address.starts_with("https://") {
            return Err(Error::Config(ConfigError::Message(format!(
                "kv address {} must start with http:// or https://",
                self.address
            ))));
        }

        if self.watch_wait_in_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch wait must be > 0".to_string(),
            )));
        }

        // store-side cap on blocking queries
        if self.watch_wait_in_secs > 600 {
            return Err(Error::Config(ConfigError::Message(format!(
                "watch wait {}s exceeds the 600s maximum",
                self.watch_wait_in_secs
            ))));
        }

        if self.request_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "request timeout must be > 0".to_string(),
            )));
        }

        if self.txn_max_ops == 0 {
            return Err(Error::Config(ConfigError::Message(
                "txn_max_ops must be > 0".to_string(),
            )));
        }

        Ok(())
    }
}

fn default_address() -> String {
    "http://127.0.0.1:8500".to_string()
}
fn default_watch_wait() -> u64 {
    20
}
fn default_request_timeout() -> u64 {
    5000
}
fn default_txn_max_ops() -> usize {
    64
}
