//! Configuration management for the sync layer.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation

mod keys;
mod kv;
mod retry;
mod secrets;
pub use keys::*;
pub use kv::*;
pub use retry::*;
pub use secrets::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix, e.g. `SYNC__KV__ADDRESS`
pub const ENV_PREFIX: &str = "SYNC";

/// Main configuration container for the sync layer components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct SyncConfig {
    /// KV store connection and blocking-query parameters
    #[serde(default)]
    pub kv: KvConfig,
    /// Path layout inside the KV store
    #[serde(default)]
    pub keys: KvKeysConfig,
    /// Secret backend naming and batch behaviour
    #[serde(default)]
    pub secrets: SecretsConfig,
    /// Retry policies for one-shot maintenance operations
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl Debug for SyncConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        // token stays out of logs
        f.debug_struct("SyncConfig")
            .field("kv.address", &self.kv.address)
            .field("keys", &self.keys)
            .field("secrets", &self.secrets)
            .finish()
    }
}

impl SyncConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `SYNC__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so that `with_override_config()` can still be
    /// applied. Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/sync.toml");
    /// std::env::set_var("SYNC__SECRETS__DEFAULT_SECRET_NAME", "vars");
    /// let cfg = SyncConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        self.kv.validate()?;
        self.keys.validate()?;
        self.secrets.validate()?;
        self.retry.validate()?;
        Ok(self)
    }
}
