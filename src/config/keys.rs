use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Path layout of the engine configuration tree inside the KV store.
///
/// Every sub-root starts with `/`; full paths are
/// `prefix + engine_config_root + <sub-root> [+ "/" + key]`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KvKeysConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default = "default_engine_config_root")]
    pub engine_config_root: String,

    #[serde(default = "default_deployments_update")]
    pub deployments_update: String,

    #[serde(default = "default_engines_state")]
    pub engines_state: String,

    #[serde(default = "default_libraries_update")]
    pub libraries_update: String,

    #[serde(default = "default_runtime_configurations")]
    pub runtime_configurations: String,

    #[serde(default = "default_chains")]
    pub chains: String,

    /// Legacy per-tenant namespace, read-only
    #[serde(default = "default_common_variables_v1")]
    pub common_variables_v1: String,

    #[serde(default = "default_common_variables_v2")]
    pub common_variables_v2: String,
}

impl Default for KvKeysConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            engine_config_root: default_engine_config_root(),
            deployments_update: default_deployments_update(),
            engines_state: default_engines_state(),
            libraries_update: default_libraries_update(),
            runtime_configurations: default_runtime_configurations(),
            chains: default_chains(),
            common_variables_v1: default_common_variables_v1(),
            common_variables_v2: default_common_variables_v2(),
        }
    }
}

impl KvKeysConfig {
    pub fn validate(&self) -> Result<()> {
        let segments = [
            ("prefix", &self.prefix),
            ("engine_config_root", &self.engine_config_root),
            ("deployments_update", &self.deployments_update),
            ("engines_state", &self.engines_state),
            ("libraries_update", &self.libraries_update),
            ("runtime_configurations", &self.runtime_configurations),
            ("chains", &self.chains),
            ("common_variables_v1", &self.common_variables_v1),
            ("common_variables_v2", &self.common_variables_v2),
        ];

        for (name, value) in segments {
            if !value.starts_with('/') || value.ends_with('/') || value.len() < 2 {
                return Err(Error::Config(ConfigError::Message(format!(
                    "keys.{name} = {value:?} must start with '/' and not end with '/'"
                ))));
            }
        }

        // the chain id is located relative to this marker, it has to be one segment
        if self.runtime_configurations[1..].contains('/') {
            return Err(Error::Config(ConfigError::Message(format!(
                "keys.runtime_configurations = {:?} must be a single path segment",
                self.runtime_configurations
            ))));
        }

        Ok(())
    }
}

fn default_prefix() -> String {
    "/config/local".to_string()
}
fn default_engine_config_root() -> String {
    "/qip-engine-configurations".to_string()
}
fn default_deployments_update() -> String {
    "/deployments-update".to_string()
}
fn default_engines_state() -> String {
    "/engines-state".to_string()
}
fn default_libraries_update() -> String {
    "/libraries-update".to_string()
}
fn default_runtime_configurations() -> String {
    "/runtime-configurations".to_string()
}
fn default_chains() -> String {
    "/chains".to_string()
}
fn default_common_variables_v1() -> String {
    "/common-variables".to_string()
}
fn default_common_variables_v2() -> String {
    "/common-variables-v2".to_string()
}
