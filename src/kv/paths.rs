use crate::constants::LEGACY_CHAINS_RUNTIME_CONFIGURATIONS;
use crate::KvKeysConfig;

/// Maps domain keys to store paths under `prefix + engine_config_root`.
#[derive(Debug, Clone)]
pub struct KvPaths {
    root: String,
    runtime_marker: String,
    deployments_update: String,
    engines_state: String,
    libraries_update: String,
    chains_runtime_config: String,
    chains_runtime_config_listing: String,
    common_variables_v1: String,
    common_variables_v2: String,
}

impl KvPaths {
    pub fn new(keys: &KvKeysConfig) -> Self {
        let root = format!("{}{}", keys.prefix, keys.engine_config_root);
        let chains_runtime_config = format!("{root}{}{}", keys.runtime_configurations, keys.chains);
        Self {
            runtime_marker: keys.runtime_configurations.trim_start_matches('/').to_string(),
            deployments_update: format!("{root}{}", keys.deployments_update),
            engines_state: format!("{root}{}", keys.engines_state),
            libraries_update: format!("{root}{}", keys.libraries_update),
            chains_runtime_config_listing: format!("{chains_runtime_config}/"),
            chains_runtime_config,
            common_variables_v1: format!("{root}{}", keys.common_variables_v1),
            common_variables_v2: format!("{root}{}", keys.common_variables_v2),
            root,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Segment that precedes `chains/<chainId>` in runtime configuration keys
    pub fn runtime_marker(&self) -> &str {
        &self.runtime_marker
    }

    pub fn deployments_update(&self) -> &str {
        &self.deployments_update
    }

    pub fn engines_state(&self) -> &str {
        &self.engines_state
    }

    pub fn libraries_update(&self) -> &str {
        &self.libraries_update
    }

    pub fn chains_runtime_config(&self) -> &str {
        &self.chains_runtime_config
    }

    /// Recursive listing prefix of every chain; the trailing `/` keeps
    /// siblings such as `chains-x` out
    pub fn chains_runtime_config_listing(&self) -> &str {
        &self.chains_runtime_config_listing
    }

    pub fn chain_runtime_config(
        &self,
        chain_id: &str,
    ) -> String {
        format!("{}/{chain_id}", self.chains_runtime_config)
    }

    pub fn legacy_chains_runtime_config(&self) -> String {
        format!("{}{LEGACY_CHAINS_RUNTIME_CONFIGURATIONS}", self.root)
    }

    pub fn common_variables(&self) -> &str {
        &self.common_variables_v2
    }

    pub fn common_variable(
        &self,
        name: &str,
    ) -> String {
        format!("{}/{name}", self.common_variables_v2)
    }

    pub fn legacy_common_variables(&self) -> &str {
        &self.common_variables_v1
    }

    pub fn tenant_common_variables(
        &self,
        tenant_id: &str,
    ) -> String {
        format!("{}/{tenant_id}", self.common_variables_v1)
    }
}

/// Key form expected inside store transactions: no leading `/`
pub fn txn_key(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Returns the child segment if `full_path` is a direct child of `prefix`.
///
/// `/a/b/c` is a direct child of `/a/b`; `/a/b`, `/a/b/` and `/a/b/c/d` are not.
pub fn decode_child_key<'a>(
    prefix: &str,
    full_path: &'a str,
) -> Option<&'a str> {
    let rest = full_path.strip_prefix(prefix)?.strip_prefix('/')?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some(rest)
}

/// Extracts the chain id located two segments after `root_marker`.
///
/// `root_marker` is matched as a whole segment, with or without its leading `/`.
pub fn decode_chain_id<'a>(
    full_path: &'a str,
    root_marker: &str,
) -> Option<&'a str> {
    let marker = root_marker.trim_start_matches('/');
    let segments: Vec<&str> = full_path.split('/').collect();
    let marker_index = segments.iter().position(|s| *s == marker)?;

    segments
        .get(marker_index + 2)
        .copied()
        .filter(|id| !id.is_empty())
}

/// Last path segment, used as the variable name of a common variable key
pub fn variable_name(full_path: &str) -> Option<&str> {
    full_path
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}
