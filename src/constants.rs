// -
// Secret backend

/// Value of the label pair every managed secret carries
pub(crate) const SECURED_LABEL_VALUE: &str = "secured";

/// Secret name that callers may use instead of the configured default
pub(crate) const DEFAULT_SECRET_ALIAS: &str = "default";

/// Default plain variable restored at startup
pub const NAMESPACE_VARIABLE_NAME: &str = "namespace";

// -
// KV layout

/// Deprecated root of chain runtime properties, delete-only
pub(crate) const LEGACY_CHAINS_RUNTIME_CONFIGURATIONS: &str = "/chains-runtime-configurations";

/// Consul HTTP API
pub(crate) const CONSUL_INDEX_HEADER: &str = "x-consul-index";
pub(crate) const CONSUL_TOKEN_HEADER: &str = "X-Consul-Token";

// -
// Decode failure resource names

pub(crate) const ENGINES_STATE_RESOURCE: &str = "engines state";
pub(crate) const DEPLOYMENTS_UPDATE_RESOURCE: &str = "deployments update timestamp";
pub(crate) const CHAINS_RUNTIME_CONFIG_RESOURCE: &str = "chains runtime configuration";
