//! Catalog side of the engine configuration protocol.
//!
//! [`ConfigSyncService`] publishes deployment timestamps, chain runtime
//! properties, libraries and common variables into the KV store, and watches
//! what engines report back. Every watch takes the caller's [`WatchState`]
//! for that resource: one loop per resource, re-issuing the wait right after
//! each return.

mod decode;
pub(crate) use decode::*;


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::utils::time::timestamp_millis;
use crate::ChainRuntimeProperties;
use crate::ConsulTransport;
use crate::EngineState;
use crate::Error;
use crate::KvPaths;
use crate::KvTransport;
use crate::LibraryUpdate;
use crate::PlainVariableStore;
use crate::ReqwestHttpClient;
use crate::Result;
use crate::SyncConfig;
use crate::TxnOp;
use crate::WatchState;
use crate::WatchUpdate;

pub struct ConfigSyncService {
    transport: Arc<dyn KvTransport>,
    paths: KvPaths,
    watch_wait: Duration,
}

impl ConfigSyncService {
    pub fn new(
        transport: Arc<dyn KvTransport>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            transport,
            paths: KvPaths::new(&config.keys),
            watch_wait: config.kv.watch_wait(),
        }
    }

    /// Service talking to the Consul HTTP API at `config.kv.address`
    pub fn connect(config: &SyncConfig) -> Result<Self> {
        let client = ReqwestHttpClient::new(&config.kv)?;
        let transport = ConsulTransport::new(&config.kv, Arc::new(client));
        info!(address = %config.kv.address, "config sync connected to KV store");
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn paths(&self) -> &KvPaths {
        &self.paths
    }

    // -
    // Deployments

    /// Stamps the current time as the last deployment change.
    ///
    /// Call only after the change it announces is committed, so engines never
    /// observe the stamp before the data.
    pub async fn update_deployments_timestamp(&self) -> Result<u64> {
        let timestamp = timestamp_millis();
        debug!(timestamp, "Update deployments modification timestamp");
        self.transport
            .put(self.paths.deployments_update(), timestamp.to_string().into_bytes())
            .await?;
        Ok(timestamp)
    }

    /// Waits for the deployments timestamp to move; 0 means never stamped.
    ///
    /// # Errors
    /// - `DecodeFailure` if the value is not an integer; `state` is rolled back
    /// - `ProtocolViolation` if the key has more than one entry
    pub async fn watch_deployments_update(
        &self,
        state: &mut WatchState,
    ) -> Result<WatchUpdate<u64>> {
        let path = self.paths.deployments_update();
        let response = self
            .transport
            .wait_for_changes(path, false, state.last_index(), self.watch_wait)
            .await?;
        if !state.observe(response.index) {
            return Ok(WatchUpdate::Unchanged);
        }

        decode_deployments_update(path, &response.entries)
            .map(WatchUpdate::Changed)
            .inspect_err(|e| rollback_on_decode_failure(state, e))
    }

    // -
    // Engines state

    /// Waits for any engine to publish a new state report.
    ///
    /// Only direct children of the engines-state root are decoded; keys
    /// without a value are skipped.
    pub async fn watch_engines_state(
        &self,
        state: &mut WatchState,
    ) -> Result<WatchUpdate<Vec<EngineState>>> {
        let path = self.paths.engines_state();
        let response = self
            .transport
            .wait_for_changes(path, true, state.last_index(), self.watch_wait)
            .await?;
        if !state.observe(response.index) {
            return Ok(WatchUpdate::Unchanged);
        }

        decode_engines_state(path, &response.entries)
            .map(WatchUpdate::Changed)
            .inspect_err(|e| rollback_on_decode_failure(state, e))
    }

    /// Current engine reports; any failure is logged and reads as no engines
    pub async fn engines_state_safe(&self) -> Vec<EngineState> {
        let path = self.paths.engines_state();
        let result = match self.transport.wait_for_changes(path, true, 0, Duration::ZERO).await {
            Ok(response) => decode_engines_state(path, &response.entries),
            Err(e) => Err(e),
        };

        result.unwrap_or_else(|e| {
            warn!("Failed to get engines state: {}", e);
            Vec::new()
        })
    }

    // -
    // Libraries

    pub async fn update_libraries(
        &self,
        libraries: &[LibraryUpdate],
    ) -> Result<()> {
        debug!(count = libraries.len(), "Update libraries");
        self.transport
            .put(self.paths.libraries_update(), serde_json::to_vec(libraries)?)
            .await
    }

    // -
    // Chain runtime configuration

    pub async fn update_chain_runtime_config(
        &self,
        chain_id: &str,
        properties: &ChainRuntimeProperties,
    ) -> Result<()> {
        self.transport
            .put(&self.paths.chain_runtime_config(chain_id), serde_json::to_vec(properties)?)
            .await
    }

    pub async fn delete_chain_runtime_config(
        &self,
        chain_id: &str,
    ) -> Result<()> {
        self.transport
            .delete(&self.paths.chain_runtime_config(chain_id), false)
            .await
    }

    /// Writes every chain's properties in one transaction
    pub async fn update_chains_runtime_config(
        &self,
        properties: &HashMap<String, ChainRuntimeProperties>,
    ) -> Result<()> {
        let ops = properties
            .iter()
            .map(|(chain_id, props)| -> Result<TxnOp> {
                Ok(TxnOp::Set {
                    path: self.paths.chain_runtime_config(chain_id),
                    value: serde_json::to_vec(props)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.transport.transact(ops).await
    }

    /// Runtime properties of every chain; empty when nothing is stored
    pub async fn chain_runtime_config(&self) -> Result<HashMap<String, ChainRuntimeProperties>> {
        match self.transport.get(self.paths.chains_runtime_config_listing(), true).await {
            Ok(response) => decode_chains_runtime_config(self.paths.runtime_marker(), &response.entries),
            Err(e) if e.is_not_found() => Ok(HashMap::new()),
            Err(e) => Err(e),
        }
    }

    /// Waits for any chain's runtime properties to change.
    ///
    /// Every entry is attempted; if one fails the whole call fails and
    /// `state` is rolled back, with the decoded rest kept on the error.
    pub async fn watch_chains_runtime_config(
        &self,
        state: &mut WatchState,
    ) -> Result<WatchUpdate<HashMap<String, ChainRuntimeProperties>>> {
        let response = self
            .transport
            .wait_for_changes(
                self.paths.chains_runtime_config_listing(),
                true,
                state.last_index(),
                self.watch_wait,
            )
            .await?;
        if !state.observe(response.index) {
            return Ok(WatchUpdate::Unchanged);
        }

        decode_chains_runtime_config(self.paths.runtime_marker(), &response.entries)
            .map(WatchUpdate::Changed)
            .inspect_err(|e| rollback_on_decode_failure(state, e))
    }

    pub async fn chains_runtime_config_exists(&self) -> Result<bool> {
        self.exists(self.paths.chains_runtime_config_listing()).await
    }

    pub async fn delete_legacy_chains_runtime_config_kv(&self) -> Result<()> {
        self.transport
            .delete(&self.paths.legacy_chains_runtime_config(), true)
            .await
    }

    // -
    // Common variables

    /// `None` if the variable does not exist; a stored null reads as `""`
    pub async fn common_variable(
        &self,
        name: &str,
    ) -> Result<Option<String>> {
        match self.transport.get(&self.paths.common_variable(name), false).await {
            Ok(response) => Ok(response
                .entries
                .first()
                .map(|entry| entry.value_str().unwrap_or_default())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Named variables in one multi-key read; missing names are left out
    pub async fn common_variables(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, String>> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }
        let paths = names.iter().map(|name| self.paths.common_variable(name)).collect();
        let entries = self.transport.get_many(paths).await?;
        Ok(decode_common_variables(None, &entries))
    }

    pub async fn all_common_variables(&self) -> Result<HashMap<String, String>> {
        self.variables_under(self.paths.common_variables()).await
    }

    /// Read-only view of the pre-v2 per-tenant namespace
    pub async fn tenant_common_variables_legacy(
        &self,
        tenant_id: &str,
    ) -> Result<HashMap<String, String>> {
        self.variables_under(&self.paths.tenant_common_variables(tenant_id))
            .await
    }

    pub async fn common_variables_exist(&self) -> Result<bool> {
        self.exists(self.paths.common_variables()).await
    }

    /// Drops the whole pre-v2 namespace once migrated
    pub async fn delete_legacy_variables_kv(&self) -> Result<()> {
        // trailing '/' keeps the v2 sibling, which shares the v1 name as prefix
        let prefix = format!("{}/", self.paths.legacy_common_variables());
        self.transport.delete(&prefix, true).await
    }

    pub async fn update_common_variable(
        &self,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.transport
            .put(&self.paths.common_variable(name), value.as_bytes().to_vec())
            .await
    }

    pub async fn update_common_variables(
        &self,
        variables: &HashMap<String, String>,
    ) -> Result<()> {
        let ops = variables
            .iter()
            .map(|(name, value)| TxnOp::Set {
                path: self.paths.common_variable(name),
                value: value.as_bytes().to_vec(),
            })
            .collect();
        self.transport.transact(ops).await
    }

    pub async fn delete_common_variable(
        &self,
        name: &str,
    ) -> Result<()> {
        self.transport
            .delete(&self.paths.common_variable(name), false)
            .await
    }

    pub async fn delete_common_variables(
        &self,
        names: &[String],
    ) -> Result<()> {
        let ops = names
            .iter()
            .map(|name| TxnOp::Delete {
                path: self.paths.common_variable(name),
            })
            .collect();
        self.transport.transact(ops).await
    }

    async fn variables_under(
        &self,
        prefix: &str,
    ) -> Result<HashMap<String, String>> {
        match self.transport.get(prefix, true).await {
            Ok(response) => Ok(decode_common_variables(Some(prefix), &response.entries)),
            Err(e) if e.is_not_found() => Ok(HashMap::new()),
            Err(e) => Err(e),
        }
    }

    async fn exists(
        &self,
        path: &str,
    ) -> Result<bool> {
        match self.transport.get(path, true).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn rollback_on_decode_failure(
    state: &mut WatchState,
    error: &Error,
) {
    if error.as_decode_failure().is_some() {
        debug!(
            last_index = state.last_index(),
            previous_index = state.previous_index(),
            "rolling back watch index after decode failure"
        );
        state.rollback();
    }
}

#[async_trait]
impl PlainVariableStore for ConfigSyncService {
    async fn all_common_variables(&self) -> Result<HashMap<String, String>> {
        ConfigSyncService::all_common_variables(self).await
    }

    async fn common_variable(
        &self,
        name: &str,
    ) -> Result<Option<String>> {
        ConfigSyncService::common_variable(self, name).await
    }

    async fn update_common_variable(
        &self,
        name: &str,
        value: &str,
    ) -> Result<()> {
        ConfigSyncService::update_common_variable(self, name, value).await
    }

    async fn update_common_variables(
        &self,
        variables: HashMap<String, String>,
    ) -> Result<()> {
        ConfigSyncService::update_common_variables(self, &variables).await
    }

    async fn delete_common_variables(
        &self,
        names: Vec<String>,
    ) -> Result<()> {
        ConfigSyncService::delete_common_variables(self, &names).await
    }
}
