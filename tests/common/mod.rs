use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use engine_config_sync::ActionLogger;
use engine_config_sync::ActionRecord;
use engine_config_sync::ConfigSyncService;
use engine_config_sync::LogOperation;
use engine_config_sync::MemKvStore;
use engine_config_sync::MemSecretBackend;
use engine_config_sync::Result;
use engine_config_sync::SecretBackend;
use engine_config_sync::SecretData;
use engine_config_sync::SecretLabel;
use engine_config_sync::SecretStore;
use engine_config_sync::SecretUpdateFailure;
use engine_config_sync::SecretUpdateSender;
use engine_config_sync::SyncConfig;
use engine_config_sync::VariableCoordinator;
use parking_lot::Mutex;

pub const ROOT: &str = "/config/local/qip-engine-configurations";
pub const DEFAULT_SECRET: &str = "secured-variables-v2";

#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<ActionRecord>>,
}

impl RecordingLogger {
    pub fn operations(&self) -> Vec<(LogOperation, String)> {
        self.records
            .lock()
            .iter()
            .map(|r| (r.operation, r.entity_name.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl ActionLogger for RecordingLogger {
    fn log_action(
        &self,
        record: ActionRecord,
    ) {
        self.records.lock().push(record);
    }
}

/// In-memory backend whose asynchronous removals fail for chosen secrets
#[derive(Debug, Clone, Default)]
pub struct FlakySecretBackend {
    inner: MemSecretBackend,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl FlakySecretBackend {
    pub fn fail_removals_of(
        &self,
        secret: &str,
    ) {
        self.failing.lock().insert(secret.to_string());
    }
}

#[async_trait]
impl SecretBackend for FlakySecretBackend {
    async fn list_secrets(
        &self,
        label: &SecretLabel,
    ) -> Result<HashMap<String, SecretData>> {
        self.inner.list_secrets(label).await
    }

    async fn read_secret(
        &self,
        name: &str,
    ) -> Result<Option<SecretData>> {
        self.inner.read_secret(name).await
    }

    async fn create_secret(
        &self,
        name: &str,
        label: &SecretLabel,
        data: SecretData,
    ) -> Result<()> {
        self.inner.create_secret(name, label, data).await
    }

    async fn add_data(
        &self,
        name: &str,
        data: SecretData,
        init: bool,
    ) -> Result<SecretData> {
        self.inner.add_data(name, data, init).await
    }

    async fn update_data(
        &self,
        name: &str,
        data: SecretData,
    ) -> Result<SecretData> {
        self.inner.update_data(name, data).await
    }

    async fn remove_data(
        &self,
        name: &str,
        keys: HashSet<String>,
    ) -> Result<SecretData> {
        self.inner.remove_data(name, keys).await
    }

    fn remove_data_async(
        &self,
        name: &str,
        keys: HashSet<String>,
        completion: SecretUpdateSender,
    ) -> Result<()> {
        if self.failing.lock().contains(name) {
            let _ = completion.send(Err(SecretUpdateFailure {
                status: 503,
                message: format!("secret {name} is being rotated"),
            }));
            return Ok(());
        }
        self.inner.remove_data_async(name, keys, completion)
    }
}

pub struct Catalog {
    pub kv: Arc<MemKvStore>,
    pub sync: Arc<ConfigSyncService>,
    pub secrets: FlakySecretBackend,
    pub logger: Arc<RecordingLogger>,
    pub variables: VariableCoordinator,
}

pub fn catalog() -> Catalog {
    let config = SyncConfig::default();
    let kv = Arc::new(MemKvStore::new());
    let sync = Arc::new(ConfigSyncService::new(kv.clone(), &config));
    let secrets = FlakySecretBackend::default();
    let logger = Arc::new(RecordingLogger::default());
    let store = SecretStore::new(Arc::new(secrets.clone()), logger.clone(), &config.secrets);
    let variables = VariableCoordinator::new(store, sync.clone(), logger.clone(), &config);

    Catalog {
        kv,
        sync,
        secrets,
        logger,
        variables,
    }
}

pub fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn names(list: &[&str]) -> HashSet<String> {
    list.iter().map(|n| n.to_string()).collect()
}
