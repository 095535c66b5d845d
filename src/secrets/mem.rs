use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::SecretBackend;
use super::SecretData;
use super::SecretLabel;
use super::SecretUpdateFailure;
use super::SecretUpdateSender;
use crate::Result;
use crate::SecretError;

#[derive(Debug, Clone)]
struct StoredSecret {
    label: SecretLabel,
    data: SecretData,
}

/// In-process secret backend for local development and tests
#[derive(Debug, Clone, Default)]
pub struct MemSecretBackend {
    secrets: Arc<DashMap<String, StoredSecret>>,
}

impl MemSecretBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn modify(
        &self,
        name: &str,
        modifier: impl FnOnce(&mut SecretData),
    ) -> Result<SecretData> {
        match self.secrets.get_mut(name) {
            Some(mut secret) => {
                modifier(&mut secret.data);
                Ok(secret.data.clone())
            }
            None => Err(SecretError::SecretNotFound(name.to_string()).into()),
        }
    }
}

#[async_trait]
impl SecretBackend for MemSecretBackend {
    async fn list_secrets(
        &self,
        label: &SecretLabel,
    ) -> Result<HashMap<String, SecretData>> {
        Ok(self
            .secrets
            .iter()
            .filter(|entry| entry.value().label == *label)
            .map(|entry| (entry.key().clone(), entry.value().data.clone()))
            .collect())
    }

    async fn read_secret(
        &self,
        name: &str,
    ) -> Result<Option<SecretData>> {
        Ok(self.secrets.get(name).map(|secret| secret.data.clone()))
    }

    async fn create_secret(
        &self,
        name: &str,
        label: &SecretLabel,
        data: SecretData,
    ) -> Result<()> {
        match self.secrets.entry(name.to_string()) {
            Entry::Occupied(_) => Err(SecretError::AlreadyExists(name.to_string()).into()),
            Entry::Vacant(slot) => {
                slot.insert(StoredSecret {
                    label: label.clone(),
                    data,
                });
                Ok(())
            }
        }
    }

    async fn add_data(
        &self,
        name: &str,
        data: SecretData,
        _init: bool,
    ) -> Result<SecretData> {
        self.modify(name, |current| current.extend(data))
    }

    async fn update_data(
        &self,
        name: &str,
        data: SecretData,
    ) -> Result<SecretData> {
        self.modify(name, |current| current.extend(data))
    }

    async fn remove_data(
        &self,
        name: &str,
        keys: HashSet<String>,
    ) -> Result<SecretData> {
        self.modify(name, |current| current.retain(|k, _| !keys.contains(k)))
    }

    fn remove_data_async(
        &self,
        name: &str,
        keys: HashSet<String>,
        completion: SecretUpdateSender,
    ) -> Result<()> {
        let backend = self.clone();
        let name = name.to_string();

        tokio::spawn(async move {
            let outcome = backend
                .modify(&name, |current| current.retain(|k, _| !keys.contains(k)))
                .map_err(|e| SecretUpdateFailure {
                    status: if e.is_not_found() { 404 } else { 500 },
                    message: e.to_string(),
                });
            if completion.send(outcome).is_err() {
                debug!(secret = %name, "secret update outcome dropped, receiver gone");
            }
        });
        Ok(())
    }
}
