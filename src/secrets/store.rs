use std::collections::HashMap;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use tokio::sync::oneshot;
use tracing::debug;
use tracing::error;

use super::SecretBackend;
use super::SecretData;
use super::SecretLabel;
use super::SecretUpdateOutcome;
use crate::constants::DEFAULT_SECRET_ALIAS;
use crate::constants::SECURED_LABEL_VALUE;
use crate::ActionLogger;
use crate::ActionRecord;
use crate::EntityType;
use crate::LogOperation;
use crate::Result;
use crate::SecretError;
use crate::SecretsConfig;

/// Facade over a [`SecretBackend`] scoped to this subsystem's label and
/// default secret.
#[derive(Clone)]
pub struct SecretStore {
    backend: Arc<dyn SecretBackend>,
    action_logger: Arc<dyn ActionLogger>,
    label: SecretLabel,
    default_secret_name: String,
}

impl SecretStore {
    pub fn new(
        backend: Arc<dyn SecretBackend>,
        action_logger: Arc<dyn ActionLogger>,
        config: &SecretsConfig,
    ) -> Self {
        Self {
            backend,
            action_logger,
            label: SecretLabel::new(config.label.clone(), SECURED_LABEL_VALUE),
            default_secret_name: config.default_secret_name.clone(),
        }
    }

    pub fn label(&self) -> &SecretLabel {
        &self.label
    }

    /// Contents of every labeled secret, by name
    pub async fn all_secrets_data(&self) -> Result<HashMap<String, SecretData>> {
        self.backend.list_secrets(&self.label).await.inspect_err(|e| {
            error!("Can't list secrets: {}", e);
        })
    }

    /// Contents of one secret.
    ///
    /// # Errors
    /// - [`SecretError::SecretNotFound`] if the secret is missing and
    ///   `fail_if_not_exist` is set; otherwise a missing secret reads as empty
    pub async fn secret_data(
        &self,
        name: &str,
        fail_if_not_exist: bool,
    ) -> Result<SecretData> {
        match self.backend.read_secret(name).await? {
            Some(data) => Ok(data),
            None if fail_if_not_exist => {
                error!(secret = name, "Cannot get data from secret, secret not found");
                Err(SecretError::SecretNotFound(name.to_string()).into())
            }
            None => Ok(SecretData::new()),
        }
    }

    /// Creates an empty labeled secret; `false` if it already existed
    pub async fn create_secret(
        &self,
        name: &str,
    ) -> Result<bool> {
        if self.backend.read_secret(name).await?.is_some() {
            return Ok(false);
        }

        self.backend
            .create_secret(name, &self.label, SecretData::new())
            .await
            .inspect_err(|e| error!(secret = name, "Failed to create secret: {}", e))?;

        debug!(secret = name, "secret created");
        self.action_logger
            .log_action(ActionRecord::new(EntityType::Secret, name, LogOperation::Create));
        Ok(true)
    }

    pub async fn add_entries(
        &self,
        name: &str,
        data: SecretData,
        init: bool,
    ) -> Result<SecretData> {
        self.backend
            .add_data(name, data, init)
            .await
            .inspect_err(|e| error!(secret = name, "Failed to add data to secret: {}", e))
    }

    pub async fn update_entries(
        &self,
        name: &str,
        data: SecretData,
    ) -> Result<SecretData> {
        self.backend
            .update_data(name, data)
            .await
            .inspect_err(|e| error!(secret = name, "Failed to update data in secret: {}", e))
    }

    pub async fn remove_entries(
        &self,
        name: &str,
        keys: HashSet<String>,
    ) -> Result<SecretData> {
        self.backend
            .remove_data(name, keys)
            .await
            .inspect_err(|e| error!(secret = name, "Failed to remove data from secret: {}", e))
    }

    /// Issues an asynchronous removal and returns a future of its outcome.
    ///
    /// The removal runs whether or not the returned future is polled.
    pub fn remove_entries_async(
        &self,
        name: &str,
        keys: HashSet<String>,
    ) -> Result<PendingSecretUpdate> {
        let (tx, rx) = oneshot::channel();
        self.backend.remove_data_async(name, keys, tx)?;
        Ok(PendingSecretUpdate {
            secret_name: name.to_string(),
            receiver: rx,
        })
    }

    pub fn default_secret_name(&self) -> &str {
        &self.default_secret_name
    }

    pub fn is_default_secret(
        &self,
        name: &str,
    ) -> bool {
        self.default_secret_name == name
    }

    /// Maps a blank name or the `default` alias (any case) to the configured
    /// default secret.
    pub fn resolve_secret_name(
        &self,
        name: &str,
    ) -> String {
        if name.trim().is_empty() || name.eq_ignore_ascii_case(DEFAULT_SECRET_ALIAS) {
            self.default_secret_name.clone()
        } else {
            name.to_string()
        }
    }
}

/// Outcome of [`SecretStore::remove_entries_async`]; resolves to the
/// remaining secret content.
#[derive(Debug)]
pub struct PendingSecretUpdate {
    secret_name: String,
    receiver: oneshot::Receiver<SecretUpdateOutcome>,
}

impl PendingSecretUpdate {
    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }
}

impl Future for PendingSecretUpdate {
    type Output = Result<SecretData>;

    fn poll(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver).poll(cx).map(|received| match received {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(failure)) => Err(SecretError::Backend {
                secret: this.secret_name.clone(),
                status: failure.status,
                message: failure.message,
            }
            .into()),
            Err(_) => Err(SecretError::Backend {
                secret: this.secret_name.clone(),
                status: 500,
                message: "secret update abandoned without an outcome".to_string(),
            }
            .into()),
        })
    }
}
