//! Secret backend capability and the facade the variable layer talks to.
//!
//! Asynchronous removal reports its outcome through a oneshot channel,
//! which [`SecretStore::remove_entries_async`] exposes as a future.

mod mem;
mod store;
pub use mem::*;
pub use store::*;

#[cfg(test)]
mod store_test;

use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::oneshot;

use crate::Result;

/// Key/value content of one secret
pub type SecretData = HashMap<String, String>;

/// Label pair marking secrets owned by this subsystem
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretLabel {
    pub key: String,
    pub value: String,
}

impl SecretLabel {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Backend rejection of an asynchronous update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretUpdateFailure {
    pub status: u16,
    pub message: String,
}

pub type SecretUpdateOutcome = std::result::Result<SecretData, SecretUpdateFailure>;

/// Completion handle of an asynchronous update
pub type SecretUpdateSender = oneshot::Sender<SecretUpdateOutcome>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretBackend: Send + Sync + 'static {
    /// All secrets carrying `label`, by name
    async fn list_secrets(
        &self,
        label: &SecretLabel,
    ) -> Result<HashMap<String, SecretData>>;

    /// `None` when the secret does not exist
    async fn read_secret(
        &self,
        name: &str,
    ) -> Result<Option<SecretData>>;

    /// # Errors
    /// - [`crate::SecretError::AlreadyExists`] if `name` is taken
    async fn create_secret(
        &self,
        name: &str,
        label: &SecretLabel,
        data: SecretData,
    ) -> Result<()>;

    /// Merges `data` into the secret; `init` marks the first write into an
    /// empty secret.
    async fn add_data(
        &self,
        name: &str,
        data: SecretData,
        init: bool,
    ) -> Result<SecretData>;

    async fn update_data(
        &self,
        name: &str,
        data: SecretData,
    ) -> Result<SecretData>;

    async fn remove_data(
        &self,
        name: &str,
        keys: HashSet<String>,
    ) -> Result<SecretData>;

    /// Starts removing `keys` and returns right away; the outcome is sent to
    /// `completion` once the backend answers.
    ///
    /// An `Err` means the request could not be issued and `completion` was
    /// dropped.
    fn remove_data_async(
        &self,
        name: &str,
        keys: HashSet<String>,
        completion: SecretUpdateSender,
    ) -> Result<()>;
}
