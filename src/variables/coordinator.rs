use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::timeout_at;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::ensure_not_blank;
use super::ensure_well_formed;
use super::ImportEntityStatus;
use super::ImportVariableResult;
use super::PlainVariableStore;
use super::SecretErrorRecord;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::ActionLogger;
use crate::ActionRecord;
use crate::BackoffPolicy;
use crate::LogOperation;
use crate::Result;
use crate::SecretData;
use crate::SecretError;
use crate::SecretStore;
use crate::SyncConfig;
use crate::VariableError;
use crate::VariableKind;

/// Arbitrates the plain and secured halves of the variable namespace.
///
/// Every secret read and mutation issued here is serialized by one fair
/// (FIFO) lock. Action records are emitted after the lock is released and
/// only for changes that were committed.
pub struct VariableCoordinator {
    secrets: SecretStore,
    plain: Arc<dyn PlainVariableStore>,
    action_logger: Arc<dyn ActionLogger>,
    lock: Mutex<()>,
    batch_delete_timeout: Option<Duration>,
    restore_policy: BackoffPolicy,
}

impl VariableCoordinator {
    pub fn new(
        secrets: SecretStore,
        plain: Arc<dyn PlainVariableStore>,
        action_logger: Arc<dyn ActionLogger>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            secrets,
            plain,
            action_logger,
            lock: Mutex::new(()),
            batch_delete_timeout: config.secrets.batch_delete_timeout(),
            restore_policy: config.retry.restore_variables,
        }
    }

    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    // -
    // Secured variables

    /// Variable names of every labeled secret, by secret name
    pub async fn all_secrets_variables_names(&self) -> Result<HashMap<String, HashSet<String>>> {
        let _guard = self.lock.lock().await;
        let all = self.secrets.all_secrets_data().await?;
        Ok(all
            .into_iter()
            .map(|(secret, data)| (secret, data.into_keys().collect()))
            .collect())
    }

    pub async fn variables_for_default_secret(
        &self,
        fail_if_not_exist: bool,
    ) -> Result<HashSet<String>> {
        let secret = self.secrets.default_secret_name().to_string();
        self.variables_for_secret(&secret, fail_if_not_exist).await
    }

    pub async fn variables_for_secret(
        &self,
        secret_name: &str,
        fail_if_not_exist: bool,
    ) -> Result<HashSet<String>> {
        let secret = self.secrets.resolve_secret_name(secret_name);
        let _guard = self.lock.lock().await;
        let data = self.secrets.secret_data(&secret, fail_if_not_exist).await?;
        Ok(data.into_keys().collect())
    }

    pub async fn add_variables_to_default_secret(
        &self,
        variables: HashMap<String, String>,
    ) -> Result<HashSet<String>> {
        let secret = self.secrets.default_secret_name().to_string();
        self.add_variables(&secret, variables, false).await
    }

    /// Adds or overwrites `variables` in a secret and returns their names.
    ///
    /// # Errors
    /// - [`SecretError::SecretNotFound`] if the secret does not exist
    /// - [`VariableError::NameCollision`] if the target is the default secret
    ///   and a common variable shares a name with it or with the input
    /// - [`VariableError::EmptyName`] for a blank name
    pub async fn add_variables(
        &self,
        secret_name: &str,
        variables: HashMap<String, String>,
        import_mode: bool,
    ) -> Result<HashSet<String>> {
        if variables.is_empty() {
            return Ok(HashSet::new());
        }
        let secret = self.secrets.resolve_secret_name(secret_name);
        let names: HashSet<String> = variables.keys().cloned().collect();

        let existing = {
            let _guard = self.lock.lock().await;
            let current = self.secrets.secret_data(&secret, true).await?;

            if self.secrets.is_default_secret(&secret) {
                self.ensure_no_common_variable_collision(&current, &names)
                    .await?;
            }
            for name in sorted(&names) {
                ensure_not_blank(name, VariableKind::Secured)?;
            }

            let init = current.is_empty();
            self.secrets.add_entries(&secret, variables, init).await?;
            current
        };

        for name in sorted(&names) {
            let operation = if import_mode {
                LogOperation::Import
            } else if existing.contains_key(name) {
                LogOperation::Update
            } else {
                LogOperation::Create
            };
            self.log_secured(name, &secret, operation);
        }
        Ok(names)
    }

    /// Imports already parsed variables into the default secret
    pub async fn import_secured_variables(
        &self,
        variables: HashMap<String, String>,
    ) -> Result<HashSet<String>> {
        let secret = self.secrets.default_secret_name().to_string();
        self.add_variables(&secret, variables, true).await
    }

    pub async fn update_variable_in_default_secret(
        &self,
        name: &str,
        value: Option<String>,
    ) -> Result<String> {
        let secret = self.secrets.default_secret_name().to_string();
        self.update_variables(&secret, HashMap::from([(name.to_string(), value)]))
            .await?;
        Ok(name.to_string())
    }

    /// Overwrites existing variables; a `None` value is stored as `""`.
    ///
    /// # Errors
    /// - [`VariableError::VariableNotFound`] if any name is not in the
    ///   secret; nothing is written then
    pub async fn update_variables(
        &self,
        secret_name: &str,
        variables: HashMap<String, Option<String>>,
    ) -> Result<HashSet<String>> {
        let secret = self.secrets.resolve_secret_name(secret_name);
        let names: HashSet<String> = variables.keys().cloned().collect();

        {
            let _guard = self.lock.lock().await;
            let current = self.secrets.secret_data(&secret, true).await?;

            for name in sorted(&names) {
                ensure_not_blank(name, VariableKind::Secured)?;
                if !current.contains_key(name) {
                    return Err(VariableError::VariableNotFound {
                        secret,
                        name: name.clone(),
                    }
                    .into());
                }
            }

            let updates: SecretData = variables
                .into_iter()
                .map(|(name, value)| (name, value.unwrap_or_default()))
                .collect();
            self.secrets.update_entries(&secret, updates).await?;
        }

        for name in sorted(&names) {
            self.log_secured(name, &secret, LogOperation::Update);
        }
        Ok(names)
    }

    pub async fn delete_variables_from_default_secret(
        &self,
        names: HashSet<String>,
    ) -> Result<()> {
        let secret = self.secrets.default_secret_name().to_string();
        self.delete_variables(&secret, names, true).await
    }

    /// Removes `names` from a secret; DELETE is logged only for names that
    /// were present.
    pub async fn delete_variables(
        &self,
        secret_name: &str,
        names: HashSet<String>,
        log_operation: bool,
    ) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let secret = self.secrets.resolve_secret_name(secret_name);

        let existing = {
            let _guard = self.lock.lock().await;
            let current = self.secrets.secret_data(&secret, true).await?;
            self.secrets.remove_entries(&secret, names.clone()).await?;
            current
        };

        if log_operation {
            for name in sorted(&names).filter(|name| existing.contains_key(*name)) {
                self.log_secured(name, &secret, LogOperation::Delete);
            }
        }
        Ok(())
    }

    /// Removes variables from several secrets concurrently.
    ///
    /// Secrets that are missing, fail, or do not answer within the batch
    /// timeout are reported as records sorted by secret name; the others are
    /// committed and logged.
    ///
    /// # Errors
    /// - [`VariableError::AllSecretsFailed`] if no targeted secret succeeded
    pub async fn delete_variables_for_multiple_secrets(
        &self,
        variables_per_secret: HashMap<String, HashSet<String>>,
    ) -> Result<Vec<SecretErrorRecord>> {
        if variables_per_secret.is_empty() {
            return Ok(Vec::new());
        }

        let mut targets: BTreeMap<String, HashSet<String>> = BTreeMap::new();
        for (secret_name, names) in variables_per_secret {
            targets
                .entry(self.secrets.resolve_secret_name(&secret_name))
                .or_default()
                .extend(names);
        }

        let mut failures: BTreeMap<String, String> = BTreeMap::new();
        let existing = {
            let _guard = self.lock.lock().await;
            let all = self.secrets.all_secrets_data().await?;

            let mut pending = Vec::with_capacity(targets.len());
            for (secret, names) in &targets {
                if !all.contains_key(secret) {
                    failures.insert(secret.clone(), SecretError::SecretNotFound(secret.clone()).to_string());
                    continue;
                }
                match self.secrets.remove_entries_async(secret, names.clone()) {
                    Ok(update) => pending.push(update),
                    Err(e) => {
                        debug!(secret = %secret, "removal request not issued: {}", e);
                        failures.insert(secret.clone(), format!("Failed to delete variables from secret: {secret}"));
                    }
                }
            }

            let bound = self.batch_delete_timeout.map(|after| (Instant::now() + after, after));
            let outcomes = join_all(pending.into_iter().map(|update| async move {
                let secret = update.secret_name().to_string();
                let outcome = match bound {
                    Some((deadline, after)) => match timeout_at(deadline, update).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(SecretError::Timeout {
                            secret: secret.clone(),
                            after,
                        }
                        .into()),
                    },
                    None => update.await,
                };
                (secret, outcome)
            }))
            .await;

            for (secret, outcome) in outcomes {
                if let Err(e) = outcome {
                    failures.insert(secret, e.to_string());
                }
            }
            all
        };

        for (secret, names) in targets.iter().filter(|(secret, _)| !failures.contains_key(*secret)) {
            let Some(before) = existing.get(secret) else {
                continue;
            };
            for name in sorted(names).filter(|name| before.contains_key(*name)) {
                self.log_secured(name, secret, LogOperation::Delete);
            }
        }

        let errors: Vec<SecretErrorRecord> = failures
            .into_iter()
            .map(|(secret_name, message)| {
                error!(secret = %secret_name, "Failed to delete variables from secret: {}", message);
                SecretErrorRecord { secret_name, message }
            })
            .collect();

        if errors.len() == targets.len() {
            return Err(VariableError::AllSecretsFailed { errors }.into());
        }
        Ok(errors)
    }

    // -
    // Common variables

    pub async fn common_variables(&self) -> Result<HashMap<String, String>> {
        self.plain.all_common_variables().await
    }

    /// # Errors
    /// - [`VariableError::MalformedName`] if `name` is outside `[-._a-zA-Z0-9]+`
    /// - [`VariableError::NameCollision`] if the default secret holds `name`
    pub async fn add_common_variable(
        &self,
        name: &str,
        value: &str,
    ) -> Result<String> {
        ensure_well_formed(name)?;

        let secured = self.variables_for_default_secret(false).await?;
        let result = self.check_common_variable(name, value, &secured).await?;
        self.plain.update_common_variable(name, value).await?;

        self.log_common(name, status_operation(result.status, false));
        Ok(result.name)
    }

    /// Writes `variables` in one transaction after checking every name.
    ///
    /// Results are sorted by name. Nothing is written if any name fails.
    pub async fn add_common_variables(
        &self,
        variables: HashMap<String, String>,
        import_mode: bool,
    ) -> Result<Vec<ImportVariableResult>> {
        if variables.is_empty() {
            return Ok(Vec::new());
        }

        let secured = self.variables_for_default_secret(false).await?;
        let mut results = Vec::with_capacity(variables.len());
        for (name, value) in variables.iter().collect::<BTreeMap<_, _>>() {
            results.push(self.check_common_variable(name, value, &secured).await?);
        }

        self.plain.update_common_variables(variables).await?;

        for result in &results {
            self.log_common(&result.name, status_operation(result.status, import_mode));
        }
        Ok(results)
    }

    /// Writes without checks or action records, for system-owned variables
    pub async fn add_common_variables_unlogged(
        &self,
        variables: HashMap<String, String>,
    ) -> Result<()> {
        self.plain.update_common_variables(variables).await
    }

    pub async fn delete_common_variables(
        &self,
        names: Vec<String>,
    ) -> Result<()> {
        self.plain.delete_common_variables(names.clone()).await?;
        for name in &names {
            self.log_common(name, LogOperation::Delete);
        }
        Ok(())
    }

    // -
    // Defaults

    /// Makes `defaults` plain variables, creating the default secret if
    /// needed and evicting any secured variable of the same name.
    ///
    /// Retried with the configured restore policy.
    pub async fn restore_default_variables(
        &self,
        defaults: HashMap<String, String>,
    ) -> Result<()> {
        task_with_timeout_and_exponential_backoff(|| self.restore_default_variables_once(&defaults), self.restore_policy)
            .await
            .inspect_err(|e| error!("Failed to restore default variables: {}", e))
    }

    async fn restore_default_variables_once(
        &self,
        defaults: &HashMap<String, String>,
    ) -> Result<()> {
        debug!("Restore variables started");
        let secret = self.secrets.default_secret_name().to_string();

        let attempt = async {
            self.secrets.create_secret(&secret).await?;
            self.delete_variables(&secret, defaults.keys().cloned().collect(), false)
                .await?;
            self.add_common_variables_unlogged(defaults.clone()).await
        };
        attempt
            .await
            .inspect_err(|e| warn!("Failed to restore variables, will retry: {}", e))?;

        debug!("Restore variables finished");
        Ok(())
    }

    // -
    // Helpers

    async fn ensure_no_common_variable_collision(
        &self,
        current: &SecretData,
        new_names: &HashSet<String>,
    ) -> Result<()> {
        let common = self.plain.all_common_variables().await?;
        let mut common_names: Vec<&String> = common.keys().collect();
        common_names.sort();

        match common_names
            .into_iter()
            .find(|name| current.contains_key(*name) || new_names.contains(*name))
        {
            Some(name) => Err(VariableError::NameCollision {
                name: name.clone(),
                existing: VariableKind::Common,
            }
            .into()),
            None => Ok(()),
        }
    }

    async fn check_common_variable(
        &self,
        name: &str,
        value: &str,
        secured_names: &HashSet<String>,
    ) -> Result<ImportVariableResult> {
        if secured_names.contains(name) {
            return Err(VariableError::NameCollision {
                name: name.to_string(),
                existing: VariableKind::Secured,
            }
            .into());
        }
        ensure_not_blank(name, VariableKind::Common)?;
        ensure_well_formed(name)?;

        let status = match self.plain.common_variable(name).await? {
            Some(_) => ImportEntityStatus::Updated,
            None => ImportEntityStatus::Created,
        };
        Ok(ImportVariableResult {
            name: name.to_string(),
            value: value.to_string(),
            status,
        })
    }

    fn log_secured(
        &self,
        name: &str,
        secret: &str,
        operation: LogOperation,
    ) {
        self.action_logger
            .log_action(ActionRecord::secured_variable(name, secret, operation));
    }

    fn log_common(
        &self,
        name: &str,
        operation: LogOperation,
    ) {
        self.action_logger
            .log_action(ActionRecord::common_variable(name, operation));
    }
}

fn status_operation(
    status: ImportEntityStatus,
    import_mode: bool,
) -> LogOperation {
    match (import_mode, status) {
        (true, _) => LogOperation::Import,
        (false, ImportEntityStatus::Updated) => LogOperation::Update,
        (false, ImportEntityStatus::Created) => LogOperation::Create,
    }
}

/// Deterministic iteration order for validation and logging
fn sorted(names: &HashSet<String>) -> impl Iterator<Item = &String> {
    let mut names: Vec<&String> = names.iter().collect();
    names.sort();
    names.into_iter()
}
