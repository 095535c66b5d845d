//! One logical variable namespace over two physical stores.
//!
//! Common (plain) variables live in the KV store, secured variables live in
//! named secrets. A name may exist in only one of the two: the plain store
//! and the default secret never share a name.

mod coordinator;
pub use coordinator::*;


use std::collections::HashMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::constants::NAMESPACE_VARIABLE_NAME;
use crate::Result;
use crate::VariableError;
use crate::VariableKind;

/// Plain side of the namespace, implemented by [`crate::ConfigSyncService`]
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlainVariableStore: Send + Sync + 'static {
    async fn all_common_variables(&self) -> Result<HashMap<String, String>>;

    /// `None` if the variable does not exist
    async fn common_variable(
        &self,
        name: &str,
    ) -> Result<Option<String>>;

    async fn update_common_variable(
        &self,
        name: &str,
        value: &str,
    ) -> Result<()>;

    /// All-or-nothing
    async fn update_common_variables(
        &self,
        variables: HashMap<String, String>,
    ) -> Result<()>;

    /// All-or-nothing
    async fn delete_common_variables(
        &self,
        names: Vec<String>,
    ) -> Result<()>;
}

/// Failure of one secret inside a multi-secret operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretErrorRecord {
    pub secret_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportEntityStatus {
    Created,
    Updated,
}

/// Per-variable outcome of a common variables write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportVariableResult {
    pub name: String,
    pub value: String,
    pub status: ImportEntityStatus,
}

/// Names made only of `[-._a-zA-Z0-9]`, at least one character
pub fn is_valid_variable_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
}

pub(crate) fn ensure_not_blank(
    name: &str,
    kind: VariableKind,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(VariableError::EmptyName(kind).into());
    }
    Ok(())
}

pub(crate) fn ensure_well_formed(name: &str) -> Result<()> {
    if !is_valid_variable_name(name) {
        return Err(VariableError::MalformedName(name.to_string()).into());
    }
    Ok(())
}

/// Default common variables: `namespace` plus whatever the deployment
/// provides. Provided values never override the namespace.
pub fn default_common_variables(
    namespace: &str,
    provided: HashMap<String, String>,
) -> HashMap<String, String> {
    let mut defaults = provided;
    defaults.insert(NAMESPACE_VARIABLE_NAME.to_string(), namespace.to_string());
    defaults
}
