//! Audit trail of user-visible variable and secret mutations.

use std::fmt;

#[cfg(test)]
use mockall::automock;
use tracing::info;

use crate::utils::time::timestamp_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogOperation {
    Create,
    Update,
    Delete,
    Import,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Secret,
    SecuredVariable,
    CommonVariable,
}

impl fmt::Display for LogOperation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            LogOperation::Create => "CREATE",
            LogOperation::Update => "UPDATE",
            LogOperation::Delete => "DELETE",
            LogOperation::Import => "IMPORT",
        };
        f.write_str(name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            EntityType::Secret => "SECRET",
            EntityType::SecuredVariable => "SECURED_VARIABLE",
            EntityType::CommonVariable => "COMMON_VARIABLE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub entity_type: EntityType,
    pub entity_name: String,
    pub parent_type: Option<EntityType>,
    pub parent_name: Option<String>,
    pub operation: LogOperation,
    pub timestamp_ms: u64,
}

impl ActionRecord {
    pub fn new(
        entity_type: EntityType,
        entity_name: impl Into<String>,
        operation: LogOperation,
    ) -> Self {
        Self {
            entity_type,
            entity_name: entity_name.into(),
            parent_type: None,
            parent_name: None,
            operation,
            timestamp_ms: timestamp_millis(),
        }
    }

    pub fn with_parent(
        mut self,
        parent_type: EntityType,
        parent_name: impl Into<String>,
    ) -> Self {
        self.parent_type = Some(parent_type);
        self.parent_name = Some(parent_name.into());
        self
    }

    pub fn secured_variable(
        name: impl Into<String>,
        secret_name: impl Into<String>,
        operation: LogOperation,
    ) -> Self {
        Self::new(EntityType::SecuredVariable, name, operation).with_parent(EntityType::Secret, secret_name)
    }

    pub fn common_variable(
        name: impl Into<String>,
        operation: LogOperation,
    ) -> Self {
        Self::new(EntityType::CommonVariable, name, operation)
    }
}

#[cfg_attr(test, automock)]
pub trait ActionLogger: Send + Sync + 'static {
    fn log_action(
        &self,
        record: ActionRecord,
    );
}

/// Emits every record as an `info` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingActionLogger;

impl ActionLogger for TracingActionLogger {
    fn log_action(
        &self,
        record: ActionRecord,
    ) {
        info!(
            operation = %record.operation,
            entity_type = %record.entity_type,
            entity_name = %record.entity_name,
            parent_type = ?record.parent_type,
            parent_name = ?record.parent_name,
            timestamp_ms = record.timestamp_ms,
            "{} {} {}",
            record.operation,
            record.entity_type,
            record.entity_name
        );
    }
}
