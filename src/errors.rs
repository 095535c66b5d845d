//! Configuration Sync Error Hierarchy
//!
//! Errors are grouped by the layer that raises them: the KV transport and its
//! decoders, the secret backend facade, and the variable coordinator. Callers
//! pattern-match on the kind to tell recoverable outcomes (missing keys,
//! transient transport failures, decode failures that will be replayed) from
//! fatal ones (protocol violations, name collisions).

use std::collections::HashMap;
use std::time::Duration;

use config::ConfigError;

use crate::ChainRuntimeProperties;
use crate::EngineState;
use crate::SecretErrorRecord;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// KV transport, decoding and protocol failures
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Secret backend failures
    #[error(transparent)]
    Secret(#[from] SecretError),

    /// Variable namespace rule violations
    #[error(transparent)]
    Variable(#[from] VariableError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Retry policy exhaustion
    #[error("Retry timeout after {0:?}")]
    RetryTimeout(Duration),

    #[error("{0}")]
    RetryTaskFailed(String),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Path has never been written
    #[error("KV not found: {path}")]
    NotFound { path: String },

    /// Payload present but failed structural decode
    #[error(transparent)]
    DecodeFailure(#[from] Box<DecodeFailure>),

    /// Store returned a shape the protocol disallows
    #[error("Protocol violation at {path}: {reason}")]
    ProtocolViolation { path: String, reason: String },

    /// Network or backend failure
    #[error("KV transport failure: {0}")]
    Transport(String),

    /// Store answered with an unexpected HTTP status
    #[error("KV request to {path} failed with status {status}: {message}")]
    Http {
        path: String,
        status: u16,
        message: String,
    },

    /// At least one member of a transactional batch was rejected
    #[error("KV transaction rejected: {}", .errors.join("; "))]
    TransactionRejected { errors: Vec<String> },

    /// Payload could not be encoded for writing
    #[error("Failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Aggregated decode failure for one fetched batch.
///
/// Every entry of the batch is attempted before this is raised, so
/// `failures` lists all offending keys and `partial` holds whatever decoded.
#[derive(Debug, thiserror::Error)]
#[error("Failed to decode {resource} for {} key(s): {}", .failures.len(), failed_keys(.failures))]
pub struct DecodeFailure {
    pub resource: &'static str,
    pub failures: Vec<EntryDecodeFailure>,
    pub partial: PartialDecode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryDecodeFailure {
    pub key: String,
    pub reason: String,
}

/// Successfully decoded part of a failed batch, kept for diagnostics
#[derive(Debug, Default)]
pub enum PartialDecode {
    #[default]
    Nothing,
    EnginesState(Vec<EngineState>),
    ChainsRuntimeConfig(HashMap<String, ChainRuntimeProperties>),
}

fn failed_keys(failures: &[EntryDecodeFailure]) -> String {
    failures.iter().map(|f| f.key.as_str()).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret with name {0} not found")]
    SecretNotFound(String),

    #[error("Secret with name {0} already exists")]
    AlreadyExists(String),

    /// Backend rejected the call
    #[error("Secret backend failure on {secret} (status {status}): {message}")]
    Backend {
        secret: String,
        status: u16,
        message: String,
    },

    /// Async update never completed
    #[error("Update of secret {secret} did not complete within {after:?}")]
    Timeout { secret: String, after: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum VariableError {
    /// Cross-store uniqueness violated
    #[error("{existing} variable with name {name} already exists")]
    NameCollision {
        name: String,
        existing: VariableKind,
    },

    #[error("{0} variable's name is empty")]
    EmptyName(VariableKind),

    #[error("Variable name {0} is malformed")]
    MalformedName(String),

    #[error("Cannot find variable {name} in secret {secret}")]
    VariableNotFound { secret: String, name: String },

    /// Every secret targeted by a batch operation failed
    #[error("Failed to delete variables from multiple secrets")]
    AllSecretsFailed { errors: Vec<SecretErrorRecord> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Common,
    Secured,
}

impl std::fmt::Display for VariableKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            VariableKind::Common => write!(f, "Common"),
            VariableKind::Secured => write!(f, "Secured"),
        }
    }
}

impl Error {
    /// Whether a steady-state watch loop should simply retry on its next
    /// iteration.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kv(KvError::Transport(_))
            | Error::Kv(KvError::Http { .. })
            | Error::Kv(KvError::DecodeFailure(_))
            | Error::RetryTimeout(_) => true,
            Error::Secret(SecretError::Timeout { .. }) => true,
            Error::Secret(SecretError::Backend { status, .. }) => *status >= 500,
            _ => false,
        }
    }

    /// `NotFound`-style outcomes that map to an empty result for lenient callers
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Kv(KvError::NotFound { .. }) | Error::Secret(SecretError::SecretNotFound(_))
        )
    }

    /// Borrow the aggregated decode failure, if this is one
    pub fn as_decode_failure(&self) -> Option<&DecodeFailure> {
        match self {
            Error::Kv(KvError::DecodeFailure(failure)) => Some(failure),
            _ => None,
        }
    }
}

impl From<DecodeFailure> for Error {
    fn from(failure: DecodeFailure) -> Self {
        Error::Kv(KvError::DecodeFailure(Box::new(failure)))
    }
}

impl From<reqwest::Error> for KvError {
    fn from(e: reqwest::Error) -> Self {
        KvError::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Kv(e.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Kv(KvError::Encode(e))
    }
}
