//! KV transport abstraction with blocking-query ("long-poll") reads.
//!
//! Every read carries the store's change index for the queried path, which
//! the watch loops feed into [`crate::WatchState`]. Paths are absolute and
//! always start with `/`.

mod consul;
mod mem;
mod paths;
pub use consul::*;
pub use mem::*;
pub use paths::*;

#[cfg(test)]
mod paths_test;

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// One stored key as returned by a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub key: String,
    /// `None` for keys stored without a value (e.g. folders)
    pub value: Option<Vec<u8>>,
    pub modify_index: u64,
}

impl KeyEntry {
    pub fn new(
        key: impl Into<String>,
        value: Option<Vec<u8>>,
        modify_index: u64,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            modify_index,
        }
    }

    /// Value decoded as UTF-8, lossy
    pub fn value_str(&self) -> Option<String> {
        self.value
            .as_ref()
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }
}

/// Result of a read: the query index plus the matching entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvResponse {
    pub index: u64,
    pub entries: Vec<KeyEntry>,
}

/// Member of a transactional batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Set { path: String, value: Vec<u8> },
    Delete { path: String },
}

impl TxnOp {
    pub fn path(&self) -> &str {
        match self {
            TxnOp::Set { path, .. } | TxnOp::Delete { path } => path,
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvTransport: Send + Sync + 'static {
    /// Reads `path`, or every key starting with `path` when `recursive`.
    ///
    /// # Errors
    /// - [`crate::KvError::NotFound`] when no key matches
    async fn get(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<KvResponse>;

    /// Blocking query.
    ///
    /// Returns as soon as the index of `path` differs from `since_index`, or
    /// once `wait` elapses with the current (possibly unchanged) state.
    /// `since_index == 0` never blocks. A missing path is an empty entry list,
    /// never `NotFound`.
    async fn wait_for_changes(
        &self,
        path: &str,
        recursive: bool,
        since_index: u64,
        wait: Duration,
    ) -> Result<KvResponse>;

    async fn put(
        &self,
        path: &str,
        value: Vec<u8>,
    ) -> Result<()>;

    async fn delete(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<()>;

    /// Applies a mixed set/delete batch. Either every op is applied or the
    /// call fails with [`crate::KvError::TransactionRejected`].
    async fn transact(
        &self,
        ops: Vec<TxnOp>,
    ) -> Result<()>;

    /// Reads several exact keys at once; missing keys are absent from the
    /// result.
    async fn get_many(
        &self,
        paths: Vec<String>,
    ) -> Result<Vec<KeyEntry>>;
}
