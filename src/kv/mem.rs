use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::timeout_at;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use super::KeyEntry;
use super::KvResponse;
use super::KvTransport;
use super::TxnOp;
use crate::KvError;
use crate::Result;

#[derive(Debug, Clone)]
struct StoredValue {
    value: Option<Vec<u8>>,
    modify_index: u64,
}

/// Tombstones kept before the oldest ones are reaped
pub const DEFAULT_TOMBSTONE_LIMIT: usize = 1024;

#[derive(Debug)]
struct MemState {
    index: u64,
    entries: BTreeMap<String, StoredValue>,
    /// Index at which a key was last deleted, so waits on removed keys wake up
    tombstones: BTreeMap<String, u64>,
    tombstone_limit: usize,
    /// Highest index among reaped tombstones
    reaped_index: u64,
}

impl MemState {
    fn next_index(&mut self) -> u64 {
        self.index += 1;
        self.index
    }

    fn set(
        &mut self,
        path: &str,
        value: Vec<u8>,
        index: u64,
    ) {
        self.tombstones.remove(path);
        self.entries.insert(
            path.to_string(),
            StoredValue {
                value: Some(value),
                modify_index: index,
            },
        );
    }

    fn remove(
        &mut self,
        path: &str,
        recursive: bool,
        index: u64,
    ) -> usize {
        let removed: Vec<String> = if recursive {
            self.entries
                .range(path.to_string()..)
                .take_while(|(k, _)| k.starts_with(path))
                .map(|(k, _)| k.clone())
                .collect()
        } else if self.entries.contains_key(path) {
            vec![path.to_string()]
        } else {
            Vec::new()
        };

        for key in &removed {
            self.entries.remove(key);
            self.tombstones.insert(key.clone(), index);
        }
        self.reap_tombstones();
        removed.len()
    }

    /// Drops the oldest tombstones once over the limit, down to three quarters
    /// of it.
    ///
    /// Query indexes never drop below `reaped_index`, so a reaped delete still
    /// reads as a change; waiters may wake spuriously instead.
    fn reap_tombstones(&mut self) {
        if self.tombstones.len() <= self.tombstone_limit {
            return;
        }
        let keep = self.tombstone_limit - self.tombstone_limit / 4;
        let mut by_age: Vec<(u64, String)> = self
            .tombstones
            .iter()
            .map(|(k, i)| (*i, k.clone()))
            .collect();
        by_age.sort_unstable();

        let reaped = by_age.len() - keep;
        for (index, key) in by_age.into_iter().take(reaped) {
            self.tombstones.remove(&key);
            self.reaped_index = self.reaped_index.max(index);
        }
        debug!(reaped, kept = keep, "reaped KV tombstones");
    }

    /// Snapshot of `path` together with its query index.
    ///
    /// The query index is the highest modify/delete index under the path, or
    /// the store index when nothing under the path is known.
    fn query(
        &self,
        path: &str,
        recursive: bool,
    ) -> KvResponse {
        let entries: Vec<KeyEntry> = if recursive {
            self.entries
                .range(path.to_string()..)
                .take_while(|(k, _)| k.starts_with(path))
                .map(|(k, v)| KeyEntry::new(k.clone(), v.value.clone(), v.modify_index))
                .collect()
        } else {
            self.entries
                .get(path)
                .map(|v| KeyEntry::new(path, v.value.clone(), v.modify_index))
                .into_iter()
                .collect()
        };

        let tombstone_index = if recursive {
            self.tombstones
                .range(path.to_string()..)
                .take_while(|(k, _)| k.starts_with(path))
                .map(|(_, i)| *i)
                .max()
        } else {
            self.tombstones.get(path).copied()
        };

        let index = entries
            .iter()
            .map(|e| e.modify_index)
            .chain(tombstone_index)
            .max()
            .map_or(self.index, |i| i.max(self.reaped_index));

        KvResponse { index, entries }
    }
}

fn is_valid_key(path: &str) -> bool {
    path.len() > 1 && path.starts_with('/') && !path.ends_with('/')
}

fn ensure_valid_key(path: &str) -> Result<()> {
    if !is_valid_key(path) {
        return Err(KvError::Http {
            path: path.to_string(),
            status: 400,
            message: "invalid key".to_string(),
        }
        .into());
    }
    Ok(())
}

/// In-process KV store with real blocking-query semantics.
///
/// Every write bumps one global index, broadcast to blocked waiters.
pub struct MemKvStore {
    state: RwLock<MemState>,
    index_tx: watch::Sender<u64>,
}

impl Default for MemKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemKvStore {
    pub fn new() -> Self {
        Self::with_tombstone_limit(DEFAULT_TOMBSTONE_LIMIT)
    }

    /// Store keeping at most `limit` delete markers (at least one)
    pub fn with_tombstone_limit(limit: usize) -> Self {
        // index 0 is reserved for "never observed"
        let (index_tx, _) = watch::channel(1);
        Self {
            state: RwLock::new(MemState {
                index: 1,
                entries: BTreeMap::new(),
                tombstones: BTreeMap::new(),
                tombstone_limit: limit.max(1),
                reaped_index: 0,
            }),
            index_tx,
        }
    }

    /// Current global index
    pub fn index(&self) -> u64 {
        self.state.read().index
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tombstone_count(&self) -> usize {
        self.state.read().tombstones.len()
    }

    /// Stores a key without value, as folder keys appear in the store
    pub fn put_empty(
        &self,
        path: &str,
    ) -> Result<()> {
        ensure_valid_key(path)?;
        let index = {
            let mut state = self.state.write();
            let index = state.next_index();
            state.tombstones.remove(path);
            state.entries.insert(
                path.to_string(),
                StoredValue {
                    value: None,
                    modify_index: index,
                },
            );
            index
        };
        self.publish(index);
        Ok(())
    }

    fn publish(
        &self,
        index: u64,
    ) {
        trace!(index, "kv index advanced");
        self.index_tx.send_replace(index);
    }
}

#[async_trait]
impl KvTransport for MemKvStore {
    async fn get(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<KvResponse> {
        let response = self.state.read().query(path, recursive);
        if response.entries.is_empty() {
            return Err(KvError::NotFound { path: path.to_string() }.into());
        }
        Ok(response)
    }

    async fn wait_for_changes(
        &self,
        path: &str,
        recursive: bool,
        since_index: u64,
        wait: Duration,
    ) -> Result<KvResponse> {
        let deadline = Instant::now() + wait;
        // subscribe before the first read so no write slips in between
        let mut index_rx = self.index_tx.subscribe();

        loop {
            let response = self.state.read().query(path, recursive);
            if since_index == 0 || response.index != since_index {
                return Ok(response);
            }

            match timeout_at(deadline, index_rx.changed()).await {
                Ok(Ok(())) => continue,
                // sender lives as long as self
                Ok(Err(_)) => return Ok(response),
                Err(_) => {
                    debug!(path, since_index, "blocking query timed out");
                    return Ok(self.state.read().query(path, recursive));
                }
            }
        }
    }

    async fn put(
        &self,
        path: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        ensure_valid_key(path)?;
        let index = {
            let mut state = self.state.write();
            let index = state.next_index();
            state.set(path, value, index);
            index
        };
        self.publish(index);
        Ok(())
    }

    async fn delete(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<()> {
        let index = {
            let mut state = self.state.write();
            let index = state.index + 1;
            if state.remove(path, recursive, index) == 0 {
                return Ok(());
            }
            state.index = index;
            index
        };
        self.publish(index);
        Ok(())
    }

    async fn transact(
        &self,
        ops: Vec<TxnOp>,
    ) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let errors: Vec<String> = ops
            .iter()
            .enumerate()
            .filter(|(_, op)| !is_valid_key(op.path()))
            .map(|(i, op)| format!("op {i}: invalid key {:?}", op.path()))
            .collect();
        if !errors.is_empty() {
            return Err(KvError::TransactionRejected { errors }.into());
        }

        let index = {
            let mut state = self.state.write();
            let index = state.next_index();
            for op in ops {
                match op {
                    TxnOp::Set { path, value } => state.set(&path, value, index),
                    TxnOp::Delete { path } => {
                        state.remove(&path, false, index);
                    }
                }
            }
            index
        };
        self.publish(index);
        Ok(())
    }

    async fn get_many(
        &self,
        paths: Vec<String>,
    ) -> Result<Vec<KeyEntry>> {
        let state = self.state.read();
        Ok(paths
            .iter()
            .filter_map(|path| {
                state
                    .entries
                    .get(path)
                    .map(|v| KeyEntry::new(path.clone(), v.value.clone(), v.modify_index))
            })
            .collect())
    }
}
