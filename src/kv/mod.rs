//! Key-value contract the catalog persists through.
//!
//! Two access modes exist. [`TxnKv`] is a plain transactional store: the
//! latest write is the only visible value and multi-key calls are atomic.
//! [`SnapshotKv`] tags writes with a logical timestamp and serves reads "as of"
//! a timestamp. Both are object safe so the catalog can hold them behind
//! `Arc<dyn ..>`.

pub mod memory;
pub mod suffix_snapshot;

use crate::context::Context;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

pub use memory::MemoryKv;
pub use suffix_snapshot::SuffixSnapshot;

/// Logical timestamp issued by the coordinator's timestamp oracle.
pub type Timestamp = u64;

/// Keys and values returned by prefix scans, ordered by key.
pub type KvPairs = Vec<(String, Vec<u8>)>;

/// Keys to write in one batch. Ordered so batches apply deterministically.
pub type SaveBatch = BTreeMap<String, Vec<u8>>;

/// Reserved value marking a key whose data has been removed or relocated.
/// Never decoded as a record.
pub const TOMBSTONE: &[u8] = &[0xE2, 0x9B, 0xBC];

pub fn is_tombstone(value: &[u8]) -> bool {
    value == TOMBSTONE
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("key '{key}' does not exist")]
    KeyNotFound { key: String },
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },
    #[error("store call cancelled")]
    Cancelled,
    #[error("store call deadline exceeded")]
    DeadlineExceeded,
    #[error("store backend error: {0}")]
    Backend(String),
}

impl KvError {
    pub fn key_not_found(key: impl Into<String>) -> Self {
        KvError::KeyNotFound { key: key.into() }
    }

    pub fn is_key_not_found(&self) -> bool {
        matches!(self, KvError::KeyNotFound { .. })
    }
}

/// One atomic write against a [`TxnKv`]. Saves apply first, then exact
/// removals, then prefix removals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxnBatch {
    pub saves: SaveBatch,
    pub removals: Vec<String>,
    pub removal_prefixes: Vec<String>,
}

impl TxnBatch {
    pub fn new(saves: SaveBatch) -> Self {
        Self {
            saves,
            ..Self::default()
        }
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.removals.push(key.into());
        self
    }

    pub fn remove_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.removal_prefixes.push(prefix.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.saves.is_empty() && self.removals.is_empty() && self.removal_prefixes.is_empty()
    }
}

/// Transactional key-value store with atomic multi-key batches.
///
/// Implementors provide point and prefix reads plus [`TxnKv::write_batch`];
/// every other call is expressed through those. Removing an absent key is
/// not an error.
#[async_trait]
pub trait TxnKv: Send + Sync {
    async fn load(&self, ctx: &Context, key: &str) -> Result<Vec<u8>, KvError>;

    async fn load_with_prefix(&self, ctx: &Context, prefix: &str) -> Result<KvPairs, KvError>;

    async fn write_batch(&self, ctx: &Context, batch: TxnBatch) -> Result<(), KvError>;

    async fn multi_save_and_remove(
        &self,
        ctx: &Context,
        saves: SaveBatch,
        removals: &[String],
    ) -> Result<(), KvError> {
        let batch = TxnBatch {
            saves,
            removals: removals.to_vec(),
            removal_prefixes: Vec::new(),
        };
        self.write_batch(ctx, batch).await
    }

    async fn multi_save_and_remove_with_prefix(
        &self,
        ctx: &Context,
        saves: SaveBatch,
        removal_prefixes: &[String],
    ) -> Result<(), KvError> {
        let batch = TxnBatch {
            saves,
            removals: Vec::new(),
            removal_prefixes: removal_prefixes.to_vec(),
        };
        self.write_batch(ctx, batch).await
    }

    async fn multi_load(&self, ctx: &Context, keys: &[String]) -> Result<Vec<Vec<u8>>, KvError> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.load(ctx, key).await?);
        }
        Ok(values)
    }

    async fn has(&self, ctx: &Context, key: &str) -> Result<bool, KvError> {
        match self.load(ctx, key).await {
            Ok(_) => Ok(true),
            Err(KvError::KeyNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn save(&self, ctx: &Context, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        let mut saves = SaveBatch::new();
        saves.insert(key.to_string(), value);
        self.multi_save_and_remove(ctx, saves, &[]).await
    }

    async fn multi_save(&self, ctx: &Context, kvs: SaveBatch) -> Result<(), KvError> {
        self.multi_save_and_remove(ctx, kvs, &[]).await
    }

    async fn remove(&self, ctx: &Context, key: &str) -> Result<(), KvError> {
        self.multi_save_and_remove(ctx, SaveBatch::new(), &[key.to_string()])
            .await
    }

    async fn multi_remove(&self, ctx: &Context, keys: &[String]) -> Result<(), KvError> {
        self.multi_save_and_remove(ctx, SaveBatch::new(), keys).await
    }

    async fn remove_with_prefix(&self, ctx: &Context, prefix: &str) -> Result<(), KvError> {
        self.multi_save_and_remove_with_prefix(ctx, SaveBatch::new(), &[prefix.to_string()])
            .await
    }
}

/// Timestamp-versioned key-value store.
///
/// A read at `ts` returns the most recent value written at or before `ts`.
/// `ts == 0` addresses the latest value. Removals are versioned too: a key
/// removed at `ts` is absent for reads at or after `ts` and still visible
/// before it.
#[async_trait]
pub trait SnapshotKv: Send + Sync {
    async fn load(&self, ctx: &Context, key: &str, ts: Timestamp) -> Result<Vec<u8>, KvError>;

    async fn load_with_prefix(
        &self,
        ctx: &Context,
        prefix: &str,
        ts: Timestamp,
    ) -> Result<KvPairs, KvError>;

    async fn multi_save_and_remove(
        &self,
        ctx: &Context,
        saves: SaveBatch,
        removals: &[String],
        ts: Timestamp,
    ) -> Result<(), KvError>;

    async fn multi_save_and_remove_with_prefix(
        &self,
        ctx: &Context,
        saves: SaveBatch,
        removal_prefixes: &[String],
        ts: Timestamp,
    ) -> Result<(), KvError>;

    async fn save(
        &self,
        ctx: &Context,
        key: &str,
        value: Vec<u8>,
        ts: Timestamp,
    ) -> Result<(), KvError> {
        let mut saves = SaveBatch::new();
        saves.insert(key.to_string(), value);
        self.multi_save_and_remove(ctx, saves, &[], ts).await
    }

    async fn multi_save(
        &self,
        ctx: &Context,
        kvs: SaveBatch,
        ts: Timestamp,
    ) -> Result<(), KvError> {
        self.multi_save_and_remove(ctx, kvs, &[], ts).await
    }
}

pub(crate) fn validate_key(key: &str) -> Result<(), KvError> {
    if key.is_empty() {
        return Err(KvError::InvalidKey {
            key: key.to_string(),
            reason: "key must not be empty".into(),
        });
    }
    Ok(())
}
