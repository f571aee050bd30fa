use crate::context::Context;
use crate::kv::{
    KvError, KvPairs, SaveBatch, SnapshotKv, TOMBSTONE, Timestamp, TxnKv, is_tombstone,
    validate_key,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const DEFAULT_SNAPSHOT_PREFIX: &str = "snapshots";
pub const DEFAULT_SNAPSHOT_SEPARATOR: &str = "_ts";

/// [`SnapshotKv`] layered over any [`TxnKv`].
///
/// A write of `key` at `ts` lands twice in one batch: under `key` (latest)
/// and under `<snapshot_prefix>/<key><separator><ts>` (version). Removals
/// write [`TOMBSTONE`] to both. Reads at `ts` pick the greatest version not
/// after `ts`; a key with no versions at all falls back to its latest value,
/// which covers data written before versioning was enabled.
pub struct SuffixSnapshot {
    inner: Arc<dyn TxnKv>,
    snapshot_prefix: String,
    separator: String,
}

impl std::fmt::Debug for SuffixSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuffixSnapshot")
            .field("snapshot_prefix", &self.snapshot_prefix)
            .field("separator", &self.separator)
            .finish_non_exhaustive()
    }
}

impl SuffixSnapshot {
    pub fn new(inner: Arc<dyn TxnKv>) -> Self {
        Self::with_layout(inner, DEFAULT_SNAPSHOT_PREFIX, DEFAULT_SNAPSHOT_SEPARATOR)
    }

    pub fn with_layout(
        inner: Arc<dyn TxnKv>,
        snapshot_prefix: impl Into<String>,
        separator: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            snapshot_prefix: snapshot_prefix.into(),
            separator: separator.into(),
        }
    }

    pub fn inner(&self) -> &Arc<dyn TxnKv> {
        &self.inner
    }

    pub fn ts_key(&self, key: &str, ts: Timestamp) -> String {
        format!("{}/{}{}{}", self.snapshot_prefix, key, self.separator, ts)
    }

    fn version_prefix(&self, key: &str) -> String {
        format!("{}/{}{}", self.snapshot_prefix, key, self.separator)
    }

    /// Splits a versioned key back into the original key and its timestamp.
    fn parse_ts_key<'a>(&self, versioned: &'a str) -> Option<(&'a str, Timestamp)> {
        let rest = versioned
            .strip_prefix(self.snapshot_prefix.as_str())?
            .strip_prefix('/')?;
        let split = rest.rfind(self.separator.as_str())?;
        let ts = rest[split + self.separator.len()..].parse().ok()?;
        Some((&rest[..split], ts))
    }

    /// Latest value per original key among versions not after `ts`, plus the
    /// set of every original key that has any version at all.
    fn pick_versions(
        &self,
        versions: KvPairs,
        ts: Timestamp,
    ) -> (BTreeMap<String, (Timestamp, Vec<u8>)>, BTreeSet<String>) {
        let mut picked: BTreeMap<String, (Timestamp, Vec<u8>)> = BTreeMap::new();
        let mut versioned = BTreeSet::new();
        for (full_key, value) in versions {
            let Some((key, version_ts)) = self.parse_ts_key(&full_key) else {
                tracing::warn!(key = %full_key, "skipping unparsable snapshot version key");
                continue;
            };
            versioned.insert(key.to_string());
            if version_ts > ts {
                continue;
            }
            let newer = picked
                .get(key)
                .is_none_or(|(existing_ts, _)| version_ts >= *existing_ts);
            if newer {
                picked.insert(key.to_string(), (version_ts, value));
            }
        }
        (picked, versioned)
    }

    fn versioned_batch(&self, saves: SaveBatch, removals: &[String], ts: Timestamp) -> SaveBatch {
        let mut batch = SaveBatch::new();
        for (key, value) in saves {
            batch.insert(self.ts_key(&key, ts), value.clone());
            batch.insert(key, value);
        }
        for key in removals {
            batch.insert(self.ts_key(key, ts), TOMBSTONE.to_vec());
            batch.insert(key.clone(), TOMBSTONE.to_vec());
        }
        batch
    }
}

#[async_trait]
impl SnapshotKv for SuffixSnapshot {
    async fn load(&self, ctx: &Context, key: &str, ts: Timestamp) -> Result<Vec<u8>, KvError> {
        validate_key(key)?;
        if ts == 0 {
            let value = self.inner.load(ctx, key).await?;
            if is_tombstone(&value) {
                return Err(KvError::key_not_found(key));
            }
            return Ok(value);
        }

        let versions = self
            .inner
            .load_with_prefix(ctx, &self.version_prefix(key))
            .await?;
        let (mut picked, versioned) = self.pick_versions(versions, ts);
        if !versioned.contains(key) {
            let value = self.inner.load(ctx, key).await?;
            if is_tombstone(&value) {
                return Err(KvError::key_not_found(key));
            }
            return Ok(value);
        }
        match picked.remove(key) {
            Some((_, value)) if !is_tombstone(&value) => Ok(value),
            _ => Err(KvError::key_not_found(key)),
        }
    }

    async fn load_with_prefix(
        &self,
        ctx: &Context,
        prefix: &str,
        ts: Timestamp,
    ) -> Result<KvPairs, KvError> {
        let latest = self.inner.load_with_prefix(ctx, prefix).await?;
        if ts == 0 {
            return Ok(latest
                .into_iter()
                .filter(|(_, value)| !is_tombstone(value))
                .collect());
        }

        let versions = self
            .inner
            .load_with_prefix(ctx, &format!("{}/{}", self.snapshot_prefix, prefix))
            .await?;
        let (picked, versioned) = self.pick_versions(versions, ts);

        let mut out: BTreeMap<String, Vec<u8>> = picked
            .into_iter()
            .map(|(key, (_, value))| (key, value))
            .collect();
        for (key, value) in latest {
            if !versioned.contains(&key) {
                out.insert(key, value);
            }
        }
        Ok(out
            .into_iter()
            .filter(|(_, value)| !is_tombstone(value))
            .collect())
    }

    async fn multi_save_and_remove(
        &self,
        ctx: &Context,
        saves: SaveBatch,
        removals: &[String],
        ts: Timestamp,
    ) -> Result<(), KvError> {
        if ts == 0 {
            return self.inner.multi_save_and_remove(ctx, saves, removals).await;
        }
        let batch = self.versioned_batch(saves, removals, ts);
        self.inner.multi_save_and_remove(ctx, batch, &[]).await
    }

    async fn multi_save_and_remove_with_prefix(
        &self,
        ctx: &Context,
        saves: SaveBatch,
        removal_prefixes: &[String],
        ts: Timestamp,
    ) -> Result<(), KvError> {
        if ts == 0 {
            return self
                .inner
                .multi_save_and_remove_with_prefix(ctx, saves, removal_prefixes)
                .await;
        }
        let mut removals = Vec::new();
        for prefix in removal_prefixes {
            for (key, value) in self.inner.load_with_prefix(ctx, prefix).await? {
                if !is_tombstone(&value) && !saves.contains_key(&key) {
                    removals.push(key);
                }
            }
        }
        let batch = self.versioned_batch(saves, &removals, ts);
        self.inner.multi_save_and_remove(ctx, batch, &[]).await
    }
}
