use crate::context::Context;
use crate::kv::{KvError, KvPairs, TxnBatch, TxnKv, validate_key};
use async_trait::async_trait;
use im::OrdMap;
use parking_lot::RwLock;
use std::ops::Bound;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    entries: OrdMap<String, Vec<u8>>,
    revision: u64,
}

/// In-process [`TxnKv`] backed by an ordered persistent map.
///
/// Each batch is staged on a structural-sharing clone of the map and
/// published under the write lock in one step, so readers never observe a
/// partially applied batch. `revision` counts published batches.
#[derive(Debug, Default)]
pub struct MemoryKv {
    state: RwLock<MemoryState>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating batches applied so far.
    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Every key currently stored, in order.
    pub fn keys(&self) -> Vec<String> {
        self.state.read().entries.keys().cloned().collect()
    }

    /// Raw read bypassing the context; for inspection in tests and tools.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state.read().entries.get(key).cloned()
    }

    fn scan(entries: &OrdMap<String, Vec<u8>>, prefix: &str) -> KvPairs {
        let mut out = Vec::new();
        for (k, v) in entries.range((Bound::Included(prefix.to_string()), Bound::Unbounded)) {
            if !k.starts_with(prefix) {
                break;
            }
            out.push((k.clone(), v.clone()));
        }
        out
    }

    fn apply(&self, batch: TxnBatch) -> Result<(), KvError> {
        for key in batch.saves.keys().chain(batch.removals.iter()) {
            validate_key(key)?;
        }
        let mut state = self.state.write();
        let mut staged = state.entries.clone();
        for (key, value) in batch.saves {
            staged.insert(key, value);
        }
        for key in &batch.removals {
            staged.remove(key);
        }
        for prefix in &batch.removal_prefixes {
            for (key, _) in Self::scan(&staged, prefix) {
                staged.remove(&key);
            }
        }
        state.entries = staged;
        state.revision += 1;
        Ok(())
    }
}

#[async_trait]
impl TxnKv for MemoryKv {
    async fn load(&self, ctx: &Context, key: &str) -> Result<Vec<u8>, KvError> {
        ctx.check()?;
        self.state
            .read()
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| KvError::key_not_found(key))
    }

    async fn load_with_prefix(&self, ctx: &Context, prefix: &str) -> Result<KvPairs, KvError> {
        ctx.check()?;
        Ok(Self::scan(&self.state.read().entries, prefix))
    }

    async fn write_batch(&self, ctx: &Context, batch: TxnBatch) -> Result<(), KvError> {
        ctx.check()?;
        self.apply(batch)
    }
}
