//! Metadata catalog over the two store modes.
//!
//! Collections and aliases live in the versioned store so they can be read
//! as of a timestamp. Indexes, credentials and RBAC state live in the
//! transactional store. The catalog keeps no state of its own: no cache, no
//! locks, no retries. Each mutating call reads and writes within that call
//! and the last writer wins between concurrent callers.

mod collection;
mod credential;
mod index;
pub mod keys;
mod rbac;

use crate::config::CatalogConfig;
use crate::context::Context;
use crate::error::{CatalogError, ResourceType};
use crate::kv::{KvError, MemoryKv, SnapshotKv, SuffixSnapshot, Timestamp, TxnKv};
use crate::model::record::{StoredValue, decode_record};
use crate::privilege::ObjectPrivileges;
use keys::KeyLayout;
use serde::de::DeserializeOwned;
use std::sync::Arc;

#[derive(Clone)]
pub struct Catalog {
    txn: Arc<dyn TxnKv>,
    snapshot: Arc<dyn SnapshotKv>,
    keys: Arc<KeyLayout>,
    privileges: Arc<ObjectPrivileges>,
    default_tenant: String,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("keys", &self.keys)
            .field("default_tenant", &self.default_tenant)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    pub fn new(
        txn: Arc<dyn TxnKv>,
        snapshot: Arc<dyn SnapshotKv>,
        config: CatalogConfig,
    ) -> Result<Self, CatalogError> {
        config.validate()?;
        Ok(Self {
            txn,
            snapshot,
            keys: Arc::new(KeyLayout::from_config(&config)),
            privileges: Arc::new(ObjectPrivileges::new()),
            default_tenant: config.default_tenant,
        })
    }

    /// A catalog over one in-process store, with the versioned mode layered
    /// on the same store. Returns the store for inspection.
    pub fn in_memory(config: CatalogConfig) -> Result<(Self, Arc<MemoryKv>), CatalogError> {
        config.validate()?;
        let store = Arc::new(MemoryKv::new());
        let snapshot = SuffixSnapshot::with_layout(
            store.clone(),
            config.snapshot_prefix.clone(),
            config.snapshot_separator.clone(),
        );
        let catalog = Self::new(store.clone(), Arc::new(snapshot), config)?;
        Ok((catalog, store))
    }

    /// Shares an existing privilege table instead of building a new one.
    /// Grants are checked against this table.
    pub fn with_privileges(mut self, privileges: Arc<ObjectPrivileges>) -> Self {
        self.privileges = privileges;
        self
    }

    pub fn keys(&self) -> &KeyLayout {
        &self.keys
    }

    pub fn privileges(&self) -> &Arc<ObjectPrivileges> {
        &self.privileges
    }

    /// Tenant used by RBAC calls that pass an empty tenant.
    pub fn default_tenant(&self) -> &str {
        &self.default_tenant
    }

    fn tenant<'a>(&'a self, tenant: &'a str) -> &'a str {
        if tenant.is_empty() {
            &self.default_tenant
        } else {
            tenant
        }
    }

    /// Nothing to release; the stores are owned by the caller.
    pub fn close(&self) {}

    async fn load_txn(
        &self,
        ctx: &Context,
        resource_type: ResourceType,
        key: &str,
    ) -> Result<Vec<u8>, CatalogError> {
        self.txn
            .load(ctx, key)
            .await
            .map_err(|err| CatalogError::from_kv(resource_type, key, err))
    }

    async fn load_versioned(
        &self,
        ctx: &Context,
        resource_type: ResourceType,
        key: &str,
        ts: Timestamp,
    ) -> Result<Vec<u8>, CatalogError> {
        self.snapshot
            .load(ctx, key, ts)
            .await
            .map_err(|err| CatalogError::from_kv(resource_type, key, err))
    }
}

fn write_failed(operation: &'static str, key: &str, err: KvError) -> CatalogError {
    tracing::error!(operation, key = %key, error = %err, "catalog write failed");
    CatalogError::persistence(key, err)
}

fn scan_failed(operation: &'static str, prefix: &str, err: KvError) -> CatalogError {
    tracing::error!(operation, prefix = %prefix, error = %err, "catalog scan failed");
    CatalogError::persistence(prefix, err)
}

/// Decodes one record of a listing. Moved markers and malformed records
/// are skipped; a single bad entry never fails the listing.
fn decode_listed<T: DeserializeOwned>(key: &str, value: &[u8]) -> Option<T> {
    match StoredValue::classify(value) {
        StoredValue::Moved => None,
        StoredValue::Record(bytes) => match decode_record(key, bytes) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "skipping malformed record");
                None
            }
        },
    }
}

/// Decodes a point lookup. Unlike listings, a malformed record is an error.
fn decode_point<T: DeserializeOwned>(
    resource_type: ResourceType,
    key: &str,
    value: &[u8],
) -> Result<T, CatalogError> {
    match StoredValue::classify(value) {
        StoredValue::Moved => Err(CatalogError::not_found(resource_type, key)),
        StoredValue::Record(bytes) => decode_record(key, bytes).inspect_err(|err| {
            tracing::error!(key = %key, error = %err, "malformed record");
        }),
    }
}
