use super::{Catalog, decode_listed, decode_point, scan_failed, write_failed};
use crate::context::Context;
use crate::error::{CatalogError, ResourceType};
use crate::kv::{SaveBatch, Timestamp, TxnBatch};
use crate::model::record::{
    CollectionInfo, encode_record, marshal_alias, marshal_collection, unmarshal_collection,
};
use crate::model::{Collection, UniqueId};
use std::collections::BTreeMap;

impl Catalog {
    /// Writes the collection record and its `extra` entries in one versioned
    /// batch at `ts`.
    pub async fn create_collection(
        &self,
        ctx: &Context,
        collection: &Collection,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        let key = self.keys.collection(collection.collection_id);
        let value = encode_record(&marshal_collection(collection))?;

        let mut saves: SaveBatch = collection.extra.clone();
        saves.insert(key.clone(), value);
        self.snapshot
            .multi_save(ctx, saves, ts)
            .await
            .map_err(|err| write_failed("create_collection", &key, err))?;
        tracing::debug!(
            collection_id = collection.collection_id,
            name = %collection.name,
            ts,
            "collection created"
        );
        Ok(())
    }

    /// Rewrites the collection record at `ts`, then writes `extra` to the
    /// transactional store.
    ///
    /// The two writes are not atomic with each other. If the second fails the
    /// new partition is already visible and the error is returned; callers
    /// replay from their own log.
    pub async fn create_partition(
        &self,
        ctx: &Context,
        collection: &Collection,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        let key = self.keys.collection(collection.collection_id);
        let value = encode_record(&marshal_collection(collection))?;
        self.snapshot
            .save(ctx, &key, value, ts)
            .await
            .map_err(|err| write_failed("create_partition", &key, err))?;

        if collection.extra.is_empty() {
            return Ok(());
        }
        let first_extra = collection
            .extra
            .keys()
            .next()
            .cloned()
            .unwrap_or_default();
        self.txn
            .multi_save(ctx, collection.extra.clone())
            .await
            .map_err(|err| {
                tracing::warn!(
                    collection_id = collection.collection_id,
                    error = %err,
                    "partition metadata persisted but write-ahead entries were not"
                );
                CatalogError::persistence(&first_extra, err)
            })
    }

    /// Removes the collection record and every alias record in one
    /// versioned batch at `ts`, then all index and segment-index records of
    /// the collection together with `extra` in one transactional batch.
    pub async fn drop_collection(
        &self,
        ctx: &Context,
        collection: &Collection,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        let collection_key = self.keys.collection(collection.collection_id);
        let mut removals = vec![collection_key.clone()];
        removals.extend(collection.aliases.iter().map(|alias| self.keys.alias(alias)));
        self.snapshot
            .multi_save_and_remove(ctx, SaveBatch::new(), &removals, ts)
            .await
            .map_err(|err| write_failed("drop_collection", &collection_key, err))?;

        let batch = TxnBatch::new(collection.extra.clone())
            .remove_prefix(self.keys.segment_index_collection_scan(collection.collection_id))
            .remove_prefix(self.keys.index_collection_scan(collection.collection_id));
        self.txn.write_batch(ctx, batch).await.map_err(|err| {
            tracing::warn!(
                collection_id = collection.collection_id,
                error = %err,
                "collection dropped but its index records were not removed"
            );
            CatalogError::persistence(&collection_key, err)
        })
    }

    /// `collection` must already exclude the dropped partition. Segment
    /// index records of that partition are removed for every index of the
    /// collection.
    pub async fn drop_partition(
        &self,
        ctx: &Context,
        collection: &Collection,
        partition_id: UniqueId,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        let key = self.keys.collection(collection.collection_id);
        let value = encode_record(&marshal_collection(collection))?;
        self.snapshot
            .save(ctx, &key, value, ts)
            .await
            .map_err(|err| write_failed("drop_partition", &key, err))?;

        let mut batch = TxnBatch::new(collection.extra.clone());
        for field_index in &collection.field_indexes {
            batch = batch.remove_prefix(self.keys.segment_index_partition_scan(
                collection.collection_id,
                field_index.index_id,
                partition_id,
            ));
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.txn.write_batch(ctx, batch).await.map_err(|err| {
            tracing::warn!(
                collection_id = collection.collection_id,
                partition_id,
                error = %err,
                "partition dropped but its segment index records were not removed"
            );
            CatalogError::persistence(&key, err)
        })
    }

    /// `collection` must already exclude the dropped index.
    pub async fn drop_index(
        &self,
        ctx: &Context,
        collection: &Collection,
        index_id: UniqueId,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        let key = self.keys.collection(collection.collection_id);
        let value = encode_record(&marshal_collection(collection))?;
        self.snapshot
            .save(ctx, &key, value, ts)
            .await
            .map_err(|err| write_failed("drop_index", &key, err))?;

        let batch = TxnBatch::new(collection.extra.clone())
            .remove(self.keys.index(collection.collection_id, index_id))
            .remove_prefix(
                self.keys
                    .segment_index_index_scan(collection.collection_id, index_id),
            );
        self.txn.write_batch(ctx, batch).await.map_err(|err| {
            tracing::warn!(
                collection_id = collection.collection_id,
                index_id,
                error = %err,
                "index dropped from collection but its records were not removed"
            );
            CatalogError::persistence(&key, err)
        })
    }

    /// Writes one alias record for `collection.aliases[0]`. Further aliases
    /// in the list are ignored; each alias takes its own call.
    pub async fn create_alias(
        &self,
        ctx: &Context,
        collection: &Collection,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        let Some(alias) = collection.aliases.first() else {
            return Err(CatalogError::InvalidArgument(format!(
                "collection {} carries no alias",
                collection.collection_id
            )));
        };
        if alias.is_empty() {
            return Err(CatalogError::InvalidArgument("alias name is empty".into()));
        }
        let key = self.keys.alias(alias);
        let value = encode_record(&marshal_alias(collection.collection_id, alias))?;
        self.snapshot
            .save(ctx, &key, value, ts)
            .await
            .map_err(|err| write_failed("create_alias", &key, err))
    }

    /// Repoints an alias; same write as [`Catalog::create_alias`].
    pub async fn alter_alias(
        &self,
        ctx: &Context,
        collection: &Collection,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        self.create_alias(ctx, collection, ts).await
    }

    pub async fn drop_alias(
        &self,
        ctx: &Context,
        collection_id: UniqueId,
        alias: &str,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        let key = self.keys.alias(alias);
        self.snapshot
            .multi_save_and_remove(ctx, SaveBatch::new(), std::slice::from_ref(&key), ts)
            .await
            .map_err(|err| write_failed("drop_alias", &key, err))?;
        tracing::debug!(collection_id, alias, ts, "alias dropped");
        Ok(())
    }

    pub async fn get_collection_by_id(
        &self,
        ctx: &Context,
        collection_id: UniqueId,
        ts: Timestamp,
    ) -> Result<Collection, CatalogError> {
        let key = self.keys.collection(collection_id);
        let value = self
            .load_versioned(ctx, ResourceType::Collection, &key, ts)
            .await?;
        let info: CollectionInfo = decode_point(ResourceType::Collection, &key, &value)?;
        Ok(unmarshal_collection(info))
    }

    /// Any failure, malformed records included, reads as "does not exist".
    pub async fn collection_exists(
        &self,
        ctx: &Context,
        collection_id: UniqueId,
        ts: Timestamp,
    ) -> bool {
        self.get_collection_by_id(ctx, collection_id, ts)
            .await
            .is_ok()
    }

    /// Scans every collection visible at `ts` for a schema named `name`.
    /// Aliases are not resolved here.
    pub async fn get_collection_by_name(
        &self,
        ctx: &Context,
        name: &str,
        ts: Timestamp,
    ) -> Result<Collection, CatalogError> {
        let prefix = self.keys.collection_scan();
        let pairs = self
            .snapshot
            .load_with_prefix(ctx, &prefix, ts)
            .await
            .map_err(|err| scan_failed("get_collection_by_name", &prefix, err))?;
        for (key, value) in pairs {
            let Some(info) = decode_listed::<CollectionInfo>(&key, &value) else {
                continue;
            };
            if info.schema.name == name {
                return Ok(unmarshal_collection(info));
            }
        }
        Err(CatalogError::not_found(
            ResourceType::Collection,
            format!("{name} at timestamp {ts}"),
        ))
    }

    /// Every collection visible at `ts`, keyed by name.
    pub async fn list_collections(
        &self,
        ctx: &Context,
        ts: Timestamp,
    ) -> Result<BTreeMap<String, Collection>, CatalogError> {
        let prefix = self.keys.collection_scan();
        let pairs = self
            .snapshot
            .load_with_prefix(ctx, &prefix, ts)
            .await
            .map_err(|err| scan_failed("list_collections", &prefix, err))?;
        Ok(pairs
            .iter()
            .filter_map(|(key, value)| decode_listed::<CollectionInfo>(key, value))
            .map(|info| (info.schema.name.clone(), unmarshal_collection(info)))
            .collect())
    }

    /// Alias records visible at `ts` (`0` for latest). Each entry carries
    /// the target collection id and the alias as its name.
    pub async fn list_aliases(
        &self,
        ctx: &Context,
        ts: Timestamp,
    ) -> Result<Vec<Collection>, CatalogError> {
        let prefix = self.keys.alias_scan();
        let pairs = self
            .snapshot
            .load_with_prefix(ctx, &prefix, ts)
            .await
            .map_err(|err| scan_failed("list_aliases", &prefix, err))?;
        Ok(pairs
            .iter()
            .filter_map(|(key, value)| decode_listed::<CollectionInfo>(key, value))
            .map(unmarshal_collection)
            .collect())
    }
}
