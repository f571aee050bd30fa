use super::{Catalog, decode_listed, scan_failed, write_failed};
use crate::context::Context;
use crate::error::CatalogError;
use crate::kv::SaveBatch;
use crate::model::record::{
    IndexInfo, SegmentIndexInfo, encode_record, marshal_collection, marshal_index,
    marshal_segment_index, merge_index, unmarshal_index, unmarshal_segment_index,
};
use crate::model::{AlterType, Collection, Index, UniqueId};
use std::collections::BTreeMap;

impl Catalog {
    /// Writes the rewritten collection record, the index-level record and a
    /// per-segment record for every segment already attached to `index`, in
    /// one transactional batch.
    pub async fn create_index(
        &self,
        ctx: &Context,
        collection: &Collection,
        index: &Index,
    ) -> Result<(), CatalogError> {
        let collection_key = self.keys.collection(collection.collection_id);
        let index_key = self.keys.index(index.collection_id, index.index_id);

        let mut saves = SaveBatch::new();
        saves.insert(
            collection_key.clone(),
            encode_record(&marshal_collection(collection))?,
        );
        saves.insert(index_key.clone(), encode_record(&marshal_index(index))?);
        for segment in index.segment_indexes.values() {
            saves.insert(
                self.keys.segment_index(
                    index.collection_id,
                    index.index_id,
                    segment.partition_id,
                    segment.segment_id,
                ),
                encode_record(&marshal_segment_index(index, segment))?,
            );
        }
        self.txn
            .multi_save(ctx, saves)
            .await
            .map_err(|err| write_failed("create_index", &index_key, err))
    }

    pub async fn alter_index(
        &self,
        ctx: &Context,
        old: &Index,
        new: &Index,
        alter_type: AlterType,
    ) -> Result<(), CatalogError> {
        match alter_type {
            AlterType::Add => self.alter_add_index(ctx, old, new).await,
            AlterType::Delete => self.alter_delete_index(ctx, new).await,
            AlterType::Unknown(code) => Err(CatalogError::InvalidArgument(format!(
                "unknown alter type: {code}"
            ))),
        }
    }

    async fn alter_add_index(
        &self,
        ctx: &Context,
        old: &Index,
        new: &Index,
    ) -> Result<(), CatalogError> {
        let mut saves = SaveBatch::new();
        for (segment_id, segment) in &new.segment_indexes {
            if old.segment_indexes.get(segment_id) == Some(segment) {
                continue;
            }
            let key = self.keys.segment_index(
                new.collection_id,
                new.index_id,
                segment.partition_id,
                segment.segment_id,
            );
            saves.insert(key, encode_record(&marshal_segment_index(new, segment))?);
        }

        if old.create_time != new.create_time || old.is_deleted != new.is_deleted {
            let key = self.keys.index(new.collection_id, new.index_id);
            saves.insert(key, encode_record(&marshal_index(new))?);
        }

        if saves.is_empty() {
            tracing::debug!(index_id = new.index_id, "alter index: nothing changed");
            return Ok(());
        }
        let first_key = saves.keys().next().cloned().unwrap_or_default();
        self.txn
            .multi_save(ctx, saves)
            .await
            .map_err(|err| write_failed("alter_index_add", &first_key, err))
    }

    async fn alter_delete_index(&self, ctx: &Context, new: &Index) -> Result<(), CatalogError> {
        let removals: Vec<String> = new
            .segment_indexes
            .values()
            .map(|segment| {
                self.keys.segment_index(
                    new.collection_id,
                    new.index_id,
                    segment.partition_id,
                    segment.segment_id,
                )
            })
            .collect();
        let Some(first_key) = removals.first().cloned() else {
            tracing::debug!(index_id = new.index_id, "alter index: no segments to delete");
            return Ok(());
        };
        self.txn
            .multi_remove(ctx, &removals)
            .await
            .map_err(|err| write_failed("alter_index_delete", &first_key, err))
    }

    /// Reconstructs every index from both on-disk layouts.
    ///
    /// Each index id appears once. Where both layouts hold an index, the
    /// per-segment entries are merged into the index-level entry and win on
    /// conflicting segment ids; indexes known only from per-segment records
    /// are returned as they are. Output is ordered by index id.
    pub async fn list_indexes(&self, ctx: &Context) -> Result<Vec<Index>, CatalogError> {
        let mut index_meta = self.list_index_meta(ctx).await?;
        let segment_meta = self.list_segment_indexes(ctx).await?;

        for (index_id, from_segments) in segment_meta {
            let merged = match index_meta.remove(&index_id) {
                Some(base) => merge_index(base, from_segments),
                None => from_segments,
            };
            index_meta.insert(index_id, merged);
        }
        Ok(index_meta.into_values().collect())
    }

    async fn list_index_meta(
        &self,
        ctx: &Context,
    ) -> Result<BTreeMap<UniqueId, Index>, CatalogError> {
        let prefix = self.keys.index_scan();
        let pairs = self
            .txn
            .load_with_prefix(ctx, &prefix)
            .await
            .map_err(|err| scan_failed("list_index_meta", &prefix, err))?;

        let mut indexes = BTreeMap::new();
        for (key, value) in pairs {
            let Some(info) = decode_listed::<IndexInfo>(&key, &value) else {
                continue;
            };
            let index_id = info.index_id;
            if indexes.insert(index_id, unmarshal_index(info)).is_some() {
                tracing::warn!(index_id, key = %key, "duplicated index id in index meta");
            }
        }
        Ok(indexes)
    }

    async fn list_segment_indexes(
        &self,
        ctx: &Context,
    ) -> Result<BTreeMap<UniqueId, Index>, CatalogError> {
        let prefix = self.keys.segment_index_scan();
        let pairs = self
            .txn
            .load_with_prefix(ctx, &prefix)
            .await
            .map_err(|err| scan_failed("list_segment_indexes", &prefix, err))?;

        let mut indexes: BTreeMap<UniqueId, Index> = BTreeMap::new();
        for (key, value) in pairs {
            let Some(info) = decode_listed::<SegmentIndexInfo>(&key, &value) else {
                continue;
            };
            let single = unmarshal_segment_index(info);
            match indexes.get_mut(&single.index_id) {
                Some(existing) => existing.segment_indexes.extend(single.segment_indexes),
                None => {
                    indexes.insert(single.index_id, single);
                }
            }
        }
        Ok(indexes)
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::Catalog;
    use crate::config::CatalogConfig;
    use crate::context::Context;
    use crate::kv::{TOMBSTONE, TxnKv};
    use crate::model::{AlterType, Collection, Index, SegmentIndex};

    fn index(segments: &[(i64, i64)]) -> Index {
        Index {
            collection_id: 100,
            field_id: 101,
            index_id: 5,
            index_name: "vec".into(),
            create_time: 1,
            segment_indexes: segments
                .iter()
                .map(|(segment_id, build_id)| {
                    (
                        *segment_id,
                        SegmentIndex {
                            segment_id: *segment_id,
                            partition_id: 7,
                            build_id: *build_id,
                            enable_index: true,
                            create_time: 1,
                        },
                    )
                })
                .collect(),
            ..Index::default()
        }
    }

    #[tokio::test]
    async fn unchanged_add_is_a_no_op() {
        let ctx = Context::background();
        let (catalog, store) = Catalog::in_memory(CatalogConfig::default()).expect("catalog");
        let current = index(&[(1, 11)]);
        let before = store.revision();
        catalog
            .alter_index(&ctx, &current, &current.clone(), AlterType::Add)
            .await
            .expect("no-op");
        assert_eq!(store.revision(), before);
    }

    #[tokio::test]
    async fn add_writes_only_changed_segments() {
        let ctx = Context::background();
        let (catalog, store) = Catalog::in_memory(CatalogConfig::default()).expect("catalog");
        let old = index(&[(1, 11), (2, 12)]);
        let new = index(&[(1, 11), (2, 22), (3, 13)]);
        catalog
            .alter_index(&ctx, &old, &new, AlterType::Add)
            .await
            .expect("add");
        assert_eq!(
            store.keys(),
            vec![
                "root-coord/segment-index/100/5/7/2".to_string(),
                "root-coord/segment-index/100/5/7/3".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn soft_delete_rewrites_index_level_record() {
        let ctx = Context::background();
        let (catalog, store) = Catalog::in_memory(CatalogConfig::default()).expect("catalog");
        let old = index(&[]);
        let mut new = old.clone();
        new.is_deleted = true;
        catalog
            .alter_index(&ctx, &old, &new, AlterType::Add)
            .await
            .expect("soft delete");
        assert_eq!(store.keys(), vec!["root-coord/index/100/5".to_string()]);
        let listed = catalog.list_indexes(&ctx).await.expect("list");
        assert!(listed[0].is_deleted);
    }

    #[tokio::test]
    async fn delete_removes_listed_segments() {
        let ctx = Context::background();
        let (catalog, store) = Catalog::in_memory(CatalogConfig::default()).expect("catalog");
        let all = index(&[(1, 11), (2, 12)]);
        catalog
            .alter_index(&ctx, &index(&[]), &all, AlterType::Add)
            .await
            .expect("add");
        catalog
            .alter_index(&ctx, &all, &index(&[(1, 11)]), AlterType::Delete)
            .await
            .expect("delete");
        assert_eq!(
            store.keys(),
            vec!["root-coord/segment-index/100/5/7/2".to_string()]
        );

        let before = store.revision();
        catalog
            .alter_index(&ctx, &all, &index(&[]), AlterType::Delete)
            .await
            .expect("empty delete");
        assert_eq!(store.revision(), before);
    }

    #[tokio::test]
    async fn unknown_alter_type_writes_nothing() {
        let ctx = Context::background();
        let (catalog, store) = Catalog::in_memory(CatalogConfig::default()).expect("catalog");
        let err = catalog
            .alter_index(&ctx, &index(&[]), &index(&[(1, 1)]), AlterType::from(9))
            .await
            .expect_err("unknown");
        assert_eq!(err.code_str(), "invalid_argument");
        assert_eq!(store.revision(), 0);
    }

    #[tokio::test]
    async fn create_index_splits_segments_into_their_own_records() {
        let ctx = Context::background();
        let (catalog, store) = Catalog::in_memory(CatalogConfig::default()).expect("catalog");
        let collection = Collection {
            collection_id: 100,
            name: "books".into(),
            ..Collection::default()
        };
        catalog
            .create_index(&ctx, &collection, &index(&[(1, 11)]))
            .await
            .expect("create");
        assert_eq!(store.revision(), 1);
        assert_eq!(
            store.keys(),
            vec![
                "root-coord/collection/100".to_string(),
                "root-coord/index/100/5".to_string(),
                "root-coord/segment-index/100/5/7/1".to_string(),
            ]
        );
        let listed = catalog.list_indexes(&ctx).await.expect("list");
        assert_eq!(listed, vec![index(&[(1, 11)])]);
    }

    #[tokio::test]
    async fn moved_markers_are_skipped_in_both_layouts() {
        let ctx = Context::background();
        let (catalog, store) = Catalog::in_memory(CatalogConfig::default()).expect("catalog");
        catalog
            .alter_index(&ctx, &index(&[]), &index(&[(1, 11)]), AlterType::Add)
            .await
            .expect("add");
        store
            .save(&ctx, "root-coord/index/100/6", TOMBSTONE.to_vec())
            .await
            .expect("moved");
        store
            .save(&ctx, "root-coord/segment-index/100/6/7/1", TOMBSTONE.to_vec())
            .await
            .expect("moved");
        let listed = catalog.list_indexes(&ctx).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].index_id, 5);
    }
}
