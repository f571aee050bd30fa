use metastore::catalog::Catalog;
use metastore::config::CatalogConfig;
use metastore::context::Context;
use metastore::kv::{MemoryKv, TOMBSTONE, TxnKv};
use metastore::model::record::{
    IndexInfo, SegmentIndexInfo, encode_record, marshal_index, marshal_segment_index,
};
use metastore::model::{Index, SegmentIndex};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const COLLECTION_ID: i64 = 100;
const FIELD_ID: i64 = 101;
const PARTITION_ID: i64 = 7;

fn segment(segment_id: i64, build_id: i64) -> SegmentIndex {
    SegmentIndex {
        segment_id,
        partition_id: PARTITION_ID,
        build_id,
        enable_index: true,
        create_time: 3,
    }
}

fn index(index_id: i64, segments: &[(i64, i64)]) -> Index {
    Index {
        collection_id: COLLECTION_ID,
        field_id: FIELD_ID,
        index_id,
        index_name: format!("idx_{index_id}"),
        create_time: 2,
        segment_indexes: segments
            .iter()
            .map(|(segment_id, build_id)| (*segment_id, segment(*segment_id, *build_id)))
            .collect(),
        ..Index::default()
    }
}

/// Writes an index-level record the way older versions did, with segment
/// state embedded.
async fn seed_legacy_index(ctx: &Context, catalog: &Catalog, store: &MemoryKv, index: &Index) {
    let info = IndexInfo {
        segment_indexes: index
            .segment_indexes
            .values()
            .map(|s| marshal_segment_index(index, s))
            .collect(),
        ..marshal_index(index)
    };
    store
        .save(
            ctx,
            &catalog.keys().index(index.collection_id, index.index_id),
            encode_record(&info).expect("encode"),
        )
        .await
        .expect("seed index");
}

async fn seed_segment_records(ctx: &Context, catalog: &Catalog, store: &MemoryKv, index: &Index) {
    for s in index.segment_indexes.values() {
        let info: SegmentIndexInfo = marshal_segment_index(index, s);
        store
            .save(
                ctx,
                &catalog.keys().segment_index(
                    index.collection_id,
                    index.index_id,
                    s.partition_id,
                    s.segment_id,
                ),
                encode_record(&info).expect("encode"),
            )
            .await
            .expect("seed segment");
    }
}

fn new_catalog() -> (Catalog, Arc<MemoryKv>) {
    Catalog::in_memory(CatalogConfig::default()).expect("catalog")
}

/// Index 5 has segment {1:A} in the index-level layout and {1:B, 2:C} in
/// the segment layout; the merged index holds {1:B, 2:C} exactly once.
#[tokio::test]
async fn test_segment_layout_wins_and_index_appears_once() {
    let ctx = Context::background();
    let (catalog, store) = new_catalog();
    seed_legacy_index(&ctx, &catalog, &store, &index(5, &[(1, 1_000)])).await;
    seed_segment_records(&ctx, &catalog, &store, &index(5, &[(1, 2_000), (2, 3_000)])).await;

    let indexes = catalog.list_indexes(&ctx).await.expect("list");
    assert_eq!(indexes.len(), 1);
    let merged = &indexes[0];
    assert_eq!(merged.index_id, 5);
    assert_eq!(merged.index_name, "idx_5");
    let builds: BTreeMap<i64, i64> = merged
        .segment_indexes
        .iter()
        .map(|(id, s)| (*id, s.build_id))
        .collect();
    assert_eq!(builds, BTreeMap::from([(1, 2_000), (2, 3_000)]));
}

#[tokio::test]
async fn test_single_layout_indexes_are_kept_as_is() {
    let ctx = Context::background();
    let (catalog, store) = new_catalog();
    let index_only = index(9, &[(4, 40)]);
    let segments_only = index(7, &[(5, 50), (6, 60)]);
    seed_legacy_index(&ctx, &catalog, &store, &index_only).await;
    seed_segment_records(&ctx, &catalog, &store, &segments_only).await;

    let indexes = catalog.list_indexes(&ctx).await.expect("list");
    assert_eq!(indexes.len(), 2);
    assert_eq!(indexes[0].index_id, 7);
    assert_eq!(
        indexes[0].segment_indexes,
        segments_only.segment_indexes,
        "segment-only index keeps every segment"
    );
    assert!(indexes[0].index_name.is_empty());
    assert_eq!(indexes[1], index_only);
}

#[tokio::test]
async fn test_moved_and_malformed_entries_do_not_abort_listing() {
    let ctx = Context::background();
    let (catalog, store) = new_catalog();
    seed_legacy_index(&ctx, &catalog, &store, &index(5, &[(1, 10)])).await;
    store
        .save(&ctx, &catalog.keys().index(COLLECTION_ID, 6), TOMBSTONE.to_vec())
        .await
        .expect("moved");
    store
        .save(
            &ctx,
            &catalog.keys().segment_index(COLLECTION_ID, 6, PARTITION_ID, 1),
            TOMBSTONE.to_vec(),
        )
        .await
        .expect("moved");
    store
        .save(
            &ctx,
            &catalog.keys().segment_index(COLLECTION_ID, 8, PARTITION_ID, 1),
            vec![0xc1, 0xc1],
        )
        .await
        .expect("garbage");

    let indexes = catalog.list_indexes(&ctx).await.expect("list");
    assert_eq!(indexes.iter().map(|i| i.index_id).collect::<Vec<_>>(), vec![5]);
}

fn layout() -> impl Strategy<Value = BTreeMap<i64, BTreeMap<i64, i64>>> {
    prop::collection::btree_map(
        1i64..6,
        prop::collection::btree_map(1i64..12, 1i64..1_000, 0..6),
        0..4,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Whatever the split across layouts, every index appears once and every
    /// segment of either layout survives, with the segment layout winning.
    #[test]
    fn prop_list_indexes_is_a_lossless_union(legacy in layout(), flat in layout()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let indexes = rt.block_on(async {
            let ctx = Context::background();
            let (catalog, store) = new_catalog();
            for (index_id, segments) in &legacy {
                let pairs: Vec<_> = segments.iter().map(|(k, v)| (*k, *v)).collect();
                seed_legacy_index(&ctx, &catalog, &store, &index(*index_id, &pairs)).await;
            }
            for (index_id, segments) in &flat {
                let pairs: Vec<_> = segments.iter().map(|(k, v)| (*k, *v)).collect();
                seed_segment_records(&ctx, &catalog, &store, &index(*index_id, &pairs)).await;
            }
            catalog.list_indexes(&ctx).await.expect("list")
        });

        let ids: Vec<i64> = indexes.iter().map(|i| i.index_id).collect();
        let unique: BTreeSet<i64> = ids.iter().copied().collect();
        prop_assert_eq!(ids.len(), unique.len());

        let flat_ids = flat.iter().filter(|(_, s)| !s.is_empty()).map(|(id, _)| *id);
        let expected_ids: BTreeSet<i64> = legacy.keys().copied().chain(flat_ids).collect();
        prop_assert_eq!(unique, expected_ids);

        for merged in &indexes {
            let mut expected = legacy.get(&merged.index_id).cloned().unwrap_or_default();
            if let Some(segments) = flat.get(&merged.index_id) {
                expected.extend(segments.iter().map(|(k, v)| (*k, *v)));
            }
            let actual: BTreeMap<i64, i64> = merged
                .segment_indexes
                .iter()
                .map(|(id, s)| (*id, s.build_id))
                .collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
