//! On-disk record shapes and their codecs.
//!
//! Collection, index, segment-index and grant records are MessagePack maps
//! keyed by field name; every field defaults when absent, so records written
//! by older or newer versions still decode. Credentials are JSON. Both
//! choices are part of the persisted format.

use crate::error::CatalogError;
use crate::kv::is_tombstone;
use crate::model::{
    Collection, ConsistencyLevel, Field, FieldIndex, Index, KeyValuePair, Partition, SegmentIndex,
    Timestamp, UniqueId,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A raw stored value, classified before any decode is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredValue<'a> {
    /// The tombstone marker: the data now lives in the other layout.
    Moved,
    Record(&'a [u8]),
}

impl<'a> StoredValue<'a> {
    pub fn classify(value: &'a [u8]) -> Self {
        if is_tombstone(value) {
            StoredValue::Moved
        } else {
            StoredValue::Record(value)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSchema {
    pub name: String,
    pub description: String,
    pub auto_id: bool,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionInfo {
    pub id: UniqueId,
    pub schema: CollectionSchema,
    pub create_time: Timestamp,
    pub partitions: Vec<Partition>,
    pub field_indexes: Vec<FieldIndex>,
    pub virtual_channel_names: Vec<String>,
    pub physical_channel_names: Vec<String>,
    pub shards_num: i32,
    pub consistency_level: ConsistencyLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentIndexInfo {
    pub collection_id: UniqueId,
    pub partition_id: UniqueId,
    pub segment_id: UniqueId,
    pub field_id: UniqueId,
    pub index_id: UniqueId,
    pub build_id: UniqueId,
    pub enable_index: bool,
    pub create_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexInfo {
    pub collection_id: UniqueId,
    pub field_id: UniqueId,
    pub index_id: UniqueId,
    pub index_name: String,
    pub index_params: Vec<KeyValuePair>,
    pub deleted: bool,
    pub create_time: Timestamp,
    /// Segment state embedded by older writers. Per-segment records override
    /// these entries when both exist.
    pub segment_indexes: Vec<SegmentIndexInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrantorRecord {
    pub user: String,
    pub privilege: String,
}

/// Value of one grant key: who granted which privilege on that object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrantPrivilegeEntity {
    pub entities: Vec<GrantorRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialInfo {
    pub encrypted_password: String,
}

pub fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>, CatalogError> {
    rmp_serde::to_vec_named(record).map_err(|e| CatalogError::Encode(e.to_string()))
}

pub fn decode_record<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, CatalogError> {
    rmp_serde::from_slice(bytes).map_err(|e| CatalogError::Decode {
        key: key.to_string(),
        message: e.to_string(),
    })
}

pub fn encode_credential(info: &CredentialInfo) -> Result<Vec<u8>, CatalogError> {
    serde_json::to_vec(info).map_err(|e| CatalogError::Encode(e.to_string()))
}

pub fn decode_credential(key: &str, bytes: &[u8]) -> Result<CredentialInfo, CatalogError> {
    serde_json::from_slice(bytes).map_err(|e| CatalogError::Decode {
        key: key.to_string(),
        message: e.to_string(),
    })
}

pub fn marshal_collection(collection: &Collection) -> CollectionInfo {
    CollectionInfo {
        id: collection.collection_id,
        schema: CollectionSchema {
            name: collection.name.clone(),
            description: collection.description.clone(),
            auto_id: collection.auto_id,
            fields: collection.fields.clone(),
        },
        create_time: collection.create_time,
        partitions: collection.partitions.clone(),
        field_indexes: collection.field_indexes.clone(),
        virtual_channel_names: collection.virtual_channel_names.clone(),
        physical_channel_names: collection.physical_channel_names.clone(),
        shards_num: collection.shards_num,
        consistency_level: collection.consistency_level,
    }
}

pub fn unmarshal_collection(info: CollectionInfo) -> Collection {
    Collection {
        collection_id: info.id,
        name: info.schema.name,
        description: info.schema.description,
        auto_id: info.schema.auto_id,
        fields: info.schema.fields,
        partitions: info.partitions,
        field_indexes: info.field_indexes,
        virtual_channel_names: info.virtual_channel_names,
        physical_channel_names: info.physical_channel_names,
        shards_num: info.shards_num,
        create_time: info.create_time,
        consistency_level: info.consistency_level,
        aliases: Vec::new(),
        extra: Default::default(),
    }
}

/// Alias records reuse the collection shape: the target id plus the alias as
/// the schema name.
pub fn marshal_alias(collection_id: UniqueId, alias: &str) -> CollectionInfo {
    CollectionInfo {
        id: collection_id,
        schema: CollectionSchema {
            name: alias.to_string(),
            ..CollectionSchema::default()
        },
        ..CollectionInfo::default()
    }
}

pub fn marshal_segment_index(index: &Index, segment: &SegmentIndex) -> SegmentIndexInfo {
    SegmentIndexInfo {
        collection_id: index.collection_id,
        partition_id: segment.partition_id,
        segment_id: segment.segment_id,
        field_id: index.field_id,
        index_id: index.index_id,
        build_id: segment.build_id,
        enable_index: segment.enable_index,
        create_time: segment.create_time,
    }
}

fn segment_from_info(info: &SegmentIndexInfo) -> SegmentIndex {
    SegmentIndex {
        segment_id: info.segment_id,
        partition_id: info.partition_id,
        build_id: info.build_id,
        enable_index: info.enable_index,
        create_time: info.create_time,
    }
}

/// A per-segment record as a single-segment index.
pub fn unmarshal_segment_index(info: SegmentIndexInfo) -> Index {
    let segment = segment_from_info(&info);
    Index {
        collection_id: info.collection_id,
        field_id: info.field_id,
        index_id: info.index_id,
        segment_indexes: [(info.segment_id, segment)].into_iter().collect(),
        ..Index::default()
    }
}

/// Index-level record for `index`. Segment state is not embedded; the
/// catalog writes it as per-segment records instead.
pub fn marshal_index(index: &Index) -> IndexInfo {
    IndexInfo {
        collection_id: index.collection_id,
        field_id: index.field_id,
        index_id: index.index_id,
        index_name: index.index_name.clone(),
        index_params: index.index_params.clone(),
        deleted: index.is_deleted,
        create_time: index.create_time,
        segment_indexes: Vec::new(),
    }
}

pub fn unmarshal_index(info: IndexInfo) -> Index {
    Index {
        collection_id: info.collection_id,
        field_id: info.field_id,
        index_id: info.index_id,
        index_name: info.index_name,
        is_deleted: info.deleted,
        create_time: info.create_time,
        index_params: info.index_params,
        segment_indexes: info
            .segment_indexes
            .iter()
            .map(|s| (s.segment_id, segment_from_info(s)))
            .collect(),
    }
}

/// Reconciles the index-level view `base` with the per-segment view
/// `segments` of the same index id. Segment entries from `segments` replace
/// same-id entries in `base`; every other segment is kept. Scalar fields
/// missing from `base` are taken from `segments`.
pub fn merge_index(mut base: Index, segments: Index) -> Index {
    base.segment_indexes.extend(segments.segment_indexes);
    if base.collection_id == 0 {
        base.collection_id = segments.collection_id;
    }
    if base.field_id == 0 {
        base.field_id = segments.field_id;
    }
    if base.index_name.is_empty() {
        base.index_name = segments.index_name;
    }
    if base.index_params.is_empty() {
        base.index_params = segments.index_params;
    }
    if base.create_time == 0 {
        base.create_time = segments.create_time;
    }
    base
}
