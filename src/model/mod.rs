//! Catalog entities as callers see them. Persisted shapes live in
//! [`record`]; conversions between the two are explicit.

pub mod record;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

pub use crate::kv::Timestamp;

/// Globally unique identifier allocated by the coordinator.
pub type UniqueId = i64;

/// Write-ahead entries persisted alongside a primary record.
pub type Extra = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
}

impl KeyValuePair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    None,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    VarChar,
    BinaryVector,
    FloatVector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Strong,
    Session,
    #[default]
    Bounded,
    Eventually,
    Customized,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Field {
    pub field_id: UniqueId,
    pub name: String,
    pub is_primary_key: bool,
    pub description: String,
    pub data_type: DataType,
    pub type_params: Vec<KeyValuePair>,
    pub index_params: Vec<KeyValuePair>,
    pub auto_id: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Partition {
    pub partition_id: UniqueId,
    pub partition_name: String,
    pub partition_created_timestamp: Timestamp,
}

/// Associates a schema field with the index built on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldIndex {
    pub field_id: UniqueId,
    pub index_id: UniqueId,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Collection {
    pub collection_id: UniqueId,
    pub name: String,
    pub description: String,
    pub auto_id: bool,
    pub fields: Vec<Field>,
    pub partitions: Vec<Partition>,
    pub field_indexes: Vec<FieldIndex>,
    pub virtual_channel_names: Vec<String>,
    pub physical_channel_names: Vec<String>,
    pub shards_num: i32,
    pub create_time: Timestamp,
    pub consistency_level: ConsistencyLevel,
    /// Stored as separate alias records, never inside the collection record.
    pub aliases: Vec<String>,
    /// Written next to the record in the same call; not part of the record.
    pub extra: Extra,
}

impl Collection {
    pub fn partition(&self, partition_id: UniqueId) -> Option<&Partition> {
        self.partitions
            .iter()
            .find(|p| p.partition_id == partition_id)
    }
}

/// Build state of one segment for one index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentIndex {
    pub segment_id: UniqueId,
    pub partition_id: UniqueId,
    pub build_id: UniqueId,
    pub enable_index: bool,
    pub create_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Index {
    pub collection_id: UniqueId,
    pub field_id: UniqueId,
    pub index_id: UniqueId,
    pub index_name: String,
    pub is_deleted: bool,
    pub create_time: Timestamp,
    pub index_params: Vec<KeyValuePair>,
    /// Keyed by segment id.
    pub segment_indexes: BTreeMap<UniqueId, SegmentIndex>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub encrypted_password: Zeroizing<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>, encrypted_password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            encrypted_password: Zeroizing::new(encrypted_password.into()),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("encrypted_password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleEntity {
    pub name: String,
}

impl RoleEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserEntity {
    pub name: String,
}

impl UserEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Names an object type such as `Collection` or `Global`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectEntity {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrivilegeEntity {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GrantorEntity {
    pub user: UserEntity,
    pub privilege: PrivilegeEntity,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GrantEntity {
    pub role: RoleEntity,
    pub object: Option<ObjectEntity>,
    pub object_name: String,
    pub grantor: Option<GrantorEntity>,
}

impl GrantEntity {
    /// A grant selector for every object the role has privileges on.
    pub fn for_role(role: impl Into<String>) -> Self {
        Self {
            role: RoleEntity::new(role),
            ..Self::default()
        }
    }

    pub fn new(
        role: impl Into<String>,
        object_type: impl Into<String>,
        object_name: impl Into<String>,
    ) -> Self {
        Self {
            role: RoleEntity::new(role),
            object: Some(ObjectEntity {
                name: object_type.into(),
            }),
            object_name: object_name.into(),
            grantor: None,
        }
    }

    pub fn with_grantor(mut self, user: impl Into<String>, privilege: impl Into<String>) -> Self {
        self.grantor = Some(GrantorEntity {
            user: UserEntity::new(user),
            privilege: PrivilegeEntity {
                name: privilege.into(),
            },
        });
        self
    }

    pub fn object_type(&self) -> Option<&str> {
        self.object
            .as_ref()
            .map(|o| o.name.as_str())
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleResult {
    pub role: RoleEntity,
    pub users: Vec<UserEntity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserResult {
    pub user: UserEntity,
    pub roles: Vec<RoleEntity>,
}

/// How [`crate::catalog::Catalog::alter_index`] applies the new index state.
/// Wire codes the catalog does not know arrive as `Unknown` and are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterType {
    Add,
    Delete,
    Unknown(i32),
}

impl From<i32> for AlterType {
    fn from(code: i32) -> Self {
        match code {
            0 => AlterType::Add,
            1 => AlterType::Delete,
            other => AlterType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperateUserRoleType {
    AddUserToRole,
    RemoveUserFromRole,
    Unknown(i32),
}

impl From<i32> for OperateUserRoleType {
    fn from(code: i32) -> Self {
        match code {
            0 => OperateUserRoleType::AddUserToRole,
            1 => OperateUserRoleType::RemoveUserFromRole,
            other => OperateUserRoleType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatePrivilegeType {
    Grant,
    Revoke,
    Unknown(i32),
}

impl OperatePrivilegeType {
    pub fn is_grant(self) -> bool {
        matches!(self, OperatePrivilegeType::Grant)
    }

    pub fn is_revoke(self) -> bool {
        matches!(self, OperatePrivilegeType::Revoke)
    }
}

impl From<i32> for OperatePrivilegeType {
    fn from(code: i32) -> Self {
        match code {
            0 => OperatePrivilegeType::Grant,
            1 => OperatePrivilegeType::Revoke,
            other => OperatePrivilegeType::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AlterType, Credential, GrantEntity, OperatePrivilegeType, OperateUserRoleType};

    #[test]
    fn wire_codes_map_to_open_enums() {
        assert_eq!(AlterType::from(0), AlterType::Add);
        assert_eq!(AlterType::from(1), AlterType::Delete);
        assert_eq!(AlterType::from(7), AlterType::Unknown(7));
        assert_eq!(
            OperateUserRoleType::from(1),
            OperateUserRoleType::RemoveUserFromRole
        );
        assert_eq!(
            OperatePrivilegeType::from(-1),
            OperatePrivilegeType::Unknown(-1)
        );
        assert!(OperatePrivilegeType::from(0).is_grant());
        assert!(OperatePrivilegeType::from(1).is_revoke());
    }

    #[test]
    fn credential_debug_redacts_password() {
        let credential = Credential::new("alice", "$2a$10$secret");
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn object_type_treats_empty_name_as_unset() {
        let mut entity = GrantEntity::new("role", "", "obj");
        assert_eq!(entity.object_type(), None);
        entity = GrantEntity::new("role", "Collection", "obj");
        assert_eq!(entity.object_type(), Some("Collection"));
        assert_eq!(GrantEntity::for_role("role").object_type(), None);
    }
}
