//! Privilege naming and the object-type to privilege table.
//!
//! The metastore persists privileges under their `Privilege<Name>` form while
//! the API exposes the bare `<Name>`. Everything here is pure; the table is
//! built once and shared.

use crate::error::CatalogError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Tenant whose keys carry no tenant path segment.
pub const DEFAULT_TENANT: &str = "";
pub const PRIVILEGE_WORD: &str = "Privilege";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectType {
    Collection,
    Global,
    User,
}

impl ObjectType {
    pub const ALL: [ObjectType; 3] = [ObjectType::Collection, ObjectType::Global, ObjectType::User];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Collection => "Collection",
            ObjectType::Global => "Global",
            ObjectType::User => "User",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectPrivilege {
    All,
    CreateCollection,
    DropCollection,
    DescribeCollection,
    ShowCollections,
    Load,
    Release,
    Compaction,
    Insert,
    Delete,
    GetStatistics,
    CreateIndex,
    IndexDetail,
    DropIndex,
    Search,
    Flush,
    Query,
    LoadBalance,
    Import,
    CreateOwnership,
    UpdateUser,
    DropOwnership,
    SelectOwnership,
    ManageOwnership,
    SelectUser,
}

impl ObjectPrivilege {
    pub const ALL: [ObjectPrivilege; 25] = [
        ObjectPrivilege::All,
        ObjectPrivilege::CreateCollection,
        ObjectPrivilege::DropCollection,
        ObjectPrivilege::DescribeCollection,
        ObjectPrivilege::ShowCollections,
        ObjectPrivilege::Load,
        ObjectPrivilege::Release,
        ObjectPrivilege::Compaction,
        ObjectPrivilege::Insert,
        ObjectPrivilege::Delete,
        ObjectPrivilege::GetStatistics,
        ObjectPrivilege::CreateIndex,
        ObjectPrivilege::IndexDetail,
        ObjectPrivilege::DropIndex,
        ObjectPrivilege::Search,
        ObjectPrivilege::Flush,
        ObjectPrivilege::Query,
        ObjectPrivilege::LoadBalance,
        ObjectPrivilege::Import,
        ObjectPrivilege::CreateOwnership,
        ObjectPrivilege::UpdateUser,
        ObjectPrivilege::DropOwnership,
        ObjectPrivilege::SelectOwnership,
        ObjectPrivilege::ManageOwnership,
        ObjectPrivilege::SelectUser,
    ];

    /// Name as persisted, e.g. `PrivilegeLoad`.
    pub fn metastore_name(self) -> &'static str {
        match self {
            ObjectPrivilege::All => "PrivilegeAll",
            ObjectPrivilege::CreateCollection => "PrivilegeCreateCollection",
            ObjectPrivilege::DropCollection => "PrivilegeDropCollection",
            ObjectPrivilege::DescribeCollection => "PrivilegeDescribeCollection",
            ObjectPrivilege::ShowCollections => "PrivilegeShowCollections",
            ObjectPrivilege::Load => "PrivilegeLoad",
            ObjectPrivilege::Release => "PrivilegeRelease",
            ObjectPrivilege::Compaction => "PrivilegeCompaction",
            ObjectPrivilege::Insert => "PrivilegeInsert",
            ObjectPrivilege::Delete => "PrivilegeDelete",
            ObjectPrivilege::GetStatistics => "PrivilegeGetStatistics",
            ObjectPrivilege::CreateIndex => "PrivilegeCreateIndex",
            ObjectPrivilege::IndexDetail => "PrivilegeIndexDetail",
            ObjectPrivilege::DropIndex => "PrivilegeDropIndex",
            ObjectPrivilege::Search => "PrivilegeSearch",
            ObjectPrivilege::Flush => "PrivilegeFlush",
            ObjectPrivilege::Query => "PrivilegeQuery",
            ObjectPrivilege::LoadBalance => "PrivilegeLoadBalance",
            ObjectPrivilege::Import => "PrivilegeImport",
            ObjectPrivilege::CreateOwnership => "PrivilegeCreateOwnership",
            ObjectPrivilege::UpdateUser => "PrivilegeUpdateUser",
            ObjectPrivilege::DropOwnership => "PrivilegeDropOwnership",
            ObjectPrivilege::SelectOwnership => "PrivilegeSelectOwnership",
            ObjectPrivilege::ManageOwnership => "PrivilegeManageOwnership",
            ObjectPrivilege::SelectUser => "PrivilegeSelectUser",
        }
    }

    /// Name as exposed to API callers, e.g. `Load`.
    pub fn api_name(self) -> &'static str {
        metastore_to_api(self.metastore_name())
    }

    pub fn from_metastore_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.metastore_name() == name)
    }

    pub fn from_api_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.api_name() == name)
    }
}

/// Strips everything up to and including the `Privilege` marker:
/// `PrivilegeAll` becomes `All`. Names without the marker pass through.
pub fn metastore_to_api(name: &str) -> &str {
    match name.find(PRIVILEGE_WORD) {
        Some(at) => &name[at + PRIVILEGE_WORD.len()..],
        None => name,
    }
}

/// API name for a persisted privilege name, or `None` if the name is unknown.
pub fn privilege_name_for_api(name: &str) -> Option<&'static str> {
    ObjectPrivilege::from_metastore_name(name).map(ObjectPrivilege::api_name)
}

/// Persisted name for an API privilege name, or `None` if the name is unknown.
pub fn privilege_name_for_metastore(name: &str) -> Option<&'static str> {
    ObjectPrivilege::from_api_name(name).map(ObjectPrivilege::metastore_name)
}

/// Which API privileges may be granted on each object type. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPrivileges {
    table: BTreeMap<ObjectType, Vec<ObjectPrivilege>>,
}

impl Default for ObjectPrivileges {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectPrivileges {
    pub fn new() -> Self {
        use ObjectPrivilege as P;
        let mut table = BTreeMap::new();
        table.insert(
            ObjectType::Collection,
            vec![
                P::Load,
                P::Release,
                P::Compaction,
                P::Insert,
                P::Delete,
                P::GetStatistics,
                P::CreateIndex,
                P::IndexDetail,
                P::DropIndex,
                P::Search,
                P::Flush,
                P::Query,
                P::LoadBalance,
                P::Import,
            ],
        );
        table.insert(
            ObjectType::Global,
            vec![
                P::All,
                P::CreateCollection,
                P::DropCollection,
                P::DescribeCollection,
                P::ShowCollections,
                P::CreateOwnership,
                P::DropOwnership,
                P::SelectOwnership,
                P::ManageOwnership,
            ],
        );
        table.insert(ObjectType::User, vec![P::UpdateUser, P::SelectUser]);
        Self { table }
    }

    pub fn object_types(&self) -> impl Iterator<Item = ObjectType> + '_ {
        self.table.keys().copied()
    }

    /// API names of the privileges allowed on `object_type`.
    pub fn privileges(&self, object_type: ObjectType) -> Vec<&'static str> {
        self.table
            .get(&object_type)
            .map(|privileges| privileges.iter().map(|p| p.api_name()).collect())
            .unwrap_or_default()
    }

    pub fn allows(&self, object_type: &str, api_privilege: &str) -> bool {
        let Some(object_type) = ObjectType::from_name(object_type) else {
            return false;
        };
        self.table
            .get(&object_type)
            .is_some_and(|privileges| privileges.iter().any(|p| p.api_name() == api_privilege))
    }
}

#[derive(Serialize)]
struct PolicyRecord<'a> {
    #[serde(rename = "PType")]
    ptype: &'a str,
    #[serde(rename = "V0")]
    role: &'a str,
    #[serde(rename = "V1")]
    resource: &'a str,
    #[serde(rename = "V2")]
    privilege: &'a str,
}

pub fn policy_for_resource(object_type: &str, object_name: &str) -> String {
    format!("{object_type}-{object_name}")
}

/// External policy line for one granted privilege:
/// `{"PType":"p","V0":role,"V1":"<type>-<name>","V2":privilege}`.
pub fn policy_for_privilege(
    role: &str,
    object_type: &str,
    object_name: &str,
    privilege: &str,
) -> Result<String, CatalogError> {
    let resource = policy_for_resource(object_type, object_name);
    serde_json::to_string(&PolicyRecord {
        ptype: "p",
        role,
        resource: &resource,
        privilege,
    })
    .map_err(|e| CatalogError::Encode(e.to_string()))
}

pub fn encode_user_role(user: &str, role: &str) -> String {
    format!("{user}/{role}")
}

/// Joins `prefix`, `tenant` and `key` with `/`, leaving out empty parts so
/// the default tenant adds no path segment.
pub fn tenant_key(prefix: &str, tenant: &str, key: &str) -> String {
    let mut out = prefix.to_string();
    for part in [tenant, key] {
        if !part.is_empty() {
            out.push('/');
            out.push_str(part);
        }
    }
    out
}
