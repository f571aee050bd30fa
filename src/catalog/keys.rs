use crate::config::CatalogConfig;
use crate::model::UniqueId;
use crate::privilege::tenant_key;

/// Every key the catalog reads or writes, derived once from the component
/// prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    collection: String,
    alias: String,
    index: String,
    segment_index: String,
    credential: String,
    role: String,
    role_mapping: String,
    grantee: String,
}

impl KeyLayout {
    pub const CREDENTIAL_USERS: &'static str = "credential/users";

    pub fn new(component_prefix: &str) -> Self {
        let at = |suffix: &str| format!("{component_prefix}/{suffix}");
        Self {
            collection: at("collection"),
            alias: at("collection-alias"),
            index: at("index"),
            segment_index: at("segment-index"),
            credential: at(Self::CREDENTIAL_USERS),
            role: at("credential/roles"),
            role_mapping: at("credential/user-role-mapping"),
            grantee: at("credential/grantee-privileges"),
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(&config.component_prefix)
    }

    pub fn collection(&self, collection_id: UniqueId) -> String {
        format!("{}/{collection_id}", self.collection)
    }

    /// Scan prefix over all collection records. The trailing `/` keeps
    /// alias records (`collection-alias/..`) out of the scan.
    pub fn collection_scan(&self) -> String {
        format!("{}/", self.collection)
    }

    pub fn alias(&self, alias: &str) -> String {
        format!("{}/{alias}", self.alias)
    }

    pub fn alias_scan(&self) -> String {
        format!("{}/", self.alias)
    }

    pub fn index(&self, collection_id: UniqueId, index_id: UniqueId) -> String {
        format!("{}/{collection_id}/{index_id}", self.index)
    }

    pub fn index_scan(&self) -> String {
        format!("{}/", self.index)
    }

    pub fn index_collection_scan(&self, collection_id: UniqueId) -> String {
        format!("{}/{collection_id}/", self.index)
    }

    pub fn segment_index(
        &self,
        collection_id: UniqueId,
        index_id: UniqueId,
        partition_id: UniqueId,
        segment_id: UniqueId,
    ) -> String {
        format!(
            "{}/{collection_id}/{index_id}/{partition_id}/{segment_id}",
            self.segment_index
        )
    }

    pub fn segment_index_scan(&self) -> String {
        format!("{}/", self.segment_index)
    }

    pub fn segment_index_collection_scan(&self, collection_id: UniqueId) -> String {
        format!("{}/{collection_id}/", self.segment_index)
    }

    pub fn segment_index_index_scan(&self, collection_id: UniqueId, index_id: UniqueId) -> String {
        format!("{}/{collection_id}/{index_id}/", self.segment_index)
    }

    pub fn segment_index_partition_scan(
        &self,
        collection_id: UniqueId,
        index_id: UniqueId,
        partition_id: UniqueId,
    ) -> String {
        format!(
            "{}/{collection_id}/{index_id}/{partition_id}/",
            self.segment_index
        )
    }

    pub fn credential(&self, username: &str) -> String {
        format!("{}/{username}", self.credential)
    }

    /// Bare credential prefix. Scans over it may also return keys with no
    /// username after the prefix; callers skip those.
    pub fn credential_prefix(&self) -> &str {
        &self.credential
    }

    pub fn role(&self, tenant: &str, role: &str) -> String {
        tenant_key(&self.role, tenant, role)
    }

    pub fn user_role(&self, tenant: &str, user: &str, role: &str) -> String {
        tenant_key(&self.role_mapping, tenant, &format!("{user}/{role}"))
    }

    /// `tenant_key` of the role-mapping prefix for `user`, or for the whole
    /// tenant when `user` is empty.
    pub fn user_role_root(&self, tenant: &str, user: &str) -> String {
        tenant_key(&self.role_mapping, tenant, user)
    }

    pub fn role_root(&self, tenant: &str) -> String {
        tenant_key(&self.role, tenant, "")
    }

    pub fn grant(&self, tenant: &str, role: &str, object_type: &str, object_name: &str) -> String {
        tenant_key(
            &self.grantee,
            tenant,
            &format!("{role}/{object_type}/{object_name}"),
        )
    }

    /// Grant root for `role`, or for the whole tenant when `role` is empty.
    pub fn grant_root(&self, tenant: &str, role: &str) -> String {
        tenant_key(&self.grantee, tenant, role)
    }
}

/// Path segments of `key` after `root/`. Empty when `key` is not under
/// `root/`.
pub fn segments_after<'a>(key: &'a str, root: &str) -> Vec<&'a str> {
    key.strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|rest| rest.split('/').collect())
        .unwrap_or_default()
}
