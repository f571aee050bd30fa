use crate::catalog::Catalog;
use crate::context::Context;
use crate::error::CatalogError;
use crate::kv::Timestamp;
use crate::model::{
    AlterType, Collection, Credential, GrantEntity, Index, OperatePrivilegeType,
    OperateUserRoleType, RoleEntity, RoleResult, UniqueId, UserEntity, UserResult,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Runs `f` to completion on `rt`. Inside a multi-threaded runtime the
/// current worker is handed over with `block_in_place` first; calling from a
/// current-thread runtime panics, as with any nested `block_on`.
pub fn block_on_catalog<F, T>(rt: &Handle, f: F) -> T
where
    F: Future<Output = T>,
{
    match Handle::try_current() {
        Ok(_) => tokio::task::block_in_place(|| rt.block_on(f)),
        Err(_) => rt.block_on(f),
    }
}

/// Blocking facade over [`Catalog`] for callers without an async context.
pub struct CatalogSync {
    inner: Arc<Catalog>,
    rt: Handle,
}

impl CatalogSync {
    pub fn new(inner: Arc<Catalog>, rt: Handle) -> Self {
        Self { inner, rt }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner
    }

    pub fn create_collection(
        &self,
        ctx: &Context,
        collection: &Collection,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        block_on_catalog(&self.rt, self.inner.create_collection(ctx, collection, ts))
    }

    pub fn create_partition(
        &self,
        ctx: &Context,
        collection: &Collection,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        block_on_catalog(&self.rt, self.inner.create_partition(ctx, collection, ts))
    }

    pub fn create_index(
        &self,
        ctx: &Context,
        collection: &Collection,
        index: &Index,
    ) -> Result<(), CatalogError> {
        block_on_catalog(&self.rt, self.inner.create_index(ctx, collection, index))
    }

    pub fn alter_index(
        &self,
        ctx: &Context,
        old: &Index,
        new: &Index,
        alter_type: AlterType,
    ) -> Result<(), CatalogError> {
        block_on_catalog(&self.rt, self.inner.alter_index(ctx, old, new, alter_type))
    }

    pub fn drop_collection(
        &self,
        ctx: &Context,
        collection: &Collection,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        block_on_catalog(&self.rt, self.inner.drop_collection(ctx, collection, ts))
    }

    pub fn drop_partition(
        &self,
        ctx: &Context,
        collection: &Collection,
        partition_id: UniqueId,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        block_on_catalog(
            &self.rt,
            self.inner.drop_partition(ctx, collection, partition_id, ts),
        )
    }

    pub fn drop_index(
        &self,
        ctx: &Context,
        collection: &Collection,
        index_id: UniqueId,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        block_on_catalog(
            &self.rt,
            self.inner.drop_index(ctx, collection, index_id, ts),
        )
    }

    pub fn create_alias(
        &self,
        ctx: &Context,
        collection: &Collection,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        block_on_catalog(&self.rt, self.inner.create_alias(ctx, collection, ts))
    }

    pub fn alter_alias(
        &self,
        ctx: &Context,
        collection: &Collection,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        block_on_catalog(&self.rt, self.inner.alter_alias(ctx, collection, ts))
    }

    pub fn drop_alias(
        &self,
        ctx: &Context,
        collection_id: UniqueId,
        alias: &str,
        ts: Timestamp,
    ) -> Result<(), CatalogError> {
        block_on_catalog(
            &self.rt,
            self.inner.drop_alias(ctx, collection_id, alias, ts),
        )
    }

    pub fn get_collection_by_id(
        &self,
        ctx: &Context,
        collection_id: UniqueId,
        ts: Timestamp,
    ) -> Result<Collection, CatalogError> {
        block_on_catalog(
            &self.rt,
            self.inner.get_collection_by_id(ctx, collection_id, ts),
        )
    }

    pub fn collection_exists(&self, ctx: &Context, collection_id: UniqueId, ts: Timestamp) -> bool {
        block_on_catalog(
            &self.rt,
            self.inner.collection_exists(ctx, collection_id, ts),
        )
    }

    pub fn get_collection_by_name(
        &self,
        ctx: &Context,
        name: &str,
        ts: Timestamp,
    ) -> Result<Collection, CatalogError> {
        block_on_catalog(&self.rt, self.inner.get_collection_by_name(ctx, name, ts))
    }

    pub fn list_collections(
        &self,
        ctx: &Context,
        ts: Timestamp,
    ) -> Result<BTreeMap<String, Collection>, CatalogError> {
        block_on_catalog(&self.rt, self.inner.list_collections(ctx, ts))
    }

    pub fn list_aliases(
        &self,
        ctx: &Context,
        ts: Timestamp,
    ) -> Result<Vec<Collection>, CatalogError> {
        block_on_catalog(&self.rt, self.inner.list_aliases(ctx, ts))
    }

    pub fn list_indexes(&self, ctx: &Context) -> Result<Vec<Index>, CatalogError> {
        block_on_catalog(&self.rt, self.inner.list_indexes(ctx))
    }

    pub fn create_credential(
        &self,
        ctx: &Context,
        credential: &Credential,
    ) -> Result<(), CatalogError> {
        block_on_catalog(&self.rt, self.inner.create_credential(ctx, credential))
    }

    pub fn get_credential(
        &self,
        ctx: &Context,
        username: &str,
    ) -> Result<Credential, CatalogError> {
        block_on_catalog(&self.rt, self.inner.get_credential(ctx, username))
    }

    pub fn drop_credential(&self, ctx: &Context, username: &str) -> Result<(), CatalogError> {
        block_on_catalog(&self.rt, self.inner.drop_credential(ctx, username))
    }

    pub fn list_credentials(&self, ctx: &Context) -> Result<Vec<String>, CatalogError> {
        block_on_catalog(&self.rt, self.inner.list_credentials(ctx))
    }

    pub fn create_role(
        &self,
        ctx: &Context,
        tenant: &str,
        entity: &RoleEntity,
    ) -> Result<(), CatalogError> {
        block_on_catalog(&self.rt, self.inner.create_role(ctx, tenant, entity))
    }

    pub fn drop_role(
        &self,
        ctx: &Context,
        tenant: &str,
        role_name: &str,
    ) -> Result<(), CatalogError> {
        block_on_catalog(&self.rt, self.inner.drop_role(ctx, tenant, role_name))
    }

    pub fn operate_user_role(
        &self,
        ctx: &Context,
        tenant: &str,
        user: &UserEntity,
        role: &RoleEntity,
        operate_type: OperateUserRoleType,
    ) -> Result<(), CatalogError> {
        block_on_catalog(
            &self.rt,
            self.inner
                .operate_user_role(ctx, tenant, user, role, operate_type),
        )
    }

    pub fn select_role(
        &self,
        ctx: &Context,
        tenant: &str,
        entity: Option<&RoleEntity>,
        include_user_info: bool,
    ) -> Result<Vec<RoleResult>, CatalogError> {
        block_on_catalog(
            &self.rt,
            self.inner
                .select_role(ctx, tenant, entity, include_user_info),
        )
    }

    pub fn select_user(
        &self,
        ctx: &Context,
        tenant: &str,
        entity: Option<&UserEntity>,
        include_role_info: bool,
    ) -> Result<Vec<UserResult>, CatalogError> {
        block_on_catalog(
            &self.rt,
            self.inner
                .select_user(ctx, tenant, entity, include_role_info),
        )
    }

    pub fn operate_privilege(
        &self,
        ctx: &Context,
        tenant: &str,
        entity: &GrantEntity,
        operate_type: OperatePrivilegeType,
    ) -> Result<(), CatalogError> {
        block_on_catalog(
            &self.rt,
            self.inner
                .operate_privilege(ctx, tenant, entity, operate_type),
        )
    }

    pub fn select_grant(
        &self,
        ctx: &Context,
        tenant: &str,
        entity: &GrantEntity,
    ) -> Result<Vec<GrantEntity>, CatalogError> {
        block_on_catalog(&self.rt, self.inner.select_grant(ctx, tenant, entity))
    }

    pub fn list_policy(&self, ctx: &Context, tenant: &str) -> Result<Vec<String>, CatalogError> {
        block_on_catalog(&self.rt, self.inner.list_policy(ctx, tenant))
    }

    pub fn list_user_role(&self, ctx: &Context, tenant: &str) -> Result<Vec<String>, CatalogError> {
        block_on_catalog(&self.rt, self.inner.list_user_role(ctx, tenant))
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::CatalogSync;
    use crate::catalog::Catalog;
    use crate::config::CatalogConfig;
    use crate::context::Context;
    use crate::model::{Collection, Credential};
    use std::sync::Arc;

    #[test]
    fn blocking_calls_work_outside_a_runtime() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime");
        let (catalog, _) = Catalog::in_memory(CatalogConfig::default()).expect("catalog");
        let sync = CatalogSync::new(Arc::new(catalog), rt.handle().clone());
        let ctx = Context::background();

        let collection = Collection {
            collection_id: 7,
            name: "books".into(),
            ..Collection::default()
        };
        sync.create_collection(&ctx, &collection, 5).expect("create");
        assert!(sync.collection_exists(&ctx, 7, 5));
        assert!(!sync.collection_exists(&ctx, 7, 4));

        sync.create_credential(&ctx, &Credential::new("alice", "h"))
            .expect("credential");
        assert_eq!(
            sync.list_credentials(&ctx).expect("list"),
            vec!["alice".to_string()]
        );
        sync.close();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_calls_work_inside_a_multi_thread_runtime() {
        let (catalog, _) = Catalog::in_memory(CatalogConfig::default()).expect("catalog");
        let sync = CatalogSync::new(Arc::new(catalog), tokio::runtime::Handle::current());
        let ctx = Context::background();
        assert!(sync.list_indexes(&ctx).expect("list").is_empty());
    }
}
