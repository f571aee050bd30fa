use super::keys::segments_after;
use super::{Catalog, decode_listed, decode_point, scan_failed, write_failed};
use crate::context::Context;
use crate::error::{CatalogError, ResourceType};
use crate::model::record::{GrantPrivilegeEntity, GrantorRecord, encode_record};
use crate::model::{
    GrantEntity, GrantorEntity, ObjectEntity, OperatePrivilegeType, OperateUserRoleType,
    PrivilegeEntity, RoleEntity, RoleResult, UserEntity, UserResult,
};
use crate::privilege::{encode_user_role, policy_for_privilege, privilege_name_for_api};
use std::collections::BTreeMap;

impl Catalog {
    /// Role existence is the presence of its key; the value is empty.
    pub async fn create_role(
        &self,
        ctx: &Context,
        tenant: &str,
        entity: &RoleEntity,
    ) -> Result<(), CatalogError> {
        let tenant = self.tenant(tenant);
        if entity.name.is_empty() {
            return Err(CatalogError::InvalidArgument("role name is empty".into()));
        }
        let key = self.keys.role(tenant, &entity.name);
        self.add_member(ctx, "create_role", &key).await
    }

    pub async fn drop_role(
        &self,
        ctx: &Context,
        tenant: &str,
        role_name: &str,
    ) -> Result<(), CatalogError> {
        let tenant = self.tenant(tenant);
        let key = self.keys.role(tenant, role_name);
        self.remove_member(ctx, "drop_role", &key).await
    }

    /// Adds or removes one user-role membership. Removing an absent
    /// membership succeeds.
    pub async fn operate_user_role(
        &self,
        ctx: &Context,
        tenant: &str,
        user: &UserEntity,
        role: &RoleEntity,
        operate_type: OperateUserRoleType,
    ) -> Result<(), CatalogError> {
        let tenant = self.tenant(tenant);
        let key = self.keys.user_role(tenant, &user.name, &role.name);
        match operate_type {
            OperateUserRoleType::AddUserToRole => {
                self.add_member(ctx, "add_user_to_role", &key).await
            }
            OperateUserRoleType::RemoveUserFromRole => {
                self.remove_member(ctx, "remove_user_from_role", &key).await
            }
            OperateUserRoleType::Unknown(code) => Err(CatalogError::InvalidArgument(format!(
                "invalid operate user role type: {code}"
            ))),
        }
    }

    /// All roles of `tenant` when `entity` is `None`, otherwise the one named
    /// role, which must exist.
    pub async fn select_role(
        &self,
        ctx: &Context,
        tenant: &str,
        entity: Option<&RoleEntity>,
        include_user_info: bool,
    ) -> Result<Vec<RoleResult>, CatalogError> {
        let tenant = self.tenant(tenant);
        let mut role_to_users: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if include_user_info {
            for (user, role) in self.user_role_pairs(ctx, tenant).await? {
                role_to_users.entry(role).or_default().push(user);
            }
        }

        let role_names = match entity {
            None => {
                let root = self.keys.role_root(tenant);
                let pairs = self.scan(ctx, "select_role", &root).await?;
                let mut names = Vec::with_capacity(pairs.len());
                for (key, _) in pairs {
                    match segments_after(&key, &root).as_slice() {
                        [name] if !name.is_empty() => names.push(name.to_string()),
                        _ => tracing::warn!(key = %key, "invalid role key"),
                    }
                }
                names
            }
            Some(entity) => {
                if entity.name.is_empty() {
                    return Err(CatalogError::InvalidArgument(
                        "role name in the role entity is empty".into(),
                    ));
                }
                let key = self.keys.role(tenant, &entity.name);
                self.load_txn(ctx, ResourceType::Role, &key).await?;
                vec![entity.name.clone()]
            }
        };

        Ok(role_names
            .into_iter()
            .map(|name| RoleResult {
                users: role_to_users
                    .get(&name)
                    .map(|users| users.iter().map(UserEntity::new).collect())
                    .unwrap_or_default(),
                role: RoleEntity::new(name),
            })
            .collect())
    }

    /// All credentialed users when `entity` is `None`, otherwise the one
    /// named user, which must have a credential. A failed role lookup for
    /// any user fails the whole call.
    pub async fn select_user(
        &self,
        ctx: &Context,
        tenant: &str,
        entity: Option<&UserEntity>,
        include_role_info: bool,
    ) -> Result<Vec<UserResult>, CatalogError> {
        let tenant = self.tenant(tenant);
        let usernames = match entity {
            None => self.list_credentials(ctx).await?,
            Some(entity) => {
                if entity.name.is_empty() {
                    return Err(CatalogError::InvalidArgument(
                        "username in the user entity is empty".into(),
                    ));
                }
                self.get_credential(ctx, &entity.name).await?;
                vec![entity.name.clone()]
            }
        };

        let mut results = Vec::with_capacity(usernames.len());
        for username in usernames {
            let roles = if include_role_info {
                self.roles_of_user(ctx, tenant, &username)
                    .await?
                    .into_iter()
                    .map(RoleEntity::new)
                    .collect()
            } else {
                Vec::new()
            };
            results.push(UserResult {
                user: UserEntity::new(username),
                roles,
            });
        }
        Ok(results)
    }

    /// Grants or revokes `entity.grantor.privilege` on one object for one
    /// role.
    ///
    /// Granting an already granted privilege succeeds without writing.
    /// Revoking from an absent grant key returns the load error; revoking a
    /// privilege the key does not list is a conflict. A revoke that empties
    /// the list deletes the key.
    pub async fn operate_privilege(
        &self,
        ctx: &Context,
        tenant: &str,
        entity: &GrantEntity,
        operate_type: OperatePrivilegeType,
    ) -> Result<(), CatalogError> {
        let tenant = self.tenant(tenant);
        if let OperatePrivilegeType::Unknown(code) = operate_type {
            return Err(CatalogError::InvalidArgument(format!(
                "invalid operate privilege type: {code}"
            )));
        }
        let (object_type, grantor) = validate_grant(entity)?;
        let privilege = grantor.privilege.name.as_str();
        let allowed = privilege_name_for_api(privilege)
            .is_some_and(|api_name| self.privileges.allows(object_type, api_name));
        if operate_type.is_grant() && !allowed {
            return Err(CatalogError::InvalidArgument(format!(
                "privilege {privilege} cannot be granted on object type {object_type}"
            )));
        }
        let key = self
            .keys
            .grant(tenant, &entity.role.name, object_type, &entity.object_name);

        let mut current = match self.txn.load(ctx, &key).await {
            Ok(value) => {
                let mut current: GrantPrivilegeEntity =
                    decode_point(ResourceType::Grant, &key, &value)?;
                let position = current
                    .entities
                    .iter()
                    .position(|granted| granted.privilege == privilege);
                match (position, operate_type.is_grant()) {
                    (Some(_), true) => {
                        tracing::debug!(key = %key, privilege, "privilege already granted");
                        return Ok(());
                    }
                    (None, true) => current.entities.push(GrantorRecord {
                        user: grantor.user.name.clone(),
                        privilege: privilege.to_string(),
                    }),
                    (None, false) => {
                        return Err(CatalogError::Conflict(format!(
                            "privilege {privilege} isn't granted for the role, key: {key}"
                        )));
                    }
                    (Some(at), false) => {
                        current.entities.remove(at);
                    }
                }
                current
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "grant privilege entity not loaded");
                if operate_type.is_revoke() || !err.is_key_not_found() {
                    return Err(CatalogError::from_kv(ResourceType::Grant, &key, err));
                }
                GrantPrivilegeEntity::default()
            }
        };

        if current.entities.is_empty() && operate_type.is_grant() {
            current.entities.push(GrantorRecord {
                user: grantor.user.name.clone(),
                privilege: privilege.to_string(),
            });
        }
        if current.entities.is_empty() {
            return self
                .txn
                .remove(ctx, &key)
                .await
                .map_err(|err| write_failed("revoke_privilege", &key, err));
        }
        let value = encode_record(&current)?;
        self.txn
            .save(ctx, &key, value)
            .await
            .map_err(|err| write_failed("operate_privilege", &key, err))
    }

    /// One result per granted privilege. With an object type and name on
    /// `entity` only that grant key is read and must exist; otherwise every
    /// grant of the role is listed.
    pub async fn select_grant(
        &self,
        ctx: &Context,
        tenant: &str,
        entity: &GrantEntity,
    ) -> Result<Vec<GrantEntity>, CatalogError> {
        let tenant = self.tenant(tenant);
        let role = entity.role.name.as_str();
        if role.is_empty() {
            return Err(CatalogError::InvalidArgument(
                "role name in the grant entity is empty".into(),
            ));
        }

        let mut results = Vec::new();
        match entity.object_type() {
            Some(object_type) if !entity.object_name.is_empty() => {
                let key = self
                    .keys
                    .grant(tenant, role, object_type, &entity.object_name);
                let value = self.load_txn(ctx, ResourceType::Grant, &key).await?;
                let record: GrantPrivilegeEntity = decode_point(ResourceType::Grant, &key, &value)?;
                push_grants(&mut results, role, object_type, &entity.object_name, record);
            }
            _ => {
                let root = self.keys.grant_root(tenant, role);
                for (key, value) in self.scan(ctx, "select_grant", &root).await? {
                    let segments = segments_after(&key, &root);
                    let [object_type, object_name] = segments.as_slice() else {
                        tracing::warn!(key = %key, "invalid grant key");
                        continue;
                    };
                    let Some(record) = decode_listed::<GrantPrivilegeEntity>(&key, &value) else {
                        continue;
                    };
                    push_grants(&mut results, role, object_type, object_name, record);
                }
            }
        }
        Ok(results)
    }

    /// Every granted privilege of `tenant` as an external policy line.
    pub async fn list_policy(
        &self,
        ctx: &Context,
        tenant: &str,
    ) -> Result<Vec<String>, CatalogError> {
        let tenant = self.tenant(tenant);
        let root = self.keys.grant_root(tenant, "");
        let mut policies = Vec::new();
        for (key, value) in self.scan(ctx, "list_policy", &root).await? {
            let segments = segments_after(&key, &root);
            let [role, object_type, object_name] = segments.as_slice() else {
                tracing::warn!(key = %key, "invalid grant key");
                continue;
            };
            let Some(record) = decode_listed::<GrantPrivilegeEntity>(&key, &value) else {
                continue;
            };
            for granted in &record.entities {
                policies.push(policy_for_privilege(
                    role,
                    object_type,
                    object_name,
                    &granted.privilege,
                )?);
            }
        }
        Ok(policies)
    }

    /// Every user-role membership of `tenant`, encoded as `user/role`.
    pub async fn list_user_role(
        &self,
        ctx: &Context,
        tenant: &str,
    ) -> Result<Vec<String>, CatalogError> {
        let tenant = self.tenant(tenant);
        Ok(self
            .user_role_pairs(ctx, tenant)
            .await?
            .iter()
            .map(|(user, role)| encode_user_role(user, role))
            .collect())
    }

    async fn user_role_pairs(
        &self,
        ctx: &Context,
        tenant: &str,
    ) -> Result<Vec<(String, String)>, CatalogError> {
        let root = self.keys.user_role_root(tenant, "");
        let mut pairs = Vec::new();
        for (key, _) in self.scan(ctx, "list_user_role", &root).await? {
            match segments_after(&key, &root).as_slice() {
                [user, role] => pairs.push((user.to_string(), role.to_string())),
                _ => tracing::warn!(key = %key, "invalid user-role key"),
            }
        }
        Ok(pairs)
    }

    async fn roles_of_user(
        &self,
        ctx: &Context,
        tenant: &str,
        username: &str,
    ) -> Result<Vec<String>, CatalogError> {
        let root = self.keys.user_role_root(tenant, username);
        let mut roles = Vec::new();
        for (key, _) in self.scan(ctx, "roles_of_user", &root).await? {
            match segments_after(&key, &root).as_slice() {
                [role] => roles.push(role.to_string()),
                _ => tracing::warn!(key = %key, "invalid user-role key"),
            }
        }
        Ok(roles)
    }

    /// Scans the children of `root`, i.e. keys under `root/`.
    async fn scan(
        &self,
        ctx: &Context,
        operation: &'static str,
        root: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, CatalogError> {
        let prefix = format!("{root}/");
        self.txn
            .load_with_prefix(ctx, &prefix)
            .await
            .map_err(|err| scan_failed(operation, &prefix, err))
    }

    async fn add_member(
        &self,
        ctx: &Context,
        operation: &'static str,
        key: &str,
    ) -> Result<(), CatalogError> {
        self.txn
            .save(ctx, key, Vec::new())
            .await
            .map_err(|err| write_failed(operation, key, err))
    }

    async fn remove_member(
        &self,
        ctx: &Context,
        operation: &'static str,
        key: &str,
    ) -> Result<(), CatalogError> {
        self.txn
            .remove(ctx, key)
            .await
            .map_err(|err| write_failed(operation, key, err))
    }
}

fn validate_grant(entity: &GrantEntity) -> Result<(&str, &GrantorEntity), CatalogError> {
    if entity.role.name.is_empty() {
        return Err(CatalogError::InvalidArgument(
            "role name in the grant entity is empty".into(),
        ));
    }
    let object_type = entity
        .object_type()
        .ok_or_else(|| CatalogError::InvalidArgument("grant object type is empty".into()))?;
    if entity.object_name.is_empty() {
        return Err(CatalogError::InvalidArgument(
            "grant object name is empty".into(),
        ));
    }
    let grantor = entity
        .grantor
        .as_ref()
        .ok_or_else(|| CatalogError::InvalidArgument("grant entity has no grantor".into()))?;
    if grantor.privilege.name.is_empty() {
        return Err(CatalogError::InvalidArgument(
            "grant privilege name is empty".into(),
        ));
    }
    Ok((object_type, grantor))
}

fn push_grants(
    results: &mut Vec<GrantEntity>,
    role: &str,
    object_type: &str,
    object_name: &str,
    record: GrantPrivilegeEntity,
) {
    for granted in record.entities {
        results.push(GrantEntity {
            role: RoleEntity::new(role),
            object: Some(ObjectEntity {
                name: object_type.to_string(),
            }),
            object_name: object_name.to_string(),
            grantor: Some(GrantorEntity {
                user: UserEntity::new(granted.user),
                privilege: PrivilegeEntity {
                    name: privilege_name_for_api(&granted.privilege)
                        .unwrap_or_default()
                        .to_string(),
                },
            }),
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::Catalog;
    use crate::config::CatalogConfig;
    use crate::context::Context;
    use crate::model::{
        Credential, GrantEntity, OperatePrivilegeType, OperateUserRoleType, RoleEntity,
        UserEntity,
    };

    fn catalog() -> (Catalog, std::sync::Arc<crate::kv::MemoryKv>) {
        Catalog::in_memory(CatalogConfig::default()).expect("catalog")
    }

    #[tokio::test]
    async fn roles_are_presence_only_keys() {
        let ctx = Context::background();
        let (catalog, store) = catalog();
        catalog
            .create_role(&ctx, "", &RoleEntity::new("dev"))
            .await
            .expect("create");
        assert_eq!(
            store.get("root-coord/credential/roles/dev"),
            Some(Vec::new())
        );
        let roles = catalog
            .select_role(&ctx, "", Some(&RoleEntity::new("dev")), false)
            .await
            .expect("select");
        assert_eq!(roles.len(), 1);

        catalog.drop_role(&ctx, "", "dev").await.expect("drop");
        let err = catalog
            .select_role(&ctx, "", Some(&RoleEntity::new("dev")), false)
            .await
            .expect_err("dropped");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn select_role_rejects_empty_name() {
        let ctx = Context::background();
        let (catalog, _) = catalog();
        let err = catalog
            .select_role(&ctx, "", Some(&RoleEntity::new("")), false)
            .await
            .expect_err("empty");
        assert_eq!(err.code_str(), "invalid_argument");
    }

    #[tokio::test]
    async fn user_role_membership_is_reflected_in_selects() {
        let ctx = Context::background();
        let (catalog, _) = catalog();
        catalog
            .create_credential(&ctx, &Credential::new("alice", "h"))
            .await
            .expect("credential");
        for role in ["admin", "dev"] {
            catalog
                .create_role(&ctx, "", &RoleEntity::new(role))
                .await
                .expect("role");
            catalog
                .operate_user_role(
                    &ctx,
                    "",
                    &UserEntity::new("alice"),
                    &RoleEntity::new(role),
                    OperateUserRoleType::AddUserToRole,
                )
                .await
                .expect("add");
        }

        let roles = catalog.select_role(&ctx, "", None, true).await.expect("roles");
        assert_eq!(roles.len(), 2);
        assert!(roles.iter().all(|r| r.users == vec![UserEntity::new("alice")]));

        let users = catalog
            .select_user(&ctx, "", Some(&UserEntity::new("alice")), true)
            .await
            .expect("users");
        assert_eq!(
            users[0].roles,
            vec![RoleEntity::new("admin"), RoleEntity::new("dev")]
        );
        assert_eq!(
            catalog.list_user_role(&ctx, "").await.expect("list"),
            vec!["alice/admin".to_string(), "alice/dev".to_string()]
        );

        for _ in 0..2 {
            catalog
                .operate_user_role(
                    &ctx,
                    "",
                    &UserEntity::new("alice"),
                    &RoleEntity::new("dev"),
                    OperateUserRoleType::RemoveUserFromRole,
                )
                .await
                .expect("remove is idempotent");
        }
        assert_eq!(
            catalog.list_user_role(&ctx, "").await.expect("list"),
            vec!["alice/admin".to_string()]
        );
    }

    #[tokio::test]
    async fn unknown_user_role_operation_is_rejected() {
        let ctx = Context::background();
        let (catalog, store) = catalog();
        let err = catalog
            .operate_user_role(
                &ctx,
                "",
                &UserEntity::new("alice"),
                &RoleEntity::new("dev"),
                OperateUserRoleType::from(5),
            )
            .await
            .expect_err("unknown");
        assert_eq!(err.code_str(), "invalid_argument");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn select_user_requires_credential() {
        let ctx = Context::background();
        let (catalog, _) = catalog();
        let err = catalog
            .select_user(&ctx, "", Some(&UserEntity::new("ghost")), false)
            .await
            .expect_err("no credential");
        assert!(err.is_not_found());
        let err = catalog
            .select_user(&ctx, "", Some(&UserEntity::new("")), false)
            .await
            .expect_err("empty");
        assert_eq!(err.code_str(), "invalid_argument");
    }

    #[tokio::test]
    async fn tenants_do_not_see_each_other() {
        let ctx = Context::background();
        let (catalog, _) = catalog();
        catalog
            .create_role(&ctx, "t1", &RoleEntity::new("dev"))
            .await
            .expect("t1");
        catalog
            .create_role(&ctx, "t2", &RoleEntity::new("ops"))
            .await
            .expect("t2");
        let t1 = catalog.select_role(&ctx, "t1", None, false).await.expect("t1");
        assert_eq!(t1.len(), 1);
        assert_eq!(t1[0].role.name, "dev");
        let default = catalog.select_role(&ctx, "", None, false).await.expect("default");
        assert!(default.is_empty());
    }

    #[tokio::test]
    async fn grant_requires_grantor_and_object() {
        let ctx = Context::background();
        let (catalog, store) = catalog();
        let err = catalog
            .operate_privilege(
                &ctx,
                "",
                &GrantEntity::new("dev", "Collection", "col1"),
                OperatePrivilegeType::Grant,
            )
            .await
            .expect_err("no grantor");
        assert_eq!(err.code_str(), "invalid_argument");
        let err = catalog
            .operate_privilege(
                &ctx,
                "",
                &GrantEntity::new("dev", "", "col1").with_grantor("root", "PrivilegeLoad"),
                OperatePrivilegeType::Grant,
            )
            .await
            .expect_err("no object");
        assert_eq!(err.code_str(), "invalid_argument");
        let err = catalog
            .operate_privilege(
                &ctx,
                "",
                &GrantEntity::new("dev", "Collection", "col1")
                    .with_grantor("root", "PrivilegeLoad"),
                OperatePrivilegeType::from(3),
            )
            .await
            .expect_err("unknown op");
        assert_eq!(err.code_str(), "invalid_argument");
        assert_eq!(store.revision(), 0);
    }

    #[tokio::test]
    async fn grant_outside_the_privilege_table_is_rejected() {
        let ctx = Context::background();
        let (catalog, store) = catalog();
        for entity in [
            GrantEntity::new("dev", "User", "alice").with_grantor("root", "PrivilegeLoad"),
            GrantEntity::new("dev", "Bucket", "b1").with_grantor("root", "PrivilegeLoad"),
            GrantEntity::new("dev", "Collection", "col1").with_grantor("root", "Load"),
        ] {
            let err = catalog
                .operate_privilege(&ctx, "", &entity, OperatePrivilegeType::Grant)
                .await
                .expect_err("not in table");
            assert_eq!(err.code_str(), "invalid_argument");
        }
        assert_eq!(store.revision(), 0);

        catalog
            .operate_privilege(
                &ctx,
                "",
                &GrantEntity::new("dev", "User", "alice")
                    .with_grantor("root", "PrivilegeUpdateUser"),
                OperatePrivilegeType::Grant,
            )
            .await
            .expect("allowed on users");
    }

    #[tokio::test]
    async fn empty_tenant_falls_back_to_configured_default() {
        let ctx = Context::background();
        let config = CatalogConfig::default().with_default_tenant("t1");
        let (catalog, store) = Catalog::in_memory(config).expect("catalog");
        catalog
            .create_role(&ctx, "", &RoleEntity::new("dev"))
            .await
            .expect("create");
        assert!(store.get("root-coord/credential/roles/t1/dev").is_some());

        let roles = catalog.select_role(&ctx, "t1", None, false).await.expect("t1");
        assert_eq!(roles, catalog.select_role(&ctx, "", None, false).await.expect("default"));
        assert!(catalog.select_role(&ctx, "t2", None, false).await.expect("t2").is_empty());
    }
}
