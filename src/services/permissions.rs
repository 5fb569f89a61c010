use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    db::PrincipalStore,
    error::{AuthError, AuthResult},
    models::{
        permission::{NewPermission, Permission, UpdatePermissionRequest},
        Page, PageQuery,
    },
    services::validation,
};

pub struct PermissionService {
    store: Arc<dyn PrincipalStore>,
}

impl PermissionService {
    pub fn new(store: Arc<dyn PrincipalStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, req: NewPermission) -> AuthResult<Permission> {
        let code = validate_code(&req.code)?;
        let name = validate_name(&req.name)?;
        let description = req.description.trim();
        validation::description(description)?;
        let permission = self.store.create_permission(code, name, description).await?;
        info!("Permission '{}' created", permission.code);
        Ok(permission)
    }

    pub async fn get(&self, id: Uuid) -> AuthResult<Permission> {
        Ok(self.store.find_permission_by_id(id).await?)
    }

    pub async fn list(&self, page: PageQuery) -> AuthResult<Page<Permission>> {
        Ok(self.store.list_permissions(page).await?)
    }

    /// The code is frozen while any role grants the permission, since issued
    /// tokens carry codes rather than ids. The store enforces this in the
    /// same step as the write.
    pub async fn update(&self, id: Uuid, req: UpdatePermissionRequest) -> AuthResult<Permission> {
        let current = self.store.find_permission_by_id(id).await?;

        let code = match req.code.as_deref() {
            Some(code) => validate_code(code)?,
            None => current.code.as_str(),
        };
        let name = match req.name.as_deref() {
            Some(name) => validate_name(name)?,
            None => current.name.as_str(),
        };
        let description = req.description.as_deref().map(str::trim).unwrap_or(&current.description);
        validation::description(description)?;

        Ok(self.store.update_permission(id, code, name, description).await?)
    }

    pub async fn delete(&self, id: Uuid) -> AuthResult<()> {
        let permission = self.store.find_permission_by_id(id).await?;
        if self.store.permission_in_use(id).await? {
            return Err(AuthError::Conflict(format!(
                "permission '{}' is assigned to a role",
                permission.code
            )));
        }
        self.store.delete_permission(id).await?;
        info!("Permission '{}' deleted", permission.code);
        Ok(())
    }
}

/// Codes are `resource:action`, lowercase, no whitespace.
fn validate_code(code: &str) -> AuthResult<&str> {
    let code = code.trim();
    let well_formed = code
        .split_once(':')
        .is_some_and(|(resource, action)| !resource.is_empty() && !action.is_empty())
        && code
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, ':' | '_' | '-' | '.'));
    if !well_formed {
        return Err(AuthError::Validation(format!(
            "permission code '{code}' must look like 'resource:action'"
        )));
    }
    validation::max_len("permission code", code, validation::PERMISSION_CODE_MAX_LEN)?;
    Ok(code)
}

fn validate_name(name: &str) -> AuthResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::Validation("permission name is required".into()));
    }
    validation::max_len("permission name", name, validation::PERMISSION_NAME_MAX_LEN)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::{
        db::{InMemoryPrincipalStore, StoreResult},
        models::{
            role::Role,
            user::{NewUser, User, UserUpdate},
        },
    };

    /// Grants every permission it reads to one role before returning, as if a
    /// concurrent assignment committed right after the read.
    struct GrantOnRead {
        inner: Arc<InMemoryPrincipalStore>,
        role_id: Uuid,
    }

    #[async_trait]
    impl PrincipalStore for GrantOnRead {
        async fn ping(&self) -> StoreResult<()> {
            self.inner.ping().await
        }
        async fn find_by_username(&self, username: &str) -> StoreResult<User> {
            self.inner.find_by_username(username).await
        }
        async fn find_by_email(&self, email: &str) -> StoreResult<User> {
            self.inner.find_by_email(email).await
        }
        async fn find_by_id(&self, id: Uuid) -> StoreResult<User> {
            self.inner.find_by_id(id).await
        }
        async fn create(&self, user: NewUser) -> StoreResult<User> {
            self.inner.create(user).await
        }
        async fn update(&self, id: Uuid, update: UserUpdate) -> StoreResult<User> {
            self.inner.update(id, update).await
        }
        async fn change_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
            self.inner.change_password(id, password_hash).await
        }
        async fn list_users(&self, page: PageQuery) -> StoreResult<Page<User>> {
            self.inner.list_users(page).await
        }
        async fn count_active_users(&self) -> StoreResult<u64> {
            self.inner.count_active_users().await
        }
        async fn assign_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> StoreResult<()> {
            self.inner.assign_roles(user_id, role_ids).await
        }
        async fn create_role(&self, name: &str, description: &str) -> StoreResult<Role> {
            self.inner.create_role(name, description).await
        }
        async fn find_role_by_id(&self, id: Uuid) -> StoreResult<Role> {
            self.inner.find_role_by_id(id).await
        }
        async fn find_role_by_name(&self, name: &str) -> StoreResult<Role> {
            self.inner.find_role_by_name(name).await
        }
        async fn update_role(&self, id: Uuid, name: &str, description: &str) -> StoreResult<Role> {
            self.inner.update_role(id, name, description).await
        }
        async fn delete_role(&self, id: Uuid) -> StoreResult<()> {
            self.inner.delete_role(id).await
        }
        async fn list_roles(&self, page: PageQuery) -> StoreResult<Page<Role>> {
            self.inner.list_roles(page).await
        }
        async fn assign_permissions(&self, role_id: Uuid, codes: &[String]) -> StoreResult<()> {
            self.inner.assign_permissions(role_id, codes).await
        }
        async fn create_permission(&self, code: &str, name: &str, description: &str) -> StoreResult<Permission> {
            self.inner.create_permission(code, name, description).await
        }
        async fn find_permission_by_id(&self, id: Uuid) -> StoreResult<Permission> {
            let permission = self.inner.find_permission_by_id(id).await?;
            self.inner.assign_permissions(self.role_id, &[permission.code.clone()]).await?;
            Ok(permission)
        }
        async fn find_permission_by_code(&self, code: &str) -> StoreResult<Permission> {
            self.inner.find_permission_by_code(code).await
        }
        async fn update_permission(
            &self,
            id: Uuid,
            code: &str,
            name: &str,
            description: &str,
        ) -> StoreResult<Permission> {
            self.inner.update_permission(id, code, name, description).await
        }
        async fn delete_permission(&self, id: Uuid) -> StoreResult<()> {
            self.inner.delete_permission(id).await
        }
        async fn list_permissions(&self, page: PageQuery) -> StoreResult<Page<Permission>> {
            self.inner.list_permissions(page).await
        }
        async fn permission_in_use(&self, id: Uuid) -> StoreResult<bool> {
            self.inner.permission_in_use(id).await
        }
    }

    fn service() -> (Arc<InMemoryPrincipalStore>, PermissionService) {
        let store = Arc::new(InMemoryPrincipalStore::new());
        (store.clone(), PermissionService::new(store))
    }

    fn new_permission(code: &str) -> NewPermission {
        NewPermission { code: code.into(), name: code.into(), description: String::new() }
    }

    #[test]
    fn code_format() {
        assert!(validate_code("user:list").is_ok());
        assert!(validate_code("report_v2:export").is_ok());
        for bad in ["", "user", ":list", "user:", "User:List", "user list:x"] {
            assert!(validate_code(bad).is_err(), "{bad:?}");
        }
        let at_limit = format!("user:{}", "x".repeat(validation::PERMISSION_CODE_MAX_LEN - 5));
        assert!(validate_code(&at_limit).is_ok());
        assert!(validate_code(&format!("{at_limit}x")).is_err());
    }

    #[tokio::test]
    async fn name_and_description_fit_their_columns() {
        let (_, permissions) = service();
        let mut long_name = new_permission("audit:read");
        long_name.name = "n".repeat(validation::PERMISSION_NAME_MAX_LEN + 1);
        assert!(matches!(permissions.create(long_name).await, Err(AuthError::Validation(_))));

        let mut wordy = new_permission("audit:read");
        wordy.description = "d".repeat(validation::DESCRIPTION_MAX_LEN + 1);
        assert!(matches!(permissions.create(wordy).await, Err(AuthError::Validation(_))));

        let p = permissions.create(new_permission("audit:read")).await.unwrap();
        let update = UpdatePermissionRequest { name: Some("n".repeat(51)), ..Default::default() };
        assert!(matches!(permissions.update(p.id, update).await, Err(AuthError::Validation(_))));
        let update = UpdatePermissionRequest { description: Some("d".repeat(201)), ..Default::default() };
        assert!(matches!(permissions.update(p.id, update).await, Err(AuthError::Validation(_))));
    }

    #[tokio::test]
    async fn grant_landing_between_read_and_write_still_freezes_code() {
        let inner = Arc::new(InMemoryPrincipalStore::new());
        let p = inner.create_permission("audit:read", "Read audit", "").await.unwrap();
        let role = inner.create_role("auditor", "").await.unwrap();
        let store = Arc::new(GrantOnRead { inner: inner.clone(), role_id: role.id });
        let permissions = PermissionService::new(store);

        let result = permissions
            .update(p.id, UpdatePermissionRequest { code: Some("audit:view".into()), ..Default::default() })
            .await;
        assert!(matches!(result, Err(AuthError::Conflict(_))));

        let role = inner.find_role_by_id(role.id).await.unwrap();
        assert!(role.has_permission("audit:read"));
        assert_eq!(inner.find_permission_by_id(p.id).await.unwrap().code, "audit:read");
    }

    #[tokio::test]
    async fn duplicate_code_conflicts() {
        let (_, permissions) = service();
        permissions.create(new_permission("audit:read")).await.unwrap();
        assert!(matches!(
            permissions.create(new_permission("audit:read")).await,
            Err(AuthError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn code_is_frozen_once_assigned() {
        let (store, permissions) = service();
        let p = permissions.create(new_permission("audit:read")).await.unwrap();

        let renamed = permissions
            .update(p.id, UpdatePermissionRequest { code: Some("audit:view".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(renamed.code, "audit:view");

        let role = store.create_role("auditor", "").await.unwrap();
        store.assign_permissions(role.id, &["audit:view".to_string()]).await.unwrap();

        let frozen = permissions
            .update(p.id, UpdatePermissionRequest { code: Some("audit:read".into()), ..Default::default() })
            .await;
        assert!(matches!(frozen, Err(AuthError::Conflict(_))));

        let relabelled = permissions
            .update(p.id, UpdatePermissionRequest { name: Some("View audit log".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(relabelled.name, "View audit log");
        assert_eq!(relabelled.code, "audit:view");
    }

    #[tokio::test]
    async fn referenced_permission_cannot_be_deleted() {
        let (store, permissions) = service();
        let p = permissions.create(new_permission("audit:read")).await.unwrap();
        let role = store.create_role("auditor", "").await.unwrap();
        store.assign_permissions(role.id, &["audit:read".to_string()]).await.unwrap();

        assert!(matches!(permissions.delete(p.id).await, Err(AuthError::Conflict(_))));

        store.assign_permissions(role.id, &[]).await.unwrap();
        permissions.delete(p.id).await.unwrap();
        assert!(matches!(permissions.get(p.id).await, Err(AuthError::NotFound(_))));
    }
}
