use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    db::PrincipalStore,
    error::{AuthError, AuthResult},
    models::{
        role::{NewRole, Role, UpdateRoleRequest},
        Page, PageQuery,
    },
    services::validation,
};

pub struct RoleService {
    store: Arc<dyn PrincipalStore>,
}

impl RoleService {
    pub fn new(store: Arc<dyn PrincipalStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, req: NewRole) -> AuthResult<Role> {
        let name = required_name(&req.name)?;
        let description = req.description.trim();
        validation::description(description)?;
        let role = self.store.create_role(name, description).await?;
        info!("Role '{}' created ({})", role.name, role.id);
        Ok(role)
    }

    pub async fn get(&self, id: Uuid) -> AuthResult<Role> {
        Ok(self.store.find_role_by_id(id).await?)
    }

    pub async fn list(&self, page: PageQuery) -> AuthResult<Page<Role>> {
        Ok(self.store.list_roles(page).await?)
    }

    pub async fn update(&self, id: Uuid, req: UpdateRoleRequest) -> AuthResult<Role> {
        let current = self.store.find_role_by_id(id).await?;
        let name = match req.name.as_deref() {
            Some(name) => required_name(name)?,
            None => current.name.as_str(),
        };
        let description = req.description.as_deref().map(str::trim).unwrap_or(&current.description);
        validation::description(description)?;
        Ok(self.store.update_role(id, name, description).await?)
    }

    /// Holders of the role lose it; their permissions shrink on next refresh.
    pub async fn delete(&self, id: Uuid) -> AuthResult<()> {
        self.store.delete_role(id).await?;
        info!("Role {} deleted", id);
        Ok(())
    }

    /// Replace the role's permission set. An empty list clears it.
    pub async fn assign_permissions(&self, id: Uuid, codes: Vec<String>) -> AuthResult<Role> {
        let mut codes: Vec<String> = codes.into_iter().map(|c| c.trim().to_string()).collect();
        codes.sort();
        codes.dedup();

        self.store.assign_permissions(id, &codes).await?;
        info!("Role {} now grants {} permission(s)", id, codes.len());
        Ok(self.store.find_role_by_id(id).await?)
    }
}

fn required_name(name: &str) -> AuthResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::Validation("role name is required".into()));
    }
    validation::max_len("role name", name, validation::ROLE_NAME_MAX_LEN)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryPrincipalStore;

    fn service() -> (Arc<InMemoryPrincipalStore>, RoleService) {
        let store = Arc::new(InMemoryPrincipalStore::new());
        (store.clone(), RoleService::new(store))
    }

    fn new_role(name: &str) -> NewRole {
        NewRole { name: name.into(), description: String::new() }
    }

    #[tokio::test]
    async fn duplicate_role_name_conflicts() {
        let (_, roles) = service();
        roles.create(new_role("editor")).await.unwrap();
        assert!(matches!(roles.create(new_role("editor")).await, Err(AuthError::Conflict(_))));
        assert!(matches!(roles.create(new_role("  ")).await, Err(AuthError::Validation(_))));
    }

    #[tokio::test]
    async fn name_and_description_fit_their_columns() {
        let (_, roles) = service();
        let long_name = new_role(&"r".repeat(validation::ROLE_NAME_MAX_LEN + 1));
        assert!(matches!(roles.create(long_name).await, Err(AuthError::Validation(m)) if m.contains("role name")));

        let wordy = NewRole { name: "editor".into(), description: "d".repeat(201) };
        assert!(matches!(roles.create(wordy).await, Err(AuthError::Validation(_))));

        let role = roles.create(new_role(&"r".repeat(validation::ROLE_NAME_MAX_LEN))).await.unwrap();
        let too_long = UpdateRoleRequest { name: Some("s".repeat(51)), description: None };
        assert!(matches!(roles.update(role.id, too_long).await, Err(AuthError::Validation(_))));
        let wordy = UpdateRoleRequest { name: None, description: Some("d".repeat(201)) };
        assert!(matches!(roles.update(role.id, wordy).await, Err(AuthError::Validation(_))));
    }

    #[tokio::test]
    async fn update_keeps_unset_fields() {
        let (_, roles) = service();
        let role = roles
            .create(NewRole { name: "editor".into(), description: "Edits".into() })
            .await
            .unwrap();
        let updated = roles
            .update(role.id, UpdateRoleRequest { name: Some("writer".into()), description: None })
            .await
            .unwrap();
        assert_eq!(updated.name, "writer");
        assert_eq!(updated.description, "Edits");
    }

    #[tokio::test]
    async fn empty_assignment_clears_role() {
        let (store, roles) = service();
        store.create_permission("user:list", "List users", "").await.unwrap();
        let role = roles.create(new_role("viewer")).await.unwrap();

        let granted = roles
            .assign_permissions(role.id, vec!["user:list".into(), "user:list".into()])
            .await
            .unwrap();
        assert_eq!(granted.permissions.len(), 1);

        let cleared = roles.assign_permissions(role.id, Vec::new()).await.unwrap();
        assert!(cleared.permissions.is_empty());
    }

    #[tokio::test]
    async fn unknown_code_leaves_role_unchanged() {
        let (store, roles) = service();
        store.create_permission("user:list", "List users", "").await.unwrap();
        let role = roles.create(new_role("viewer")).await.unwrap();
        roles.assign_permissions(role.id, vec!["user:list".into()]).await.unwrap();

        let result = roles
            .assign_permissions(role.id, vec!["user:read".into(), "user:list".into()])
            .await;
        assert!(matches!(result, Err(AuthError::NotFound(_))));
        assert_eq!(roles.get(role.id).await.unwrap().permissions.len(), 1);
    }
}
