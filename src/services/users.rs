use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    db::{PrincipalStore, StoreError},
    error::{AuthError, AuthResult},
    models::{
        user::{CreateUserRequest, NewUser, User, UserUpdate},
        Page, PageQuery,
    },
    services::{auth::MIN_PASSWORD_LEN, password, validation},
};

pub struct UserService {
    store: Arc<dyn PrincipalStore>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(store: Arc<dyn PrincipalStore>, bcrypt_cost: u32) -> Self {
        Self { store, bcrypt_cost }
    }

    /// Create an active principal holding `role_names`. Every role is looked
    /// up before the principal is written; an empty full name defaults to the
    /// username.
    pub async fn create(&self, req: CreateUserRequest) -> AuthResult<User> {
        let username = req.username.trim();
        let email = req.email.trim();
        validation::username(username)?;
        validation::email(email)?;
        if req.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let full_name = match req.full_name.trim() {
            "" => username,
            name => name,
        };
        validation::full_name(full_name)?;

        let role_ids = self.role_ids(&req.role_names).await?;
        let user = self
            .store
            .create(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash: password::hash_password(&req.password, self.bcrypt_cost)?,
                full_name: full_name.to_string(),
                is_active: true,
            })
            .await?;
        if role_ids.is_empty() {
            info!("Created principal {} ({})", user.username, user.id);
            return Ok(user);
        }

        self.store.assign_roles(user.id, &role_ids).await?;
        info!("Created principal {} ({}) with {} role(s)", user.username, user.id, role_ids.len());
        Ok(self.store.find_by_id(user.id).await?)
    }

    pub async fn get(&self, id: Uuid) -> AuthResult<User> {
        Ok(self.store.find_by_id(id).await?)
    }

    pub async fn list(&self, page: PageQuery) -> AuthResult<Page<User>> {
        Ok(self.store.list_users(page).await?)
    }

    pub async fn update(&self, id: Uuid, mut update: UserUpdate) -> AuthResult<User> {
        if let Some(email) = update.email.as_mut() {
            *email = email.trim().to_string();
            validation::email(email)?;
        }
        if let Some(full_name) = update.full_name.as_mut() {
            *full_name = full_name.trim().to_string();
            validation::full_name(full_name)?;
        }
        Ok(self.store.update(id, update).await?)
    }

    /// Soft delete. The principal keeps its roles but can no longer log in
    /// or refresh; outstanding access tokens run to expiry.
    pub async fn deactivate(&self, id: Uuid) -> AuthResult<()> {
        self.store
            .update(id, UserUpdate { is_active: Some(false), ..Default::default() })
            .await?;
        info!("Principal {} deactivated", id);
        Ok(())
    }

    /// Replace the principal's roles by name. Unknown names fail the call
    /// before anything is written.
    pub async fn assign_roles(&self, id: Uuid, role_names: &[String]) -> AuthResult<User> {
        self.store.find_by_id(id).await?;
        let role_ids = self.role_ids(role_names).await?;

        self.store.assign_roles(id, &role_ids).await?;
        info!("Principal {} now holds {} role(s)", id, role_ids.len());
        Ok(self.store.find_by_id(id).await?)
    }

    async fn role_ids(&self, role_names: &[String]) -> AuthResult<Vec<Uuid>> {
        let mut role_ids = Vec::with_capacity(role_names.len());
        for name in role_names {
            let role = match self.store.find_role_by_name(name.trim()).await {
                Ok(role) => role,
                Err(StoreError::NotFound(_)) => return Err(AuthError::NotFound(format!("role '{name}'"))),
                Err(e) => return Err(e.into()),
            };
            if !role_ids.contains(&role.id) {
                role_ids.push(role.id);
            }
        }
        Ok(role_ids)
    }
}
