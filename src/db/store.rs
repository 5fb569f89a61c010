use async_trait::async_trait;
use uuid::Uuid;

use super::StoreResult;
use crate::models::{
    permission::Permission,
    role::Role,
    user::{NewUser, User, UserUpdate},
    Page, PageQuery,
};

/// Persistence boundary for principals, roles and permissions.
///
/// Reads return `StoreError::NotFound` when the record is absent and
/// uniqueness violations surface as `StoreError::Conflict`. Principals are
/// always returned with their roles, and roles with their permissions.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn find_by_username(&self, username: &str) -> StoreResult<User>;
    async fn find_by_email(&self, email: &str) -> StoreResult<User>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<User>;
    async fn create(&self, user: NewUser) -> StoreResult<User>;
    /// Updates profile fields only. Never touches the password hash.
    async fn update(&self, id: Uuid, update: UserUpdate) -> StoreResult<User>;
    /// Replaces the stored hash. The caller hashes; the store only persists.
    async fn change_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()>;
    async fn list_users(&self, page: PageQuery) -> StoreResult<Page<User>>;
    async fn count_active_users(&self) -> StoreResult<u64>;
    /// Replaces the principal's role set.
    async fn assign_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> StoreResult<()>;

    async fn create_role(&self, name: &str, description: &str) -> StoreResult<Role>;
    async fn find_role_by_id(&self, id: Uuid) -> StoreResult<Role>;
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Role>;
    async fn update_role(&self, id: Uuid, name: &str, description: &str) -> StoreResult<Role>;
    async fn delete_role(&self, id: Uuid) -> StoreResult<()>;
    async fn list_roles(&self, page: PageQuery) -> StoreResult<Page<Role>>;
    /// Atomically clears the role's permissions and sets them to `codes`.
    /// An unknown code fails the whole call and leaves the role unchanged.
    async fn assign_permissions(&self, role_id: Uuid, codes: &[String]) -> StoreResult<()>;

    async fn create_permission(&self, code: &str, name: &str, description: &str) -> StoreResult<Permission>;
    async fn find_permission_by_id(&self, id: Uuid) -> StoreResult<Permission>;
    async fn find_permission_by_code(&self, code: &str) -> StoreResult<Permission>;
    /// Changing the code of a permission some role grants is a `Conflict`,
    /// decided in the same atomic step as the write.
    async fn update_permission(
        &self,
        id: Uuid,
        code: &str,
        name: &str,
        description: &str,
    ) -> StoreResult<Permission>;
    async fn delete_permission(&self, id: Uuid) -> StoreResult<()>;
    async fn list_permissions(&self, page: PageQuery) -> StoreResult<Page<Permission>>;
    /// Whether any role currently grants this permission.
    async fn permission_in_use(&self, id: Uuid) -> StoreResult<bool>;
}
