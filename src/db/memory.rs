use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{store::PrincipalStore, StoreError, StoreResult};
use crate::models::{
    permission::Permission,
    role::Role,
    user::{NewUser, User, UserUpdate},
    Page, PageQuery,
};

#[derive(Debug, Clone)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    full_name: String,
    is_active: bool,
    role_ids: BTreeSet<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RoleRecord {
    id: Uuid,
    name: String,
    description: String,
    permission_ids: BTreeSet<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<Uuid, UserRecord>,
    roles: HashMap<Uuid, RoleRecord>,
    permissions: HashMap<Uuid, Permission>,
}

impl Inner {
    fn role(&self, record: &RoleRecord) -> Role {
        let mut permissions: Vec<Permission> = record
            .permission_ids
            .iter()
            .filter_map(|id| self.permissions.get(id).cloned())
            .collect();
        permissions.sort_by(|a, b| a.code.cmp(&b.code));
        Role {
            id: record.id,
            name: record.name.clone(),
            description: record.description.clone(),
            permissions,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn user(&self, record: &UserRecord) -> User {
        let mut roles: Vec<Role> = record
            .role_ids
            .iter()
            .filter_map(|id| self.roles.get(id))
            .map(|r| self.role(r))
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        User {
            id: record.id,
            username: record.username.clone(),
            email: record.email.clone(),
            password_hash: record.password_hash.clone(),
            full_name: record.full_name.clone(),
            is_active: record.is_active,
            roles,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn role_name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.roles
            .values()
            .any(|r| r.name == name && Some(r.id) != except)
    }

    fn code_taken(&self, code: &str, except: Option<Uuid>) -> bool {
        self.permissions
            .values()
            .any(|p| p.code == code && Some(p.id) != except)
    }

    fn permission_referenced(&self, id: Uuid) -> bool {
        self.roles.values().any(|r| r.permission_ids.contains(&id))
    }
}

fn paginate<T>(mut items: Vec<T>, page: PageQuery) -> Page<T> {
    let total = items.len() as u64;
    let (_, size) = page.resolve();
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let items = if offset >= items.len() {
        Vec::new()
    } else {
        items.drain(offset..).take(size as usize).collect()
    };
    Page::new(items, total, page)
}

/// Process-local store used by tests and for running without Postgres.
#[derive(Debug, Default)]
pub struct InMemoryPrincipalStore {
    inner: RwLock<Inner>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<User> {
        let inner = self.inner.read().await;
        inner
            .users
            .values()
            .find(|u| u.username == username)
            .map(|u| inner.user(u))
            .ok_or_else(|| StoreError::not_found("user"))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<User> {
        let inner = self.inner.read().await;
        inner
            .users
            .values()
            .find(|u| u.email == email)
            .map(|u| inner.user(u))
            .ok_or_else(|| StoreError::not_found("user"))
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<User> {
        let inner = self.inner.read().await;
        inner
            .users
            .get(&id)
            .map(|u| inner.user(u))
            .ok_or_else(|| StoreError::not_found("user"))
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::conflict("username already exists"));
        }
        if inner.email_taken(&user.email, None) {
            return Err(StoreError::conflict("email already exists"));
        }
        let now = Utc::now();
        let record = UserRecord {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            is_active: user.is_active,
            role_ids: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };
        let created = inner.user(&record);
        inner.users.insert(record.id, record);
        Ok(created)
    }

    async fn update(&self, id: Uuid, update: UserUpdate) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        if let Some(email) = &update.email {
            if inner.email_taken(email, Some(id)) {
                return Err(StoreError::conflict("email already exists"));
            }
        }
        let record = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("user"))?;
        if let Some(email) = update.email {
            record.email = email;
        }
        if let Some(full_name) = update.full_name {
            record.full_name = full_name;
        }
        if let Some(is_active) = update.is_active {
            record.is_active = is_active;
        }
        record.updated_at = Utc::now();
        let record = record.clone();
        Ok(inner.user(&record))
    }

    async fn change_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("user"))?;
        record.password_hash = password_hash.to_string();
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn list_users(&self, page: PageQuery) -> StoreResult<Page<User>> {
        let inner = self.inner.read().await;
        let mut users: Vec<User> = inner.users.values().map(|u| inner.user(u)).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(paginate(users, page))
    }

    async fn count_active_users(&self) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().filter(|u| u.is_active).count() as u64)
    }

    async fn assign_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(missing) = role_ids.iter().find(|id| !inner.roles.contains_key(*id)) {
            return Err(StoreError::not_found(format!("role {missing}")));
        }
        let record = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::not_found("user"))?;
        record.role_ids = role_ids.iter().copied().collect();
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn create_role(&self, name: &str, description: &str) -> StoreResult<Role> {
        let mut inner = self.inner.write().await;
        if inner.role_name_taken(name, None) {
            return Err(StoreError::conflict("role name already exists"));
        }
        let now = Utc::now();
        let record = RoleRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            permission_ids: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };
        let role = inner.role(&record);
        inner.roles.insert(record.id, record);
        Ok(role)
    }

    async fn find_role_by_id(&self, id: Uuid) -> StoreResult<Role> {
        let inner = self.inner.read().await;
        inner
            .roles
            .get(&id)
            .map(|r| inner.role(r))
            .ok_or_else(|| StoreError::not_found("role"))
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Role> {
        let inner = self.inner.read().await;
        inner
            .roles
            .values()
            .find(|r| r.name == name)
            .map(|r| inner.role(r))
            .ok_or_else(|| StoreError::not_found("role"))
    }

    async fn update_role(&self, id: Uuid, name: &str, description: &str) -> StoreResult<Role> {
        let mut inner = self.inner.write().await;
        if inner.role_name_taken(name, Some(id)) {
            return Err(StoreError::conflict("role name already exists"));
        }
        let record = inner
            .roles
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("role"))?;
        record.name = name.to_string();
        record.description = description.to_string();
        record.updated_at = Utc::now();
        let record = record.clone();
        Ok(inner.role(&record))
    }

    async fn delete_role(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.roles.remove(&id).is_none() {
            return Err(StoreError::not_found("role"));
        }
        for user in inner.users.values_mut() {
            user.role_ids.remove(&id);
        }
        Ok(())
    }

    async fn list_roles(&self, page: PageQuery) -> StoreResult<Page<Role>> {
        let inner = self.inner.read().await;
        let mut roles: Vec<Role> = inner.roles.values().map(|r| inner.role(r)).collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paginate(roles, page))
    }

    async fn assign_permissions(&self, role_id: Uuid, codes: &[String]) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.roles.contains_key(&role_id) {
            return Err(StoreError::not_found("role"));
        }
        let mut ids = BTreeSet::new();
        for code in codes {
            let id = inner
                .permissions
                .values()
                .find(|p| &p.code == code)
                .map(|p| p.id)
                .ok_or_else(|| StoreError::not_found(format!("permission '{code}'")))?;
            ids.insert(id);
        }
        if let Some(record) = inner.roles.get_mut(&role_id) {
            record.permission_ids = ids;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_permission(&self, code: &str, name: &str, description: &str) -> StoreResult<Permission> {
        let mut inner = self.inner.write().await;
        if inner.code_taken(code, None) {
            return Err(StoreError::conflict("permission code already exists"));
        }
        let now = Utc::now();
        let permission = Permission {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn find_permission_by_id(&self, id: Uuid) -> StoreResult<Permission> {
        let inner = self.inner.read().await;
        inner
            .permissions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("permission"))
    }

    async fn find_permission_by_code(&self, code: &str) -> StoreResult<Permission> {
        let inner = self.inner.read().await;
        inner
            .permissions
            .values()
            .find(|p| p.code == code)
            .cloned()
            .ok_or_else(|| StoreError::not_found("permission"))
    }

    async fn update_permission(
        &self,
        id: Uuid,
        code: &str,
        name: &str,
        description: &str,
    ) -> StoreResult<Permission> {
        let mut inner = self.inner.write().await;
        if inner.code_taken(code, Some(id)) {
            return Err(StoreError::conflict("permission code already exists"));
        }
        let referenced = inner.permission_referenced(id);
        let permission = inner
            .permissions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("permission"))?;
        if permission.code != code && referenced {
            return Err(StoreError::conflict(format!(
                "permission '{}' is assigned to a role; its code cannot change",
                permission.code
            )));
        }
        permission.code = code.to_string();
        permission.name = name.to_string();
        permission.description = description.to_string();
        permission.updated_at = Utc::now();
        Ok(permission.clone())
    }

    async fn delete_permission(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.permission_referenced(id) {
            return Err(StoreError::conflict("record is still referenced"));
        }
        inner
            .permissions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("permission"))
    }

    async fn list_permissions(&self, page: PageQuery) -> StoreResult<Page<Permission>> {
        let inner = self.inner.read().await;
        let mut permissions: Vec<Permission> = inner.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(paginate(permissions, page))
    }

    async fn permission_in_use(&self, id: Uuid) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner.permission_referenced(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "$2b$04$hash".into(),
            full_name: username.into(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_username_and_email() {
        let store = InMemoryPrincipalStore::new();
        store.create(new_user("alice", "alice@example.com")).await.unwrap();

        let dup_name = store.create(new_user("alice", "other@example.com")).await;
        assert!(matches!(dup_name, Err(StoreError::Conflict(m)) if m.contains("username")));

        let dup_email = store.create(new_user("bob", "alice@example.com")).await;
        assert!(matches!(dup_email, Err(StoreError::Conflict(m)) if m.contains("email")));
    }

    #[tokio::test]
    async fn reads_report_not_found() {
        let store = InMemoryPrincipalStore::new();
        assert!(matches!(store.find_by_username("ghost").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.find_by_id(Uuid::new_v4()).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.find_role_by_name("ghost").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn assign_permissions_is_all_or_nothing() {
        let store = InMemoryPrincipalStore::new();
        store.create_permission("user:list", "List users", "").await.unwrap();
        let role = store.create_role("viewer", "").await.unwrap();
        store
            .assign_permissions(role.id, &["user:list".to_string()])
            .await
            .unwrap();

        let result = store
            .assign_permissions(role.id, &["user:list".to_string(), "nope".to_string()])
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));

        let role = store.find_role_by_id(role.id).await.unwrap();
        assert!(role.has_permission("user:list"));
    }

    #[tokio::test]
    async fn referenced_permission_cannot_be_deleted() {
        let store = InMemoryPrincipalStore::new();
        let perm = store.create_permission("role:list", "List roles", "").await.unwrap();
        let role = store.create_role("auditor", "").await.unwrap();
        store
            .assign_permissions(role.id, &["role:list".to_string()])
            .await
            .unwrap();

        assert!(store.permission_in_use(perm.id).await.unwrap());
        assert!(matches!(store.delete_permission(perm.id).await, Err(StoreError::Conflict(_))));

        store.assign_permissions(role.id, &[]).await.unwrap();
        store.delete_permission(perm.id).await.unwrap();
    }

    #[tokio::test]
    async fn referenced_code_is_frozen_under_the_write_lock() {
        let store = InMemoryPrincipalStore::new();
        let perm = store.create_permission("audit:read", "Read audit", "").await.unwrap();
        let role = store.create_role("auditor", "").await.unwrap();
        store
            .assign_permissions(role.id, &["audit:read".to_string()])
            .await
            .unwrap();

        assert!(matches!(
            store.update_permission(perm.id, "audit:view", "Read audit", "").await,
            Err(StoreError::Conflict(_))
        ));
        let relabelled = store
            .update_permission(perm.id, "audit:read", "Audit reader", "")
            .await
            .unwrap();
        assert_eq!(relabelled.name, "Audit reader");
        assert!(store.find_role_by_id(role.id).await.unwrap().has_permission("audit:read"));
    }

    #[tokio::test]
    async fn deleting_role_detaches_it_from_users() {
        let store = InMemoryPrincipalStore::new();
        let user = store.create(new_user("carol", "carol@example.com")).await.unwrap();
        let role = store.create_role("editor", "").await.unwrap();
        store.assign_roles(user.id, &[role.id]).await.unwrap();
        assert_eq!(store.find_by_id(user.id).await.unwrap().roles.len(), 1);

        store.delete_role(role.id).await.unwrap();
        assert!(store.find_by_id(user.id).await.unwrap().roles.is_empty());
    }

    #[tokio::test]
    async fn list_users_paginates_in_username_order() {
        let store = InMemoryPrincipalStore::new();
        for name in ["dave", "bob", "carl"] {
            store
                .create(new_user(name, &format!("{name}@example.com")))
                .await
                .unwrap();
        }
        let page = store
            .list_users(PageQuery { page: Some(2), page_size: Some(2) })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].username, "dave");
    }
}
