use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{store::PrincipalStore, StoreError, StoreResult};
use crate::models::{
    permission::Permission,
    role::Role,
    user::{NewUser, User, UserUpdate},
    Page, PageQuery,
};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, full_name, is_active, created_at, updated_at";
const PERMISSION_COLUMNS: &str = "id, code, name, description, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    full_name: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct RolePermissionRow {
    role_id: Uuid,
    #[sqlx(flatten)]
    permission: Permission,
}

#[derive(Debug, FromRow)]
struct UserRoleRow {
    user_id: Uuid,
    role_id: Uuid,
}

/// Postgres-backed principal store (schema in ./migrations).
#[derive(Clone)]
pub struct PgPrincipalStore {
    pool: PgPool,
}

impl PgPrincipalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Load roles by id, each with its permissions, ordered by name.
    async fn load_roles(&self, role_ids: &[Uuid]) -> StoreResult<Vec<Role>> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<RoleRow> = sqlx::query_as(
            "SELECT id, name, description, created_at, updated_at
             FROM roles WHERE id = ANY($1) ORDER BY name",
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await?;

        let links: Vec<RolePermissionRow> = sqlx::query_as(
            "SELECT rp.role_id, p.id, p.code, p.name, p.description, p.created_at, p.updated_at
             FROM role_permissions rp
             JOIN permissions p ON p.id = rp.permission_id
             WHERE rp.role_id = ANY($1)
             ORDER BY p.code",
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_role: HashMap<Uuid, Vec<Permission>> = HashMap::new();
        for link in links {
            by_role.entry(link.role_id).or_default().push(link.permission);
        }

        Ok(rows
            .into_iter()
            .map(|r| Role {
                permissions: by_role.remove(&r.id).unwrap_or_default(),
                id: r.id,
                name: r.name,
                description: r.description,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect())
    }

    async fn load_role(&self, id: Uuid) -> StoreResult<Role> {
        self.load_roles(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found("role"))
    }

    /// Attach roles (and their permissions) to a batch of user rows.
    async fn hydrate(&self, rows: Vec<UserRow>) -> StoreResult<Vec<User>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let user_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let links: Vec<UserRoleRow> =
            sqlx::query_as("SELECT user_id, role_id FROM user_roles WHERE user_id = ANY($1)")
                .bind(&user_ids)
                .fetch_all(&self.pool)
                .await?;

        let mut role_ids: Vec<Uuid> = links.iter().map(|l| l.role_id).collect();
        role_ids.sort();
        role_ids.dedup();
        let roles: HashMap<Uuid, Role> = self
            .load_roles(&role_ids)
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();

        let mut by_user: HashMap<Uuid, Vec<Role>> = HashMap::new();
        for link in links {
            if let Some(role) = roles.get(&link.role_id) {
                by_user.entry(link.user_id).or_default().push(role.clone());
            }
        }

        Ok(rows
            .into_iter()
            .map(|r| {
                let mut roles = by_user.remove(&r.id).unwrap_or_default();
                roles.sort_by(|a, b| a.name.cmp(&b.name));
                User {
                    id: r.id,
                    username: r.username,
                    email: r.email,
                    password_hash: r.password_hash,
                    full_name: r.full_name,
                    is_active: r.is_active,
                    roles,
                    created_at: r.created_at,
                    updated_at: r.updated_at,
                }
            })
            .collect())
    }

    async fn find_user_where(&self, column: &str, value: &str) -> StoreResult<User> {
        let row: UserRow = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {column} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("user"))?;
        self.hydrate(vec![row])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found("user"))
    }
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<User> {
        self.find_user_where("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<User> {
        self.find_user_where("email", email).await
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<User> {
        let row: UserRow = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("user"))?;
        self.hydrate(vec![row])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found("user"))
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (id, username, email, password_hash, full_name, is_active)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(user.is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            full_name: row.full_name,
            is_active: row.is_active,
            roles: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn update(&self, id: Uuid, update: UserUpdate) -> StoreResult<User> {
        let result = sqlx::query(
            "UPDATE users SET
                email      = COALESCE($2, email),
                full_name  = COALESCE($3, full_name),
                is_active  = COALESCE($4, is_active),
                updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(update.email)
        .bind(update.full_name)
        .bind(update.is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user"));
        }
        self.find_by_id(id).await
    }

    async fn change_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
                .bind(password_hash)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user"));
        }
        Ok(())
    }

    async fn list_users(&self, page: PageQuery) -> StoreResult<Page<User>> {
        let (_, size) = page.resolve();
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY username LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(size))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        let users = self.hydrate(rows).await?;
        Ok(Page::new(users, total.max(0) as u64, page))
    }

    async fn count_active_users(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active = TRUE")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn assign_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::not_found("user"));
        }

        let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM roles WHERE id = ANY($1)")
            .bind(role_ids)
            .fetch_all(&mut *tx)
            .await?;
        if let Some(missing) = role_ids.iter().find(|id| !found.contains(*id)) {
            return Err(StoreError::not_found(format!("role {missing}")));
        }

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id)
             SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn create_role(&self, name: &str, description: &str) -> StoreResult<Role> {
        let row: RoleRow = sqlx::query_as(
            "INSERT INTO roles (id, name, description) VALUES ($1, $2, $3)
             RETURNING id, name, description, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;

        Ok(Role {
            id: row.id,
            name: row.name,
            description: row.description,
            permissions: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn find_role_by_id(&self, id: Uuid) -> StoreResult<Role> {
        self.load_role(id).await
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Role> {
        let id: Uuid = sqlx::query_scalar("SELECT id FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("role"))?;
        self.load_role(id).await
    }

    async fn update_role(&self, id: Uuid, name: &str, description: &str) -> StoreResult<Role> {
        let result = sqlx::query(
            "UPDATE roles SET name = $2, description = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("role"));
        }
        self.load_role(id).await
    }

    async fn delete_role(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("role"));
        }
        Ok(())
    }

    async fn list_roles(&self, page: PageQuery) -> StoreResult<Page<Role>> {
        let (_, size) = page.resolve();
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles")
            .fetch_one(&self.pool)
            .await?;
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM roles ORDER BY name LIMIT $1 OFFSET $2")
                .bind(i64::from(size))
                .bind(page.offset() as i64)
                .fetch_all(&self.pool)
                .await?;
        let roles = self.load_roles(&ids).await?;
        Ok(Page::new(roles, total.max(0) as u64, page))
    }

    async fn assign_permissions(&self, role_id: Uuid, codes: &[String]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
            .bind(role_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::not_found("role"));
        }

        let found: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, code FROM permissions WHERE code = ANY($1) FOR SHARE")
                .bind(codes)
                .fetch_all(&mut *tx)
                .await?;
        if let Some(missing) = codes.iter().find(|c| !found.iter().any(|(_, code)| code == *c)) {
            return Err(StoreError::not_found(format!("permission '{missing}'")));
        }
        let permission_ids: Vec<Uuid> = found.into_iter().map(|(id, _)| id).collect();

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id)
             SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(&permission_ids)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE roles SET updated_at = NOW() WHERE id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn create_permission(&self, code: &str, name: &str, description: &str) -> StoreResult<Permission> {
        let permission = sqlx::query_as(&format!(
            "INSERT INTO permissions (id, code, name, description) VALUES ($1, $2, $3, $4)
             RETURNING {PERMISSION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(permission)
    }

    async fn find_permission_by_id(&self, id: Uuid) -> StoreResult<Permission> {
        sqlx::query_as(&format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("permission"))
    }

    async fn find_permission_by_code(&self, code: &str) -> StoreResult<Permission> {
        sqlx::query_as(&format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE code = $1"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("permission"))
    }

    async fn update_permission(
        &self,
        id: Uuid,
        code: &str,
        name: &str,
        description: &str,
    ) -> StoreResult<Permission> {
        let mut tx = self.pool.begin().await?;

        // Row lock conflicts with the FOR SHARE taken by assign_permissions.
        let current: Option<String> =
            sqlx::query_scalar("SELECT code FROM permissions WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or_else(|| StoreError::not_found("permission"))?;

        if current != code {
            let referenced: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM role_permissions WHERE permission_id = $1)",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            if referenced {
                return Err(StoreError::conflict(format!(
                    "permission '{current}' is assigned to a role; its code cannot change"
                )));
            }
        }

        let permission: Permission = sqlx::query_as(&format!(
            "UPDATE permissions SET code = $2, name = $3, description = $4, updated_at = NOW()
             WHERE id = $1
             RETURNING {PERMISSION_COLUMNS}"
        ))
        .bind(id)
        .bind(code)
        .bind(name)
        .bind(description)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(permission)
    }

    async fn delete_permission(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("permission"));
        }
        Ok(())
    }

    async fn list_permissions(&self, page: PageQuery) -> StoreResult<Page<Permission>> {
        let (_, size) = page.resolve();
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM permissions")
            .fetch_one(&self.pool)
            .await?;
        let items: Vec<Permission> = sqlx::query_as(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY code LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(size))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(items, total.max(0) as u64, page))
    }

    async fn permission_in_use(&self, id: Uuid) -> StoreResult<bool> {
        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM role_permissions WHERE permission_id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(in_use)
    }
}
