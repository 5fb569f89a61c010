use tracing::info;

use super::store::PrincipalStore;
use crate::{
    models::{user::NewUser, PageQuery},
    services::password,
};

const BASE_PERMISSIONS: &[(&str, &str, &str)] = &[
    ("user:list", "List users", "View the user list"),
    ("user:read", "Read user", "View user details"),
    ("user:create", "Create user", "Create new users"),
    ("user:update", "Update user", "Update user details and role assignments"),
    ("user:delete", "Delete user", "Deactivate users"),
    ("role:list", "List roles", "View the role list"),
    ("role:read", "Read role", "View role details"),
    ("role:create", "Create role", "Create new roles"),
    ("role:update", "Update role", "Update role details"),
    ("role:delete", "Delete role", "Delete roles"),
    ("role:assign", "Assign permissions", "Assign permissions to roles"),
    ("permission:list", "List permissions", "View the permission list"),
    ("permission:read", "Read permission", "View permission details"),
    ("permission:create", "Create permission", "Create new permissions"),
    ("permission:update", "Update permission", "Update permission details"),
    ("permission:delete", "Delete permission", "Delete unreferenced permissions"),
];

const USER_ROLE_PERMISSIONS: &[&str] = &["user:list", "user:read"];

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// Install the base permissions, the `admin` and `user` roles and the
/// bootstrap `admin` principal. Does nothing when any permission already
/// exists. Returns whether data was written.
pub async fn seed_base_data(
    store: &dyn PrincipalStore,
    bcrypt_cost: u32,
    admin_password: &str,
) -> anyhow::Result<bool> {
    let existing = store
        .list_permissions(PageQuery { page: Some(1), page_size: Some(1) })
        .await?;
    if existing.total > 0 {
        info!("Seed: {} permission(s) present, skipping", existing.total);
        return Ok(false);
    }

    for (code, name, description) in BASE_PERMISSIONS {
        store.create_permission(code, name, description).await?;
    }

    let admin_role = store.create_role("admin", "System administrator").await?;
    let all_codes: Vec<String> = BASE_PERMISSIONS.iter().map(|(code, _, _)| code.to_string()).collect();
    store.assign_permissions(admin_role.id, &all_codes).await?;

    let user_role = store.create_role("user", "Regular user").await?;
    let user_codes: Vec<String> = USER_ROLE_PERMISSIONS.iter().map(|c| c.to_string()).collect();
    store.assign_permissions(user_role.id, &user_codes).await?;

    let admin = store
        .create(NewUser {
            username: ADMIN_USERNAME.into(),
            email: ADMIN_EMAIL.into(),
            password_hash: password::hash_password(admin_password, bcrypt_cost)?,
            full_name: "System Administrator".into(),
            is_active: true,
        })
        .await?;
    store.assign_roles(admin.id, &[admin_role.id]).await?;

    info!(
        "Seed: created {} permissions, roles admin/user and principal '{}'",
        BASE_PERMISSIONS.len(),
        ADMIN_USERNAME
    );
    Ok(true)
}
