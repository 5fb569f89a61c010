//! Flattens a principal's roles into its effective permission codes.

use std::collections::BTreeSet;

use crate::models::user::User;

/// Union of the permission codes of every role the user holds.
/// Codes granted by more than one role collapse silently.
pub fn resolve(user: &User) -> BTreeSet<String> {
    user.roles
        .iter()
        .flat_map(|role| role.permissions.iter())
        .map(|p| p.code.clone())
        .collect()
}

pub fn has_permission(user: &User, code: &str) -> bool {
    user.roles.iter().any(|role| role.has_permission(code))
}

pub fn has_role(user: &User, role_name: &str) -> bool {
    user.roles.iter().any(|role| role.name == role_name)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::{permission::Permission, role::Role};

    fn permission(code: &str) -> Permission {
        Permission {
            id: Uuid::new_v4(),
            code: code.into(),
            name: code.into(),
            description: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn role(name: &str, codes: &[&str]) -> Role {
        Role {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            permissions: codes.iter().map(|c| permission(c)).collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn user_with(roles: Vec<Role>) -> User {
        User {
            id: Uuid::new_v4(),
            username: "u".into(),
            email: "u@example.com".into(),
            password_hash: String::new(),
            full_name: String::new(),
            is_active: true,
            roles,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_codes_across_roles_collapse() {
        let user = user_with(vec![
            role("admin", &["user:list", "user:read"]),
            role("user", &["user:list"]),
        ]);
        let resolved = resolve(&user);
        assert_eq!(
            resolved.into_iter().collect::<Vec<_>>(),
            vec!["user:list".to_string(), "user:read".to_string()]
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        let user = user_with(vec![role("ops", &["role:list", "permission:list"])]);
        assert_eq!(resolve(&user), resolve(&user));
    }

    #[test]
    fn no_roles_means_no_permissions() {
        assert!(resolve(&user_with(Vec::new())).is_empty());
    }

    #[test]
    fn live_checks() {
        let user = user_with(vec![role("auditor", &["role:read"])]);
        assert!(has_permission(&user, "role:read"));
        assert!(!has_permission(&user, "role:delete"));
        assert!(has_role(&user, "auditor"));
        assert!(!has_role(&user, "admin"));
    }
}
