//! Input checks shared by the services. Limits mirror the column widths in
//! the init migration so both stores reject the same input.

use crate::error::{AuthError, AuthResult};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const EMAIL_MAX_LEN: usize = 100;
pub const FULL_NAME_MAX_LEN: usize = 100;
pub const ROLE_NAME_MAX_LEN: usize = 50;
pub const PERMISSION_CODE_MAX_LEN: usize = 50;
pub const PERMISSION_NAME_MAX_LEN: usize = 50;
pub const DESCRIPTION_MAX_LEN: usize = 200;

/// Fails when `value` is longer than `max` characters.
pub fn max_len(field: &str, value: &str, max: usize) -> AuthResult<()> {
    if value.chars().count() > max {
        return Err(AuthError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub fn username(value: &str) -> AuthResult<()> {
    let len = value.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AuthError::Validation(format!(
            "username must be {USERNAME_MIN_LEN} to {USERNAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

/// A non-empty local part and a dotted domain, within the column width.
pub fn email(value: &str) -> AuthResult<()> {
    let well_formed = value
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed || value.chars().any(char::is_whitespace) {
        return Err(AuthError::Validation("email is not valid".into()));
    }
    max_len("email", value, EMAIL_MAX_LEN)
}

pub fn full_name(value: &str) -> AuthResult<()> {
    max_len("full_name", value, FULL_NAME_MAX_LEN)
}

pub fn description(value: &str) -> AuthResult<()> {
    max_len("description", value, DESCRIPTION_MAX_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(email("a@example.com").is_ok());
        for bad in ["", "nope", "@example.com", "a@localhost", "a b@example.com"] {
            assert!(email(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn email_respects_column_width() {
        let domain = "@example.com";
        let fits = format!("{}{domain}", "a".repeat(EMAIL_MAX_LEN - domain.len()));
        let over = format!("{}{domain}", "a".repeat(EMAIL_MAX_LEN - domain.len() + 1));
        assert!(email(&fits).is_ok());
        assert!(matches!(email(&over), Err(AuthError::Validation(m)) if m.contains("100")));
    }

    #[test]
    fn username_bounds() {
        assert!(username("abc").is_ok());
        assert!(username(&"u".repeat(USERNAME_MAX_LEN)).is_ok());
        assert!(username("ab").is_err());
        assert!(username(&"u".repeat(USERNAME_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        let accented = "é".repeat(FULL_NAME_MAX_LEN);
        assert!(accented.len() > FULL_NAME_MAX_LEN);
        assert!(full_name(&accented).is_ok());
        assert!(full_name(&format!("{accented}é")).is_err());
        assert!(description(&"d".repeat(DESCRIPTION_MAX_LEN)).is_ok());
        assert!(description(&"d".repeat(DESCRIPTION_MAX_LEN + 1)).is_err());
    }
}
