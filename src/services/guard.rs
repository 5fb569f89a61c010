use std::sync::Arc;

use tracing::debug;

use crate::{
    db::{PrincipalStore, StoreError},
    error::{AuthError, AuthResult},
    models::auth::AuthenticatedUser,
    services::{
        auth::AuthService,
        metrics::{AUTHORIZATION_DENIALS_COUNTER, TOKEN_REJECTIONS_COUNTER},
        resolver,
    },
};

/// Request gate: bearer authentication, then permission or live-role checks.
pub struct AccessGuard {
    auth: Arc<AuthService>,
    store: Arc<dyn PrincipalStore>,
}

impl AccessGuard {
    pub fn new(auth: Arc<AuthService>, store: Arc<dyn PrincipalStore>) -> Self {
        Self { auth, store }
    }

    /// Resolve an `Authorization` header value into the calling principal.
    /// Every failure collapses to `Unauthenticated`.
    pub fn authenticate(&self, authorization: Option<&str>) -> AuthResult<AuthenticatedUser> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthenticated)?;

        match self.auth.validate_access(token) {
            Ok(claims) => Ok(claims.into()),
            Err(e) => {
                let reason = match &e {
                    AuthError::Token(kind) => kind.as_str(),
                    AuthError::WrongTokenKind => "wrong_kind",
                    _ => "other",
                };
                TOKEN_REJECTIONS_COUNTER.with_label_values(&[reason]).inc();
                debug!("Bearer token rejected: {}", e);
                Err(AuthError::Unauthenticated)
            }
        }
    }

    /// Check the permission snapshot embedded in the caller's token.
    pub fn authorize(&self, user: &AuthenticatedUser, code: &str) -> AuthResult<()> {
        if user.has_permission(code) {
            Ok(())
        } else {
            AUTHORIZATION_DENIALS_COUNTER.with_label_values(&[code]).inc();
            Err(AuthError::Forbidden(code.to_string()))
        }
    }

    /// Check role membership against the store rather than the token.
    pub async fn authorize_role(&self, user: &AuthenticatedUser, role: &str) -> AuthResult<()> {
        let live = match self.store.find_by_id(user.user_id).await {
            Ok(live) => live,
            Err(StoreError::NotFound(_)) => return Err(AuthError::MissingRole(role.to_string())),
            Err(e) => return Err(e.into()),
        };
        if live.is_active && resolver::has_role(&live, role) {
            Ok(())
        } else {
            Err(AuthError::MissingRole(role.to_string()))
        }
    }
}
