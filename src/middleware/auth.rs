use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::{error::AuthError, models::auth::AuthenticatedUser, AppState};

/// Handlers taking an `AuthenticatedUser` only run for a valid access token.
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        state.guard.authenticate(authorization)
    }
}
