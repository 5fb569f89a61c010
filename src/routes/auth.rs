use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AuthResult,
    models::{
        auth::{AuthenticatedUser, TokenPair},
        user::{ChangePasswordRequest, LoginRequest, RefreshTokenRequest, RegisterRequest, UserProfile},
    },
    AppState,
};

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AuthResult<(StatusCode, Json<UserProfile>)> {
    let user = state.auth.register(body).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AuthResult<Json<TokenPair>> {
    Ok(Json(state.auth.login(&body.username, &body.password).await?))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> AuthResult<Json<TokenPair>> {
    Ok(Json(state.auth.refresh(&body.refresh_token).await?))
}

/// Live profile, including the permissions the principal would receive now.
pub async fn profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AuthResult<Json<UserProfile>> {
    let current = state.auth.profile(user.user_id).await?;
    Ok(Json(current.into()))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> AuthResult<StatusCode> {
    state
        .auth
        .change_password(user.user_id, &body.current_password, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
