use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AuthResult,
    models::{
        auth::AuthenticatedUser,
        user::{AssignRolesRequest, CreateUserRequest, UserProfile, UserUpdate},
        Page, PageQuery,
    },
    AppState,
};

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> AuthResult<Json<Page<UserProfile>>> {
    state.guard.authorize(&user, "user:list")?;
    let users = state.users.list(page).await?;
    Ok(Json(users.map(UserProfile::from)))
}

/// Granting roles at creation is a role change and carries the same
/// live `admin` requirement as `assign_roles`.
pub async fn create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateUserRequest>,
) -> AuthResult<(StatusCode, Json<UserProfile>)> {
    state.guard.authorize(&user, "user:create")?;
    if !body.role_names.is_empty() {
        state.guard.authorize_role(&user, "admin").await?;
    }
    let created = state.users.create(body).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn get_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AuthResult<Json<UserProfile>> {
    state.guard.authorize(&user, "user:read")?;
    Ok(Json(state.users.get(id).await?.into()))
}

pub async fn update_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UserUpdate>,
) -> AuthResult<Json<UserProfile>> {
    state.guard.authorize(&user, "user:update")?;
    Ok(Json(state.users.update(id, body).await?.into()))
}

/// Soft delete: the account is deactivated, not removed.
pub async fn deactivate_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AuthResult<StatusCode> {
    state.guard.authorize(&user, "user:delete")?;
    state.users.deactivate(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Role changes need both the permission and live membership of `admin`.
pub async fn assign_roles(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<AssignRolesRequest>,
) -> AuthResult<Json<UserProfile>> {
    state.guard.authorize(&user, "user:update")?;
    state.guard.authorize_role(&user, "admin").await?;
    Ok(Json(state.users.assign_roles(id, &body.role_names).await?.into()))
}
