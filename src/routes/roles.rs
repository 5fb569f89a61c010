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
        role::{AssignPermissionsRequest, NewRole, Role, UpdateRoleRequest},
        Page, PageQuery,
    },
    AppState,
};

pub async fn list_roles(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> AuthResult<Json<Page<Role>>> {
    state.guard.authorize(&user, "role:list")?;
    Ok(Json(state.roles.list(page).await?))
}

pub async fn create_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<NewRole>,
) -> AuthResult<(StatusCode, Json<Role>)> {
    state.guard.authorize(&user, "role:create")?;
    let role = state.roles.create(body).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn get_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AuthResult<Json<Role>> {
    state.guard.authorize(&user, "role:read")?;
    Ok(Json(state.roles.get(id).await?))
}

pub async fn update_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateRoleRequest>,
) -> AuthResult<Json<Role>> {
    state.guard.authorize(&user, "role:update")?;
    Ok(Json(state.roles.update(id, body).await?))
}

pub async fn delete_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AuthResult<StatusCode> {
    state.guard.authorize(&user, "role:delete")?;
    state.roles.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replaces the role's permissions; `[]` clears them.
pub async fn assign_permissions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<AssignPermissionsRequest>,
) -> AuthResult<Json<Role>> {
    state.guard.authorize(&user, "role:assign")?;
    Ok(Json(state.roles.assign_permissions(id, body.permission_codes).await?))
}
