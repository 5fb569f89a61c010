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
        permission::{NewPermission, Permission, UpdatePermissionRequest},
        Page, PageQuery,
    },
    AppState,
};

pub async fn list_permissions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> AuthResult<Json<Page<Permission>>> {
    state.guard.authorize(&user, "permission:list")?;
    Ok(Json(state.permissions.list(page).await?))
}

pub async fn create_permission(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<NewPermission>,
) -> AuthResult<(StatusCode, Json<Permission>)> {
    state.guard.authorize(&user, "permission:create")?;
    let permission = state.permissions.create(body).await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

pub async fn get_permission(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AuthResult<Json<Permission>> {
    state.guard.authorize(&user, "permission:read")?;
    Ok(Json(state.permissions.get(id).await?))
}

pub async fn update_permission(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdatePermissionRequest>,
) -> AuthResult<Json<Permission>> {
    state.guard.authorize(&user, "permission:update")?;
    Ok(Json(state.permissions.update(id, body).await?))
}

pub async fn delete_permission(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AuthResult<StatusCode> {
    state.guard.authorize(&user, "permission:delete")?;
    state.permissions.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
