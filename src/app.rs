use std::sync::Arc;

use axum::{
    http::{header, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowHeaders, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::Config,
    db::PrincipalStore,
    routes,
    services::{
        auth::AuthService, guard::AccessGuard, permissions::PermissionService, roles::RoleService,
        users::UserService,
    },
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PrincipalStore>,
    pub auth: Arc<AuthService>,
    pub guard: Arc<AccessGuard>,
    pub roles: Arc<RoleService>,
    pub permissions: Arc<PermissionService>,
    pub users: Arc<UserService>,
}

impl AppState {
    pub fn new(store: Arc<dyn PrincipalStore>, config: &Config) -> anyhow::Result<Self> {
        let auth = Arc::new(AuthService::from_config(store.clone(), config)?);

        Ok(Self {
            guard: Arc::new(AccessGuard::new(auth.clone(), store.clone())),
            roles: Arc::new(RoleService::new(store.clone())),
            permissions: Arc::new(PermissionService::new(store.clone())),
            users: Arc::new(UserService::new(store.clone(), config.bcrypt_cost)),
            auth,
            store,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Auth
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh_token))
        .route("/auth/profile", get(routes::auth::profile))
        .route("/auth/change-password", post(routes::auth::change_password))
        // Users
        .route("/users", get(routes::users::list_users).post(routes::users::create_user))
        .route(
            "/users/{id}",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::deactivate_user),
        )
        .route("/users/{id}/roles", put(routes::users::assign_roles))
        // Roles
        .route("/roles", get(routes::roles::list_roles).post(routes::roles::create_role))
        .route(
            "/roles/{id}",
            get(routes::roles::get_role)
                .put(routes::roles::update_role)
                .delete(routes::roles::delete_role),
        )
        .route("/roles/{id}/permissions", post(routes::roles::assign_permissions))
        // Permissions
        .route(
            "/permissions",
            get(routes::permissions::list_permissions).post(routes::permissions::create_permission),
        )
        .route(
            "/permissions/{id}",
            get(routes::permissions::get_permission)
                .put(routes::permissions::update_permission)
                .delete(routes::permissions::delete_permission),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
