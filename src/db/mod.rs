pub mod memory;
pub mod postgres;
pub mod seed;
pub mod store;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

pub use memory::InMemoryPrincipalStore;
pub use postgres::PgPrincipalStore;
pub use store::PrincipalStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        StoreError::Conflict(what.into())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if matches!(e, sqlx::Error::RowNotFound) {
            return StoreError::not_found("record");
        }
        if let Some(db) = e.as_database_error() {
            if db.is_unique_violation() {
                let message = match db.constraint() {
                    Some("users_username_key") => "username already exists",
                    Some("users_email_key") => "email already exists",
                    Some("roles_name_key") => "role name already exists",
                    Some("permissions_code_key") => "permission code already exists",
                    _ => "duplicate record",
                };
                return StoreError::conflict(message);
            }
            if db.is_foreign_key_violation() {
                return StoreError::conflict("record is still referenced");
            }
        }
        StoreError::Backend(e.into())
    }
}

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the migrations embedded from ./migrations/
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
