use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use authgate_api::{
    app::{router, AppState},
    config::Config,
    db::{self, seed, PgPrincipalStore, PrincipalStore},
    services::metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let store: Arc<dyn PrincipalStore> = Arc::new(PgPrincipalStore::new(pool));
    if seed::seed_base_data(store.as_ref(), config.bcrypt_cost, &config.seed_admin_password).await? {
        info!("Base permissions, roles and admin principal seeded");
    }

    metrics::start(store.clone());

    let app = router(AppState::new(store, &config)?);

    let addr = format!("{}:{}", config.host, config.port);
    info!("authgate API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
