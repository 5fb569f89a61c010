//! Operator tool for bootstrapping and maintaining principals.
//!
//! Usage:
//!   authgate-admin seed
//!   authgate-admin create-user --username bob --email bob@example.com --password ... [--role admin]
//!   authgate-admin hash-password <SECRET>
//!
//! Environment variables:
//!   DATABASE_URL         PostgreSQL connection string (required except for hash-password)
//!   BCRYPT_COST          Hash work factor (default: 12)
//!   SEED_ADMIN_PASSWORD  Secret of the seeded admin (default: password)

use std::{env, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use authgate_api::{
    db::{self, seed, PgPrincipalStore},
    models::user::CreateUserRequest,
    services::{password, users::UserService},
};

#[derive(Parser)]
#[command(name = "authgate-admin", about = "Administer authgate principals and seed data")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install base permissions, roles and the admin principal if absent
    Seed,
    /// Create an active principal, optionally holding roles
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        full_name: String,
        /// Role name to grant (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Print a bcrypt hash for a secret
    HashPassword { secret: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let cost: u32 = env::var("BCRYPT_COST")
        .unwrap_or_else(|_| bcrypt::DEFAULT_COST.to_string())
        .parse()
        .context("BCRYPT_COST must be an integer")?;

    if let Command::HashPassword { secret } = &args.command {
        println!("{}", password::hash_password(secret, cost)?);
        return Ok(());
    }

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL required")?;
    let pool = db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool).await?;
    let store = Arc::new(PgPrincipalStore::new(pool));

    match args.command {
        Command::Seed => {
            let admin_password =
                env::var("SEED_ADMIN_PASSWORD").unwrap_or_else(|_| "password".to_string());
            if seed::seed_base_data(store.as_ref(), cost, &admin_password).await? {
                tracing::info!("Seed data installed");
            } else {
                tracing::info!("Seed data already present, nothing to do");
            }
        }
        Command::CreateUser { username, email, password, full_name, roles } => {
            let user = UserService::new(store, cost)
                .create(CreateUserRequest { username, email, password, full_name, role_names: roles })
                .await
                .context("Failed to create principal")?;
            tracing::info!("Principal {} ({}) ready", user.username, user.id);
        }
        Command::HashPassword { .. } => {}
    }

    Ok(())
}
