use std::env;

const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;
/// One year. Larger lifetimes overflow timestamp arithmetic.
const MAX_TOKEN_LIFETIME_MINUTES: u64 = 525_600;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_access_expire_minutes: u64,
    pub jwt_refresh_expire_minutes: u64,
    /// Clock-skew allowance applied to `nbf` and `exp` on decode.
    pub jwt_leeway_seconds: u64,
    pub bcrypt_cost: u32,
    pub seed_admin_password: String,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "authgate".into()),
            jwt_access_expire_minutes: env::var("JWT_ACCESS_EXPIRE_MINUTES")
                .unwrap_or_else(|_| "15".into())
                .parse()?,
            jwt_refresh_expire_minutes: env::var("JWT_REFRESH_EXPIRE_MINUTES")
                .unwrap_or_else(|_| "10080".into())
                .parse()?,
            jwt_leeway_seconds: env::var("JWT_LEEWAY_SECONDS")
                .unwrap_or_else(|_| "0".into())
                .parse()?,
            bcrypt_cost: env::var("BCRYPT_COST")
                .unwrap_or_else(|_| bcrypt::DEFAULT_COST.to_string())
                .parse()?,
            seed_admin_password: env::var("SEED_ADMIN_PASSWORD")
                .unwrap_or_else(|_| "password".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.jwt_secret.is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }
        if self.jwt_access_expire_minutes == 0 || self.jwt_refresh_expire_minutes == 0 {
            anyhow::bail!("token lifetimes must be at least one minute");
        }
        if self.jwt_access_expire_minutes > MAX_TOKEN_LIFETIME_MINUTES
            || self.jwt_refresh_expire_minutes > MAX_TOKEN_LIFETIME_MINUTES
        {
            anyhow::bail!("token lifetimes must not exceed {} minutes", MAX_TOKEN_LIFETIME_MINUTES);
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.bcrypt_cost) {
            anyhow::bail!(
                "BCRYPT_COST must be between {} and {}",
                MIN_BCRYPT_COST,
                MAX_BCRYPT_COST
            );
        }
        Ok(())
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
