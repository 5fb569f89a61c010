use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    db::{PrincipalStore, StoreError, StoreResult},
    error::{AuthError, AuthResult},
    models::{
        auth::{TokenClaims, TokenKind, TokenPair},
        user::{NewUser, RegisterRequest, User},
    },
    services::{
        metrics::{LOGINS_COUNTER, REFRESHES_COUNTER, REGISTRATIONS_COUNTER},
        password, resolver,
        tokens::TokenCodec,
        validation,
    },
};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Issues, validates and rotates token pairs for principals held in the store.
pub struct AuthService {
    store: Arc<dyn PrincipalStore>,
    codec: TokenCodec,
    access_ttl: Duration,
    refresh_ttl: Duration,
    bcrypt_cost: u32,
    dummy_hash: String,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn PrincipalStore>,
        codec: TokenCodec,
        access_ttl: Duration,
        refresh_ttl: Duration,
        bcrypt_cost: u32,
    ) -> anyhow::Result<Self> {
        let dummy_hash = password::dummy_hash(bcrypt_cost)?;
        Ok(Self { store, codec, access_ttl, refresh_ttl, bcrypt_cost, dummy_hash })
    }

    pub fn from_config(store: Arc<dyn PrincipalStore>, config: &Config) -> anyhow::Result<Self> {
        let codec = TokenCodec::new(&config.jwt_secret, config.jwt_issuer.clone(), config.jwt_leeway_seconds);
        Self::new(
            store,
            codec,
            Duration::minutes(config.jwt_access_expire_minutes as i64),
            Duration::minutes(config.jwt_refresh_expire_minutes as i64),
            config.bcrypt_cost,
        )
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Create an active principal with no roles. Username is checked before email.
    pub async fn register(&self, req: RegisterRequest) -> AuthResult<User> {
        validate_registration(&req)?;

        if exists(self.store.find_by_username(&req.username).await)? {
            REGISTRATIONS_COUNTER.with_label_values(&["conflict"]).inc();
            return Err(AuthError::Conflict("username already exists".into()));
        }
        if exists(self.store.find_by_email(&req.email).await)? {
            REGISTRATIONS_COUNTER.with_label_values(&["conflict"]).inc();
            return Err(AuthError::Conflict("email already exists".into()));
        }

        let user = self
            .store
            .create(NewUser {
                username: req.username,
                email: req.email,
                password_hash: password::hash_password(&req.password, self.bcrypt_cost)?,
                full_name: req.full_name,
                is_active: true,
            })
            .await?;

        REGISTRATIONS_COUNTER.with_label_values(&["success"]).inc();
        info!("Registered principal {} ({})", user.username, user.id);
        Ok(user)
    }

    pub async fn login(&self, username: &str, secret: &str) -> AuthResult<TokenPair> {
        let user = match self.store.find_by_username(username).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                password::verify_against_dummy(&self.dummy_hash, secret);
                LOGINS_COUNTER.with_label_values(&["invalid_credentials"]).inc();
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        if !password::verify_password(&user.password_hash, secret) {
            LOGINS_COUNTER.with_label_values(&["invalid_credentials"]).inc();
            return Err(AuthError::InvalidCredentials);
        }

        // Only a holder of the correct secret learns the account is disabled.
        if !user.is_active {
            LOGINS_COUNTER.with_label_values(&["disabled"]).inc();
            warn!("Login refused for disabled principal {}", user.id);
            return Err(AuthError::AccountDisabled);
        }

        let pair = self.issue_pair(&user, Utc::now())?;
        LOGINS_COUNTER.with_label_values(&["success"]).inc();
        info!("Principal {} logged in", user.id);
        Ok(pair)
    }

    pub fn validate_access(&self, token: &str) -> AuthResult<TokenClaims> {
        self.validate_access_at(token, Utc::now())
    }

    pub fn validate_access_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<TokenClaims> {
        let claims = self.codec.decode(token, now)?;
        if claims.token_type != TokenKind::Access {
            return Err(AuthError::WrongTokenKind);
        }
        Ok(claims)
    }

    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        self.refresh_at(refresh_token, Utc::now()).await
    }

    /// Mint a new pair from a refresh token. Permissions are resolved afresh
    /// from the store, never copied from the presented token. The presented
    /// token stays valid until its own expiry.
    pub async fn refresh_at(&self, refresh_token: &str, now: DateTime<Utc>) -> AuthResult<TokenPair> {
        let result = self.try_refresh(refresh_token, now).await;
        let status = match &result {
            Ok(_) => "success",
            Err(AuthError::Token(e)) => e.as_str(),
            Err(AuthError::WrongTokenKind) => "wrong_kind",
            Err(AuthError::AccountDisabled) => "disabled",
            Err(_) => "error",
        };
        REFRESHES_COUNTER.with_label_values(&[status]).inc();
        result
    }

    async fn try_refresh(&self, refresh_token: &str, now: DateTime<Utc>) -> AuthResult<TokenPair> {
        let claims = self.codec.decode(refresh_token, now)?;
        if claims.token_type != TokenKind::Refresh {
            return Err(AuthError::WrongTokenKind);
        }

        let user = match self.store.find_by_id(claims.user_id).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => return Err(AuthError::Unauthenticated),
            Err(e) => return Err(e.into()),
        };
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        self.issue_pair(&user, now)
    }

    pub async fn profile(&self, user_id: Uuid) -> AuthResult<User> {
        match self.store.find_by_id(user_id).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound(_)) => Err(AuthError::Unauthenticated),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn change_password(&self, user_id: Uuid, current: &str, new: &str) -> AuthResult<()> {
        let user = self.profile(user_id).await?;
        if !password::verify_password(&user.password_hash, current) {
            return Err(AuthError::InvalidCredentials);
        }
        if new.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let hash = password::hash_password(new, self.bcrypt_cost)?;
        self.store.change_password(user_id, &hash).await?;
        info!("Password changed for principal {}", user_id);
        Ok(())
    }

    fn issue_pair(&self, user: &User, now: DateTime<Utc>) -> AuthResult<TokenPair> {
        let permissions = resolver::resolve(user);
        let access = self.codec.claims_for(
            user.id,
            &user.username,
            permissions.clone(),
            TokenKind::Access,
            now,
            self.access_ttl,
        );
        let refresh = self.codec.claims_for(
            user.id,
            &user.username,
            permissions,
            TokenKind::Refresh,
            now,
            self.refresh_ttl,
        );

        Ok(TokenPair {
            access_token: self.codec.encode(&access)?,
            refresh_token: self.codec.encode(&refresh)?,
            expires_in: self.access_ttl.num_seconds(),
        })
    }
}

fn exists(lookup: StoreResult<User>) -> AuthResult<bool> {
    match lookup {
        Ok(_) => Ok(true),
        Err(StoreError::NotFound(_)) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn validate_registration(req: &RegisterRequest) -> AuthResult<()> {
    validation::username(&req.username)?;
    validation::email(&req.email)?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if req.full_name.trim().is_empty() {
        return Err(AuthError::Validation("full_name is required".into()));
    }
    validation::full_name(&req.full_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{seed::seed_base_data, InMemoryPrincipalStore},
        error::TokenError,
        models::user::UserUpdate,
    };

    const COST: u32 = 4;

    async fn service() -> (Arc<InMemoryPrincipalStore>, AuthService) {
        let store = Arc::new(InMemoryPrincipalStore::new());
        seed_base_data(store.as_ref(), COST, "password").await.unwrap();
        let auth = AuthService::new(
            store.clone(),
            TokenCodec::new("unit-secret", "authgate", 0),
            Duration::minutes(15),
            Duration::days(7),
            COST,
        )
        .unwrap();
        (store, auth)
    }

    fn registration(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: "hunter22".into(),
            full_name: "Test User".into(),
        }
    }

    async fn time_failed_logins(auth: &AuthService, username: &str) -> std::time::Duration {
        let start = std::time::Instant::now();
        for _ in 0..5 {
            assert!(matches!(auth.login(username, "wrong").await, Err(AuthError::InvalidCredentials)));
        }
        start.elapsed()
    }

    #[tokio::test]
    async fn admin_login_embeds_resolved_permissions() {
        let (_, auth) = service().await;
        let pair = auth.login("admin", "password").await.unwrap();
        assert_eq!(pair.expires_in, 15 * 60);

        let claims = auth.validate_access(&pair.access_token).unwrap();
        assert_eq!(claims.username, "admin");
        assert!(claims.permissions.contains("user:list"));

        let refresh = auth.codec().decode(&pair.refresh_token, Utc::now()).unwrap();
        assert_eq!(refresh.token_type, TokenKind::Refresh);
        assert_eq!(refresh.sub, claims.sub);
        assert_eq!(refresh.iss, claims.iss);
        assert_eq!(refresh.exp - refresh.iat, 7 * 24 * 3600);
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_secret_are_indistinguishable() {
        let (_, auth) = service().await;
        let wrong = auth.login("admin", "wrong").await.unwrap_err();
        let unknown = auth.login("nobody", "password").await.unwrap_err();
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn unknown_user_pays_the_configured_cost() {
        let (_, auth) = service().await;
        assert_eq!(password::hash_cost(&auth.dummy_hash), Some(COST));

        let wrong_secret = time_failed_logins(&auth, "admin").await;
        let unknown_user = time_failed_logins(&auth, "nobody").await;

        // A dummy hash at the default cost of 12 is hundreds of times slower than cost 4.
        assert!(
            unknown_user < wrong_secret * 10 + std::time::Duration::from_millis(50),
            "unknown {unknown_user:?} vs wrong secret {wrong_secret:?}"
        );
    }

    #[tokio::test]
    async fn disabled_account_is_reported_only_with_correct_secret() {
        let (store, auth) = service().await;
        let admin = store.find_by_username("admin").await.unwrap();
        store
            .update(admin.id, UserUpdate { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();

        assert!(matches!(auth.login("admin", "password").await, Err(AuthError::AccountDisabled)));
        assert!(matches!(auth.login("admin", "nope").await, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn register_creates_active_principal_without_roles() {
        let (_, auth) = service().await;
        let user = auth.register(registration("carol", "carol@example.com")).await.unwrap();
        assert!(user.is_active);
        assert!(user.roles.is_empty());
        assert_ne!(user.password_hash, "hunter22");
        assert!(password::verify_password(&user.password_hash, "hunter22"));

        let pair = auth.login("carol", "hunter22").await.unwrap();
        let claims = auth.validate_access(&pair.access_token).unwrap();
        assert!(claims.permissions.is_empty());
    }

    #[tokio::test]
    async fn register_conflicts_on_username_then_email() {
        let (_, auth) = service().await;
        auth.register(registration("dave", "dave@example.com")).await.unwrap();

        let same_email = auth.register(registration("david", "dave@example.com")).await;
        assert!(matches!(same_email, Err(AuthError::Conflict(m)) if m.contains("email")));

        let both = auth.register(registration("dave", "dave@example.com")).await;
        assert!(matches!(both, Err(AuthError::Conflict(m)) if m.contains("username")));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let (_, auth) = service().await;

        let short_name = registration("ed", "ed@example.com");
        assert!(matches!(auth.register(short_name).await, Err(AuthError::Validation(_))));

        let mut short_secret = registration("eddie", "eddie@example.com");
        short_secret.password = "123".into();
        assert!(matches!(auth.register(short_secret).await, Err(AuthError::Validation(_))));

        let bad_email = registration("frank", "frank-at-example");
        assert!(matches!(auth.register(bad_email).await, Err(AuthError::Validation(_))));
    }

    #[tokio::test]
    async fn register_rejects_values_wider_than_their_columns() {
        let (store, auth) = service().await;

        let long_email = format!("{}@example.com", "g".repeat(110));
        assert!(matches!(
            auth.register(registration("gina", &long_email)).await,
            Err(AuthError::Validation(m)) if m.contains("email")
        ));

        let mut long_name = registration("hank", "hank@example.com");
        long_name.full_name = "H".repeat(validation::FULL_NAME_MAX_LEN + 1);
        assert!(matches!(auth.register(long_name).await, Err(AuthError::Validation(_))));

        let long_username = registration(&"i".repeat(51), "ivan@example.com");
        assert!(matches!(auth.register(long_username).await, Err(AuthError::Validation(_))));

        assert!(matches!(store.find_by_email("hank@example.com").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn access_token_cannot_refresh_and_refresh_token_cannot_access() {
        let (_, auth) = service().await;
        let pair = auth.login("admin", "password").await.unwrap();

        assert!(matches!(auth.refresh(&pair.access_token).await, Err(AuthError::WrongTokenKind)));
        assert!(matches!(auth.validate_access(&pair.refresh_token), Err(AuthError::WrongTokenKind)));
    }

    #[tokio::test]
    async fn refresh_re_resolves_permissions() {
        let (store, auth) = service().await;
        let admin_role = store.find_role_by_name("admin").await.unwrap();
        let pair = auth.login("admin", "password").await.unwrap();

        store.assign_permissions(admin_role.id, &["role:list".to_string()]).await.unwrap();

        let rotated = auth.refresh(&pair.refresh_token).await.unwrap();
        let claims = auth.validate_access(&rotated.access_token).unwrap();
        assert_eq!(claims.permissions.into_iter().collect::<Vec<_>>(), vec!["role:list".to_string()]);

        // No revocation: the old refresh token still works.
        assert!(auth.refresh(&pair.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_for_disabled_or_vanished_principal_fails() {
        let (store, auth) = service().await;
        let pair = auth.login("admin", "password").await.unwrap();
        let admin = store.find_by_username("admin").await.unwrap();

        store
            .update(admin.id, UserUpdate { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert!(matches!(auth.refresh(&pair.refresh_token).await, Err(AuthError::AccountDisabled)));

        let ghost = auth.codec().claims_for(
            Uuid::new_v4(),
            "ghost",
            Default::default(),
            TokenKind::Refresh,
            Utc::now(),
            Duration::days(1),
        );
        let token = auth.codec().encode(&ghost).unwrap();
        assert!(matches!(auth.refresh(&token).await, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn expired_refresh_token_is_rejected() {
        let (_, auth) = service().await;
        let pair = auth.login("admin", "password").await.unwrap();
        let later = Utc::now() + Duration::days(8);
        assert!(matches!(
            auth.refresh_at(&pair.refresh_token, later).await,
            Err(AuthError::Token(TokenError::Expired))
        ));
    }

    #[tokio::test]
    async fn change_password_requires_current_secret() {
        let (store, auth) = service().await;
        let admin = store.find_by_username("admin").await.unwrap();

        assert!(matches!(
            auth.change_password(admin.id, "wrong", "new-secret").await,
            Err(AuthError::InvalidCredentials)
        ));
        auth.change_password(admin.id, "password", "new-secret").await.unwrap();

        assert!(auth.login("admin", "password").await.is_err());
        assert!(auth.login("admin", "new-secret").await.is_ok());
    }
}
