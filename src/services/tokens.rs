//! Signed-claims codec for access and refresh tokens.
//!
//! Tokens are HS256 JWTs. Decoding accepts only the HMAC family and checks
//! the validity window against a caller-supplied `now`, so the boundary
//! behaviour is testable without sleeping.

use std::collections::BTreeSet;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::TokenError,
    models::auth::{TokenClaims, TokenKind},
};

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    leeway: Duration,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &str, issuer: impl Into<String>, leeway_seconds: u64) -> Self {
        let issuer = issuer.into();

        // Time claims are checked by hand against the injected clock.
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "iss", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            leeway: Duration::seconds(leeway_seconds as i64),
            validation,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Build the claims for a token issued at `now` and valid for `ttl`.
    pub fn claims_for(
        &self,
        user_id: Uuid,
        username: &str,
        permissions: BTreeSet<String>,
        kind: TokenKind,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> TokenClaims {
        let iat = now.timestamp();
        TokenClaims {
            user_id,
            username: username.to_string(),
            permissions,
            token_type: kind,
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            iat,
            nbf: iat,
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn encode(&self, claims: &TokenClaims) -> anyhow::Result<String> {
        let header = Header::new(SIGNING_ALGORITHM);
        Ok(jsonwebtoken::encode(&header, claims, &self.encoding)?)
    }

    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        check_algorithm(token)?;

        let claims = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => TokenError::UnsupportedAlgorithm,
                ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
                _ => TokenError::Malformed,
            })?
            .claims;

        if claims.exp <= claims.iat || claims.sub != claims.user_id.to_string() {
            return Err(TokenError::Malformed);
        }

        let now = now.timestamp();
        let leeway = self.leeway.num_seconds();
        if now >= claims.exp + leeway {
            return Err(TokenError::Expired);
        }
        if now < claims.nbf - leeway {
            return Err(TokenError::NotYetValid);
        }

        Ok(claims)
    }
}

/// Reject anything outside the HMAC family before touching the signature.
/// `none` is not a variant `jsonwebtoken` can parse, so the header is read raw.
fn check_algorithm(token: &str) -> Result<(), TokenError> {
    let mut segments = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(TokenError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD.decode(header).map_err(|_| TokenError::Malformed)?;
    let header: RawHeader = serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;

    match header.alg.as_str() {
        "HS256" | "HS384" | "HS512" => Ok(()),
        _ => Err(TokenError::UnsupportedAlgorithm),
    }
}
