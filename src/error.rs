use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;

pub type AuthResult<T> = Result<T, AuthError>;

/// Reasons a bearer token fails to decode.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("token signing algorithm is not supported")]
    UnsupportedAlgorithm,
    #[error("token issuer is not trusted")]
    InvalidIssuer,
}

impl TokenError {
    /// Stable label used for metrics and error codes.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
            TokenError::NotYetValid => "not_yet_valid",
            TokenError::UnsupportedAlgorithm => "unsupported_algorithm",
            TokenError::InvalidIssuer => "invalid_issuer",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown username or wrong secret; deliberately indistinguishable.
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("account is disabled")]
    AccountDisabled,
    #[error("{0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("wrong token type")]
    WrongTokenKind,
    #[error("authentication required")]
    Unauthenticated,
    #[error("missing permission '{0}'")]
    Forbidden(String),
    #[error("missing role '{0}'")]
    MissingRole(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AuthError::AccountDisabled => (StatusCode::FORBIDDEN, "ACCOUNT_DISABLED"),
            AuthError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AuthError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AuthError::Token(TokenError::Expired) => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            AuthError::Token(_) => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID"),
            AuthError::WrongTokenKind => (StatusCode::UNAUTHORIZED, "WRONG_TOKEN_TYPE"),
            AuthError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            AuthError::Forbidden(_) | AuthError::MissingRole(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AuthError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => AuthError::NotFound(what),
            StoreError::Conflict(what) => AuthError::Conflict(what),
            StoreError::Backend(e) => AuthError::Internal(e),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AuthError::Internal(e) => {
                tracing::error!("internal error: {e:#}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}
