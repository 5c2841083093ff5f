//! Identity gateway.
//!
//! Every protected request carries `Authorization: Bearer <token>`. The token
//! is resolved against the auth service (`GET {base}/users/current`) and the
//! resulting [`CurrentUser`] is attached to the request extensions.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Auth service location.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// The caller, as reported by the auth service.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub id: String,
    pub profile: Value,
}

impl CurrentUser {
    /// Builds the user from an identity document, reading `id` or `_id`.
    ///
    /// # Errors
    ///
    /// Returns `MissingUserId` when neither field holds a string or number.
    pub fn from_profile(profile: Value) -> Result<Self, AuthError> {
        let id = ["id", "_id"]
            .iter()
            .filter_map(|key| profile.get(key))
            .find_map(|value| match value {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or(AuthError::MissingUserId)?;

        Ok(Self { id, profile })
    }
}

/// Identity check failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Authorization header must use 'Bearer' scheme")]
    InvalidScheme,

    #[error("Token cannot be empty")]
    EmptyToken,

    #[error("Auth service rejected the token with status {status}")]
    Rejected { status: u16 },

    #[error("Identity has no user id")]
    MissingUserId,

    #[error("Auth service unavailable: {0}")]
    Unavailable(String),

    #[error("Auth service returned an unreadable identity")]
    UnreadableIdentity,
}

impl AuthError {
    /// True when the auth service could not be consulted, as opposed to the
    /// caller being refused.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::UnreadableIdentity)
    }
}

/// Resolves bearer tokens to users.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns `Rejected` for refused tokens and `Unavailable` when the
    /// provider cannot be reached.
    async fn current_user(&self, token: &str) -> Result<CurrentUser, AuthError>;
}

/// Auth service client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    current_user_url: String,
}

impl HttpIdentityProvider {
    /// # Errors
    ///
    /// Returns `Unavailable` if the HTTP client cannot be built.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            current_user_url: format!("{}/users/current", config.base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn current_user(&self, token: &str) -> Result<CurrentUser, AuthError> {
        let response = self
            .client
            .get(&self.current_user_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
            });
        }

        let profile: Value = response
            .json()
            .await
            .map_err(|_| AuthError::UnreadableIdentity)?;
        CurrentUser::from_profile(profile)
    }
}

/// Extracts the bearer token from the request headers.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidScheme)?;

    let token = header
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::InvalidScheme)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::EmptyToken);
    }
    Ok(token)
}

/// Authentication middleware.
///
/// Rejects the request with RFC 7807 problem details unless the identity
/// provider accepts its bearer token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = bearer_token(req.headers()).map(str::to_owned);
    let user = match token {
        Ok(token) => state.identity.current_user(&token).await,
        Err(err) => Err(err),
    };

    match user {
        Ok(user) => {
            debug!(user_id = %user.id, "Identity resolved");
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(err) => {
            if err.is_unavailable() {
                warn!(error = %err, "Identity check failed");
            }
            AppError::from(err).into_response()
        }
    }
}
