//! Favorites Web Server
//!
//! HTTP API for user favorites with tower middleware for CORS, tracing, and
//! compression. Protected routes resolve the caller through the identity
//! gateway; new favorites are confirmed with the product catalog over the
//! broker before they are stored.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware::from_fn,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub mod auth;
pub mod error;
pub mod middleware;
pub mod repository;
pub mod routes;
pub mod server;
pub mod state;
pub mod validation;

pub use auth::{AuthConfig, AuthError, CurrentUser, HttpIdentityProvider, IdentityProvider};
pub use error::{AppError, ErrorResponse};
pub use repository::{
    Favorite, FavoriteRepository, InMemoryFavoriteRepository, Page, PopularProduct,
    RepositoryError,
};
pub use server::run_server;
pub use state::AppState;

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:8000")
    pub bind_address: String,
    /// Allowed CORS origin
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            cors_origin: "http://localhost:4200".to_string(),
        }
    }
}

/// Create a new router with middleware.
///
/// # Errors
///
/// Returns an error if the CORS origin is not a valid header value.
pub fn create_router(state: AppState, config: &ServerConfig) -> Result<Router, Error> {
    info!("Creating router with CORS origin: {}", config.cors_origin);

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    let router = routes::create_router(state.clone())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors)
                .layer(from_fn(middleware::logging_middleware)),
        )
        .with_state(state);

    Ok(router)
}

/// Web server errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] axum::http::header::InvalidHeaderValue),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] axum::http::Error),

    /// Axum error
    #[error("Axum error: {0}")]
    Axum(#[from] axum::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<std::convert::Infallible> for Error {
    fn from(value: std::convert::Infallible) -> Self {
        match value {}
    }
}
