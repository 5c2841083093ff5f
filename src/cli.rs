//! CLI definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::time::Duration;

use article_rpc::ValidatorConfig;
use clap::Parser;
use favorites_web::{AuthConfig, ServerConfig};

/// Favorites - product favorites service
#[derive(Parser, Debug)]
#[command(name = "favorites")]
#[command(version)]
#[command(about = "Product favorites API with broker-backed article validation")]
pub struct Cli {
    /// Address the HTTP server binds to
    #[arg(long, env = "FAVORITES_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// RabbitMQ URL
    #[arg(long, env = "RABBIT_URL", default_value = "amqp://localhost")]
    pub rabbit_url: String,

    /// Base URL of the auth service
    #[arg(long, env = "AUTH_SERVICE_URL", default_value = "http://localhost:3000")]
    pub auth_service_url: String,

    /// How long to wait for the catalog's reply, in milliseconds
    #[arg(long, env = "RPC_TIMEOUT_MS", default_value_t = 5000)]
    pub rpc_timeout_ms: u64,

    /// Allowed CORS origin
    #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:4200")]
    pub cors_origin: String,

    /// Use an in-process broker that confirms every article
    #[arg(long, default_value_t = false)]
    pub memory_broker: bool,
}

impl Cli {
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig::default()
            .with_url(self.rabbit_url.clone())
            .with_timeout(Duration::from_millis(self.rpc_timeout_ms))
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_address: self.bind.clone(),
            cors_origin: self.cors_origin.clone(),
        }
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            base_url: self.auth_service_url.clone(),
            ..AuthConfig::default()
        }
    }
}
