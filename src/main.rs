//! # Favorites - service entry point
//!
//! ## Initialization Sequence
//!
//! 1. **Tracing** - `RUST_LOG`-driven `EnvFilter`
//! 2. **Article validator** - opened eagerly against the broker; a failure is
//!    logged and the validator reconnects on the first call instead
//! 3. **Axum API** - favorites routes behind the identity gateway
//!
//! ## Shutdown
//!
//! Ctrl+C stops accepting connections, drains in-flight requests, then closes
//! the broker connection.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use article_rpc::{AmqpBroker, ArticleValidator, Broker, InMemoryBroker};
use clap::Parser;
use favorites_web::{
    AppState, HttpIdentityProvider, InMemoryFavoriteRepository, create_router, run_server,
};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;

const DEFAULT_LOG_FILTER: &str = "info,favorites_web=debug,article_rpc=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    info!("Favorites service starting...");

    let validator = Arc::new(init_validator(&cli).await);

    let identity = HttpIdentityProvider::new(&cli.auth_config())
        .context("Failed to build the auth service client")?;
    let state = AppState::new(
        Arc::new(InMemoryFavoriteRepository::new()),
        Arc::clone(&validator),
        Arc::new(identity),
    );

    let server_config = cli.server_config();
    let app = create_router(state, &server_config).context("Failed to create router")?;

    let served = run_server(app, &server_config.bind_address, wait_for_shutdown())
        .await
        .with_context(|| format!("Server on {} failed", server_config.bind_address));

    info!("Cleaning up...");
    validator.close().await;

    served?;
    info!("Favorites service stopped");
    Ok(())
}

/// Initialize tracing with an `EnvFilter`, falling back to service defaults.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the validator and try to connect it up front.
async fn init_validator(cli: &Cli) -> ArticleValidator {
    let config = cli.validator_config();
    let broker: Arc<dyn Broker> = if cli.memory_broker {
        warn!("Using the in-memory broker: every article is accepted");
        Arc::new(InMemoryBroker::confirming())
    } else {
        Arc::new(AmqpBroker::from_config(&config))
    };

    let validator = ArticleValidator::new(broker, &config);
    match validator.open().await {
        Ok(()) => info!("Article validator connected"),
        Err(err) => warn!(error = %err, "Broker unavailable at startup, will retry on first use"),
    }
    validator
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
