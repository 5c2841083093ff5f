//! Server setup

use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

use crate::Error;

/// Serve `app` on `bind_address` until `shutdown` resolves.
///
/// In-flight requests are drained before this returns.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run_server(
    app: Router,
    bind_address: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Error> {
    let listener = TcpListener::bind(bind_address).await?;
    info!("Favorites server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Favorites server stopped");
    Ok(())
}
