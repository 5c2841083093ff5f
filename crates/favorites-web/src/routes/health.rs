//! Health check endpoint: GET /health

use axum::{extract::State, response::Json};
use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout;

use crate::state::AppState;

/// How long the broker check may wait for the validator.
const BROKER_CHECK_TIMEOUT: Duration = Duration::from_millis(200);

/// Broker connection as seen by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerStatus {
    Connected,
    Disconnected,
    /// The validator was busy with a call for longer than the check allows.
    Unknown,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    broker: BrokerStatus,
}

async fn broker_status(state: &AppState) -> BrokerStatus {
    match timeout(BROKER_CHECK_TIMEOUT, state.validator.is_connected()).await {
        Ok(true) => BrokerStatus::Connected,
        Ok(false) => BrokerStatus::Disconnected,
        Err(_) => BrokerStatus::Unknown,
    }
}

/// GET /health - Health check endpoint
///
/// Always 200 while the process serves requests; the broker state is
/// informational since the validator reconnects lazily.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        broker: broker_status(&state).await,
    })
}
