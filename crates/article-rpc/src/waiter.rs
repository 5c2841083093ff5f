//! Deadline-bound wait for the pending call's reply.

use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, timeout_at};

use crate::error::{ConnectionError, CycleError};

/// Waits for a reply slot to be filled or the deadline to pass.
#[derive(Debug, Clone, Copy)]
pub struct ResponseWaiter {
    timeout: Duration,
}

impl ResponseWaiter {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until `started + timeout` for the reply.
    ///
    /// A slot closed without a value means the transport went away.
    pub(crate) async fn wait(
        &self,
        started: Instant,
        reply: oneshot::Receiver<Value>,
    ) -> Result<Value, CycleError> {
        match timeout_at(started + self.timeout, reply).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(CycleError::Transport(ConnectionError::Lost)),
            Err(_) => Err(CycleError::TimedOut),
        }
    }
}
