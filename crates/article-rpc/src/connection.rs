//! Lifecycle of the broker session owned by one validator.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ConnectionError;
use crate::tracker::CorrelationTracker;
use crate::transport::{Broker, BrokerSession};

/// Owns the connection, channel and reply queue; recreates them on demand.
pub struct ConnectionManager {
    broker: Arc<dyn Broker>,
    exchange: String,
    tracker: Arc<CorrelationTracker>,
    session: Option<Box<dyn BrokerSession>>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(
        broker: Arc<dyn Broker>,
        exchange: impl Into<String>,
        tracker: Arc<CorrelationTracker>,
    ) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            tracker,
            session: None,
        }
    }

    /// Return the open session, opening a new one if there is none or it closed.
    ///
    /// Does not retry; that is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] if the broker cannot be reached or the
    /// reply queue cannot be set up.
    pub async fn ensure_connection(&mut self) -> Result<&dyn BrokerSession, ConnectionError> {
        let reusable = self.session.as_ref().is_some_and(|session| session.is_open());

        if !reusable {
            if self.session.take().is_some() {
                debug!("Discarding closed broker session");
            }
            let session = self
                .broker
                .connect(&self.exchange, Arc::clone(&self.tracker))
                .await?;
            info!(
                exchange = %self.exchange,
                reply_queue = session.reply_queue(),
                "Broker session established"
            );
            self.session = Some(session);
        }

        self.session.as_deref().ok_or(ConnectionError::NotConnected)
    }

    /// Best-effort close: failures are logged, state is reset regardless.
    pub async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if session.is_open() {
            match session.close().await {
                Ok(()) => debug!(reply_queue = session.reply_queue(), "Broker session closed"),
                Err(err) => warn!(error = %err, "Failed to close broker session cleanly"),
            }
        }
    }

    /// Whether an open session is held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|session| session.is_open())
    }
}
