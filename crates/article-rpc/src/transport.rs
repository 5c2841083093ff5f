//! Broker transport seam.
//!
//! The validator only needs a session that owns a private reply queue, can
//! publish, and feeds every delivery on that queue to the tracker.

use async_trait::async_trait;
use std::sync::Arc;

use crate::envelope::{CorrelationId, RequestEnvelope};
use crate::error::ConnectionError;
use crate::tracker::CorrelationTracker;

/// One message on its way to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub exchange: String,
    pub routing_key: String,
    pub correlation_id: CorrelationId,
    pub content_type: String,
    pub delivery_mode: u8,
    pub body: Vec<u8>,
}

impl OutboundMessage {
    /// Decode the body back into the request envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a request envelope.
    pub fn envelope(&self) -> Result<RequestEnvelope, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Opens sessions against a broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a connection and channel, declare `exchange` (direct, non-durable),
    /// declare an exclusive server-named reply queue bound to `exchange` under
    /// its own name, and start delivering its messages to `tracker`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] on any transport or protocol failure.
    async fn connect(
        &self,
        exchange: &str,
        tracker: Arc<CorrelationTracker>,
    ) -> Result<Box<dyn BrokerSession>, ConnectionError>;
}

/// An open connection/channel pair with its reply queue.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Server-assigned name of the reply queue.
    fn reply_queue(&self) -> &str;

    /// Whether the connection and channel are still usable.
    fn is_open(&self) -> bool;

    /// Publish one message.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] if the transport rejects the publish.
    async fn publish(&self, message: &OutboundMessage) -> Result<(), ConnectionError>;

    /// Tear the connection down.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] if the close handshake fails.
    async fn close(&self) -> Result<(), ConnectionError>;
}
