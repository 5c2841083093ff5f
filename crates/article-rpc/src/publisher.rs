//! Outbound request construction and publishing.

use tracing::debug;

use crate::envelope::{ArticleQuery, CorrelationId, RequestEnvelope};
use crate::error::ConnectionError;
use crate::transport::{BrokerSession, OutboundMessage};
use crate::{JSON_CONTENT_TYPE, NON_PERSISTENT_DELIVERY};

/// Builds article requests addressed to the catalog and publishes them.
#[derive(Debug, Clone)]
pub struct RequestPublisher {
    exchange: String,
    routing_key: String,
}

impl RequestPublisher {
    #[must_use]
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }

    /// Build a request under a fresh correlation id, asking for the reply on `reply_queue`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Publish`] if the envelope cannot be encoded.
    pub fn build(
        &self,
        reply_queue: &str,
        article_id: &str,
        reference_id: &str,
    ) -> Result<OutboundMessage, ConnectionError> {
        let correlation_id = CorrelationId::generate();
        let envelope = RequestEnvelope {
            correlation_id: correlation_id.clone(),
            exchange: self.exchange.clone(),
            routing_key: reply_queue.to_string(),
            message: ArticleQuery {
                reference_id: reference_id.to_string(),
                article_id: article_id.to_string(),
            },
        };
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| ConnectionError::Publish(format!("Failed to encode request: {e}")))?;

        Ok(OutboundMessage {
            exchange: self.exchange.clone(),
            routing_key: self.routing_key.clone(),
            correlation_id,
            content_type: JSON_CONTENT_TYPE.to_string(),
            delivery_mode: NON_PERSISTENT_DELIVERY,
            body,
        })
    }

    /// Publish a built request on `session`.
    ///
    /// # Errors
    ///
    /// Returns the transport's [`ConnectionError`] unchanged.
    pub async fn publish(
        &self,
        session: &dyn BrokerSession,
        message: &OutboundMessage,
    ) -> Result<(), ConnectionError> {
        session.publish(message).await?;
        debug!(
            exchange = %message.exchange,
            routing_key = %message.routing_key,
            correlation_id = %message.correlation_id,
            "Published article request"
        );
        Ok(())
    }
}
