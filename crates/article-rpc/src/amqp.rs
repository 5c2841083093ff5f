//! RabbitMQ transport built on `lapin`.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
    options::{
        BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ValidatorConfig;
use crate::error::ConnectionError;
use crate::tracker::CorrelationTracker;
use crate::transport::{Broker, BrokerSession, OutboundMessage};

const REPLY_SUCCESS: u16 = 200;

/// Connects to a RabbitMQ broker over AMQP 0-9-1.
#[derive(Debug, Clone)]
pub struct AmqpBroker {
    url: String,
}

impl AmqpBroker {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    #[must_use]
    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self::new(&config.url)
    }
}

fn channel_error(err: lapin::Error) -> ConnectionError {
    ConnectionError::Channel(err.to_string())
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn connect(
        &self,
        exchange: &str,
        tracker: Arc<CorrelationTracker>,
    ) -> Result<Box<dyn BrokerSession>, ConnectionError> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;

        match open_reply_channel(&connection, exchange).await {
            Ok((channel, reply_queue, consumer)) => {
                let closing = Arc::new(AtomicBool::new(false));
                let consumer_task = tokio::spawn(consume_replies(
                    consumer,
                    reply_queue.clone(),
                    tracker,
                    Arc::clone(&closing),
                ));
                info!(exchange, reply_queue = %reply_queue, "Connected to RabbitMQ");

                Ok(Box::new(AmqpSession {
                    connection,
                    channel,
                    reply_queue,
                    closing,
                    consumer_task,
                }))
            }
            Err(err) => {
                if let Err(close_err) = connection.close(REPLY_SUCCESS, "setup failed").await {
                    debug!(error = %close_err, "Failed to close half-open connection");
                }
                Err(err)
            }
        }
    }
}

/// Channel, exchange, exclusive reply queue, binding and consumer.
async fn open_reply_channel(
    connection: &Connection,
    exchange: &str,
) -> Result<(Channel, String, Consumer), ConnectionError> {
    let channel = connection.create_channel().await.map_err(channel_error)?;

    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: false,
                auto_delete: false,
                internal: false,
                nowait: false,
                passive: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(channel_error)?;

    let queue = channel
        .queue_declare(
            "",
            QueueDeclareOptions {
                exclusive: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(channel_error)?;
    let reply_queue = queue.name().as_str().to_string();

    channel
        .queue_bind(
            &reply_queue,
            exchange,
            &reply_queue,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(channel_error)?;

    let consumer = channel
        .basic_consume(
            &reply_queue,
            "",
            BasicConsumeOptions {
                no_ack: true,
                ..BasicConsumeOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(channel_error)?;

    Ok((channel, reply_queue, consumer))
}

/// Feed every reply to the tracker until the consumer stops.
///
/// If it stops without a deliberate close, a call published on this session
/// is failed so its waiter sees a lost connection instead of sitting out the
/// deadline. Calls on later sessions are not touched.
async fn consume_replies(
    mut consumer: Consumer,
    reply_queue: String,
    tracker: Arc<CorrelationTracker>,
    closing: Arc<AtomicBool>,
) {
    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                let correlation_id = delivery
                    .properties
                    .correlation_id()
                    .as_ref()
                    .map(|id| id.as_str());
                let outcome = tracker.handle_delivery(correlation_id, &delivery.data);
                debug!(?outcome, "Reply delivered");
            }
            Err(err) => {
                warn!(error = %err, "Reply consumer failed");
                break;
            }
        }
    }

    if !closing.load(Ordering::SeqCst) {
        warn!(reply_queue = %reply_queue, "Reply consumer stopped unexpectedly");
        tracker.fail_pending(&reply_queue);
    }
}

struct AmqpSession {
    connection: Connection,
    channel: Channel,
    reply_queue: String,
    closing: Arc<AtomicBool>,
    consumer_task: JoinHandle<()>,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), ConnectionError> {
        let properties = BasicProperties::default()
            .with_correlation_id(message.correlation_id.as_str().into())
            .with_content_type(message.content_type.as_str().into())
            .with_delivery_mode(message.delivery_mode);

        self.channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(|e| ConnectionError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.closing.store(true, Ordering::SeqCst);
        let result = self
            .connection
            .close(REPLY_SUCCESS, "client closing")
            .await
            .map_err(|e| ConnectionError::Channel(e.to_string()));
        self.consumer_task.abort();
        result
    }
}

/// A session discarded without `close` (already dead, or replaced) stops its
/// consumer so it cannot report a loss after the fact.
impl Drop for AmqpSession {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        self.consumer_task.abort();
    }
}
