//! In-process broker with scripted replies.
//!
//! Used for local development without RabbitMQ and for exercising the
//! validator's timeout, correlation and retry behaviour in tests. Every
//! published request is recorded and handed to a responder closure that
//! decides which replies (if any) land on the reply queue, and when.
//!
//! A lost session is noticed the way the AMQP consumer notices it: a
//! separate task reports the loss for the session's reply queue, after the
//! configured loss delay.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::error::ConnectionError;
use crate::tracker::CorrelationTracker;
use crate::transport::{Broker, BrokerSession, OutboundMessage};

/// One reply the responder wants delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedReply {
    /// Delay between the publish and the delivery
    pub delay: Duration,
    /// Correlation id carried in message metadata
    pub correlation_id: Option<String>,
    /// Raw message body
    pub body: Vec<u8>,
}

impl ScriptedReply {
    /// JSON reply to `request`, echoing its correlation id in metadata.
    #[must_use]
    pub fn to(request: &OutboundMessage, body: &Value) -> Self {
        Self {
            delay: Duration::ZERO,
            correlation_id: Some(request.correlation_id.to_string()),
            body: body.to_string().into_bytes(),
        }
    }

    /// Reply with an arbitrary body and no metadata correlation id.
    #[must_use]
    pub fn raw(body: impl Into<Vec<u8>>) -> Self {
        Self {
            delay: Duration::ZERO,
            correlation_id: None,
            body: body.into(),
        }
    }

    /// Replace the metadata correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Drop the metadata correlation id.
    #[must_use]
    pub fn without_correlation_id(mut self) -> Self {
        self.correlation_id = None;
        self
    }

    /// Deliver after `delay`.
    #[must_use]
    pub const fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Responder = dyn Fn(&OutboundMessage) -> Vec<ScriptedReply> + Send + Sync;

struct Inner {
    responder: Box<Responder>,
    connect_failures: AtomicU32,
    publish_failures: AtomicU32,
    drop_failures: AtomicU32,
    loss_delay: Mutex<Duration>,
    connect_attempts: AtomicU32,
    next_queue: AtomicU64,
    published: Mutex<Vec<OutboundMessage>>,
}

/// Broker living entirely in this process.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    /// Create a broker whose replies are decided by `responder`.
    pub fn new(
        responder: impl Fn(&OutboundMessage) -> Vec<ScriptedReply> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                responder: Box::new(responder),
                connect_failures: AtomicU32::new(0),
                publish_failures: AtomicU32::new(0),
                drop_failures: AtomicU32::new(0),
                loss_delay: Mutex::new(Duration::ZERO),
                connect_attempts: AtomicU32::new(0),
                next_queue: AtomicU64::new(1),
                published: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A catalog that knows every article.
    #[must_use]
    pub fn confirming() -> Self {
        Self::new(|request| {
            let article_id = request
                .envelope()
                .map(|envelope| envelope.message.article_id)
                .unwrap_or_default();
            vec![ScriptedReply::to(
                request,
                &json!({"message": {"valid": true, "articleId": article_id}}),
            )]
        })
    }

    /// A catalog that never answers.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(|_| Vec::new())
    }

    /// Refuse the next `count` connection attempts.
    #[must_use]
    pub fn failing_connects(self, count: u32) -> Self {
        self.inner.connect_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Reject the next `count` publishes.
    #[must_use]
    pub fn failing_publishes(self, count: u32) -> Self {
        self.inner.publish_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Lose the session right after each of the next `count` publishes.
    ///
    /// The request is recorded but never answered; the waiting call learns
    /// of the loss instead.
    #[must_use]
    pub fn dropping_after_publish(self, count: u32) -> Self {
        self.inner.drop_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Report session losses `delay` after they happen.
    #[must_use]
    pub fn reporting_loss_after(self, delay: Duration) -> Self {
        *self
            .inner
            .loss_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
        self
    }

    /// Connection attempts so far, successful or not.
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    /// Requests that were published successfully.
    #[must_use]
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.inner
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Decrement `counter` if positive; true when a failure should be injected.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn connect(
        &self,
        exchange: &str,
        tracker: Arc<CorrelationTracker>,
    ) -> Result<Box<dyn BrokerSession>, ConnectionError> {
        self.inner.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.inner.connect_failures) {
            return Err(ConnectionError::Connect("connection refused".to_string()));
        }

        let queue = self.inner.next_queue.fetch_add(1, Ordering::SeqCst);
        let reply_queue = format!("amq.gen-memory-{queue}");
        debug!(exchange, reply_queue = %reply_queue, "In-memory broker session opened");

        Ok(Box::new(InMemorySession {
            inner: Arc::clone(&self.inner),
            reply_queue,
            tracker,
            open: Arc::new(AtomicBool::new(true)),
        }))
    }
}

struct InMemorySession {
    inner: Arc<Inner>,
    reply_queue: String,
    tracker: Arc<CorrelationTracker>,
    open: Arc<AtomicBool>,
}

impl InMemorySession {
    /// Mark the session dead and report the loss for its reply queue.
    fn lose(&self) {
        self.open.store(false, Ordering::SeqCst);
        let delay = *self
            .inner
            .loss_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let tracker = Arc::clone(&self.tracker);
        let reply_queue = self.reply_queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(reply_queue = %reply_queue, "In-memory broker session lost");
            tracker.fail_pending(&reply_queue);
        });
    }
}

#[async_trait]
impl BrokerSession for InMemorySession {
    fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::NotConnected);
        }
        if take_failure(&self.inner.publish_failures) {
            self.lose();
            return Err(ConnectionError::Publish("channel closed by broker".to_string()));
        }

        self.inner
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());

        if take_failure(&self.inner.drop_failures) {
            self.lose();
            return Ok(());
        }

        for reply in (self.inner.responder)(message) {
            let tracker = Arc::clone(&self.tracker);
            let open = Arc::clone(&self.open);
            tokio::spawn(async move {
                tokio::time::sleep(reply.delay).await;
                if open.load(Ordering::SeqCst) {
                    tracker.handle_delivery(reply.correlation_id.as_deref(), &reply.body);
                }
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}
