//! The article validator facade.
//!
//! One call runs through `Connecting -> Publishing -> Waiting ->
//! {Resolved | TimedOut}`; a transport error in any step ends the cycle as
//! `Failed`, closes the session, and starts the next cycle if the retry
//! policy allows. Calls are serialized: the session lock is held for the
//! whole call, wait included, so at most one call is pending at a time.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ValidatorConfig;
use crate::connection::ConnectionManager;
use crate::envelope::interpret_reply;
use crate::error::{ArticleValidationError, ConnectionError, CycleError};
use crate::publisher::RequestPublisher;
use crate::retry::RetryPolicy;
use crate::tracker::CorrelationTracker;
use crate::transport::Broker;
use crate::waiter::ResponseWaiter;

/// Step of a validation cycle, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Connecting,
    Publishing,
    Waiting,
    Resolved,
    TimedOut,
    Failed,
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Publishing => write!(f, "publishing"),
            Self::Waiting => write!(f, "waiting"),
            Self::Resolved => write!(f, "resolved"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Request/response article validation over the broker.
///
/// Owned by the service's composition root: [`open`](Self::open) at startup,
/// [`close`](Self::close) at shutdown, shared behind an `Arc` in between.
pub struct ArticleValidator {
    publisher: RequestPublisher,
    waiter: ResponseWaiter,
    retry: RetryPolicy,
    tracker: Arc<CorrelationTracker>,
    connection: Mutex<ConnectionManager>,
}

impl ArticleValidator {
    /// Create a validator; no connection is made until [`open`](Self::open) or the first call.
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, config: &ValidatorConfig) -> Self {
        let tracker = Arc::new(CorrelationTracker::new());
        Self {
            publisher: RequestPublisher::new(&config.exchange, &config.request_routing_key),
            waiter: ResponseWaiter::new(config.timeout),
            retry: RetryPolicy::new(config.max_attempts),
            connection: Mutex::new(ConnectionManager::new(
                broker,
                &config.exchange,
                Arc::clone(&tracker),
            )),
            tracker,
        }
    }

    /// Connect eagerly.
    ///
    /// # Errors
    ///
    /// Returns [`ArticleValidationError::Unavailable`] if the broker cannot be reached.
    pub async fn open(&self) -> Result<(), ArticleValidationError> {
        let mut connection = self.connection.lock().await;
        connection
            .ensure_connection()
            .await
            .map(|_| ())
            .map_err(|source| ArticleValidationError::Unavailable {
                attempts: 1,
                source,
            })
    }

    /// Close the broker session. Failures are logged, never returned.
    pub async fn close(&self) {
        self.connection.lock().await.close().await;
        info!("Article validator closed");
    }

    /// Whether a broker session is currently open.
    ///
    /// Waits for any in-flight call to finish.
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_connected()
    }

    /// Ask the catalog about an article and return its raw reply.
    ///
    /// # Errors
    ///
    /// - [`ArticleValidationError::Timeout`] if no matching reply arrives in time
    /// - [`ArticleValidationError::Unavailable`] if every attempt failed on transport errors
    pub async fn validate(
        &self,
        article_id: &str,
        reference_id: &str,
    ) -> Result<Value, ArticleValidationError> {
        let mut connection = self.connection.lock().await;
        let mut retry = self.retry.state();
        let mut last_error = ConnectionError::NotConnected;

        while let Some(attempt) = retry.next_attempt() {
            match self.run_cycle(&mut connection, article_id, reference_id).await {
                Ok(reply) => return Ok(reply),
                Err(CycleError::TimedOut) => {
                    warn!(
                        article_id,
                        attempt,
                        timeout_ms = self.waiter.timeout().as_millis(),
                        "Article validation timed out"
                    );
                    return Err(ArticleValidationError::Timeout {
                        timeout: self.waiter.timeout(),
                    });
                }
                Err(CycleError::Transport(err)) => {
                    warn!(
                        article_id,
                        attempt,
                        error = %err,
                        "Article validation cycle failed, resetting connection"
                    );
                    connection.close().await;
                    last_error = err;
                }
            }
        }

        Err(ArticleValidationError::Unavailable {
            attempts: retry.attempts(),
            source: last_error,
        })
    }

    /// Validate an article and return the catalog's verdict.
    ///
    /// # Errors
    ///
    /// Everything [`validate`](Self::validate) returns, plus
    /// [`ArticleValidationError::ArticleInvalid`] when the catalog rejects the article.
    pub async fn validate_article(
        &self,
        article_id: &str,
        reference_id: &str,
    ) -> Result<Value, ArticleValidationError> {
        let response = self.validate(article_id, reference_id).await?;
        interpret_reply(response, article_id)
    }

    async fn run_cycle(
        &self,
        connection: &mut ConnectionManager,
        article_id: &str,
        reference_id: &str,
    ) -> Result<Value, CycleError> {
        debug!(phase = %CallPhase::Connecting, article_id, "Validation cycle started");
        let session = connection
            .ensure_connection()
            .await
            .inspect_err(|_| debug!(phase = %CallPhase::Failed, "Connect failed"))?;

        let started = Instant::now();
        let message = self
            .publisher
            .build(session.reply_queue(), article_id, reference_id)?;
        let reply = self
            .tracker
            .register(message.correlation_id.clone(), session.reply_queue());

        debug!(phase = %CallPhase::Publishing, correlation_id = %message.correlation_id);
        if let Err(err) = self.publisher.publish(session, &message).await {
            self.tracker.abandon(&message.correlation_id);
            debug!(
                phase = %CallPhase::Failed,
                correlation_id = %message.correlation_id,
                "Publish failed"
            );
            return Err(err.into());
        }

        debug!(phase = %CallPhase::Waiting, correlation_id = %message.correlation_id);
        let result = self.waiter.wait(started, reply).await;
        self.tracker.abandon(&message.correlation_id);

        let phase = match &result {
            Ok(_) => CallPhase::Resolved,
            Err(CycleError::TimedOut) => CallPhase::TimedOut,
            Err(CycleError::Transport(_)) => CallPhase::Failed,
        };
        debug!(
            phase = %phase,
            correlation_id = %message.correlation_id,
            "Validation cycle finished"
        );
        result
    }
}
