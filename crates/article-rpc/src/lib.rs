//! Article validation over a message broker.
//!
//! Turns the broker's fire-and-forget publish/subscribe model into a
//! request/response call: every request carries a fresh correlation id and
//! the name of a private reply queue, and the caller waits (bounded by a
//! deadline) for the reply that echoes that id.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: lazily (re)opens the broker session and reply queue
//! - [`CorrelationTracker`]: matches inbound replies against the pending call
//! - [`RequestPublisher`]: builds and publishes the request envelope
//! - [`ResponseWaiter`]: awaits the matching reply until the deadline
//! - [`RetryPolicy`]: reconnect-and-retry on transport failure
//! - [`ArticleValidator`]: the facade composing all of the above behind a lock
//!
//! The wire client sits behind the [`Broker`] / [`BrokerSession`] traits.
//! [`AmqpBroker`] talks to RabbitMQ; [`InMemoryBroker`] scripts replies for
//! local runs and tests.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod amqp;
mod config;
mod connection;
mod envelope;
mod error;
pub mod memory;
mod publisher;
mod retry;
mod tracker;
mod transport;
mod validator;
mod waiter;

pub use amqp::AmqpBroker;
pub use config::ValidatorConfig;
pub use connection::ConnectionManager;
pub use envelope::{ArticleQuery, CorrelationId, RequestEnvelope, interpret_reply, is_truthy};
pub use error::{ArticleValidationError, ConnectionError};
pub use memory::{InMemoryBroker, ScriptedReply};
pub use publisher::RequestPublisher;
pub use retry::{RetryPolicy, RetryState};
pub use tracker::{CorrelationTracker, DeliveryOutcome};
pub use transport::{Broker, BrokerSession, OutboundMessage};
pub use validator::{ArticleValidator, CallPhase};
pub use waiter::ResponseWaiter;

/// Exchange that carries both article requests and their replies.
pub const ARTICLE_EXCHANGE: &str = "article_exist";

/// Routing key the catalog service listens on.
pub const ARTICLE_ROUTING_KEY: &str = "article_exist";

/// Content type stamped on every published request.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// AMQP delivery mode 1: the broker may drop the message on restart.
pub const NON_PERSISTENT_DELIVERY: u8 = 1;
