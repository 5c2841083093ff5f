//! Wire shapes of requests and replies, and reply interpretation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::ArticleValidationError;

/// Opaque token pairing a request with its reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The article being asked about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleQuery {
    pub reference_id: String,
    pub article_id: String,
}

/// Body of every published request.
///
/// `exchange` and `routing_key` tell the responder where to send the reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub correlation_id: CorrelationId,
    pub exchange: String,
    pub routing_key: String,
    pub message: ArticleQuery,
}

/// Correlation id of an inbound reply.
///
/// Message metadata wins; a `correlation_id` field in the body is the fallback.
pub(crate) fn reply_correlation_id<'a>(
    metadata: Option<&'a str>,
    payload: &'a Value,
) -> Option<&'a str> {
    metadata
        .filter(|id| !id.is_empty())
        .or_else(|| payload.get("correlation_id").and_then(Value::as_str))
}

/// Truthiness of a JSON value: `null`, `false`, zero and empty values are falsy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// Unwrap the catalog reply and check its verdict.
///
/// The verdict lives under `message`; a reply without a truthy `message` is
/// read as the verdict itself. A missing or falsy `valid` flag rejects the
/// article.
///
/// # Errors
///
/// Returns [`ArticleValidationError::ArticleInvalid`] when the article is not valid.
pub fn interpret_reply(response: Value, article_id: &str) -> Result<Value, ArticleValidationError> {
    let message = response
        .get("message")
        .filter(|message| is_truthy(message))
        .cloned()
        .unwrap_or(response);

    if message.get("valid").is_some_and(is_truthy) {
        Ok(message)
    } else {
        Err(ArticleValidationError::ArticleInvalid {
            article_id: article_id.to_string(),
        })
    }
}
