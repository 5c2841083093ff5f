//! Error types for broker-backed article validation.

use std::time::Duration;

/// Transport-level failure talking to the broker.
///
/// Never escapes [`ArticleValidator::validate`](crate::ArticleValidator::validate):
/// it only triggers a reconnect-and-retry cycle, and is kept as the source of
/// [`ArticleValidationError::Unavailable`] once retries run out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The broker refused or dropped the connection attempt.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Channel, exchange, queue or consumer setup failed.
    #[error("Channel error: {0}")]
    Channel(String),

    /// The publish call was rejected by the transport.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// The reply consumer stopped while a call was waiting.
    #[error("Connection lost while awaiting reply")]
    Lost,

    /// No session is open.
    #[error("Not connected")]
    NotConnected,
}

/// Domain failure of an article validation call.
#[derive(Debug, thiserror::Error)]
pub enum ArticleValidationError {
    /// No matching reply arrived before the deadline.
    #[error("Timed out validating article against catalog after {timeout:?}")]
    Timeout {
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// Every attempt failed on transport errors.
    #[error("Could not establish connection to the broker after {attempts} attempt(s)")]
    Unavailable {
        /// Number of cycles attempted.
        attempts: u32,
        /// Transport failure of the last cycle.
        #[source]
        source: ConnectionError,
    },

    /// The catalog replied that the article does not exist or is disabled.
    #[error("Article {article_id} does not exist or is disabled")]
    ArticleInvalid {
        /// Article that was rejected.
        article_id: String,
    },
}

impl ArticleValidationError {
    /// Whether the failure is about reaching the catalog rather than the article itself.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }
}

/// Outcome of one failed connect/publish/wait cycle.
#[derive(Debug)]
pub(crate) enum CycleError {
    Transport(ConnectionError),
    TimedOut,
}

impl From<ConnectionError> for CycleError {
    fn from(err: ConnectionError) -> Self {
        Self::Transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        assert_eq!(
            ConnectionError::Connect("refused".to_string()).to_string(),
            "Connection failed: refused"
        );
        assert_eq!(
            ArticleValidationError::ArticleInvalid {
                article_id: "A-1".to_string()
            }
            .to_string(),
            "Article A-1 does not exist or is disabled"
        );
        assert!(
            ArticleValidationError::Unavailable {
                attempts: 2,
                source: ConnectionError::Lost,
            }
            .to_string()
            .contains("Could not establish connection to the broker")
        );
    }

    #[test]
    fn test_unavailable_classification() {
        let timeout = ArticleValidationError::Timeout {
            timeout: Duration::from_secs(5),
        };
        let invalid = ArticleValidationError::ArticleInvalid {
            article_id: "A-1".to_string(),
        };

        assert!(timeout.is_unavailable());
        assert!(!invalid.is_unavailable());
    }
}
