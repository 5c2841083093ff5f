//! Reconnect-and-retry policy for validation calls.
//!
//! Only transport failures are retried, and immediately: the retry exists to
//! replace a dead connection, not to wait out an overloaded catalog. A timed
//! out call is never retried.

const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connect/publish/wait cycles allowed per call
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` cycles (at least one).
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Create a retry state for tracking attempts.
    #[must_use]
    pub const fn state(&self) -> RetryState {
        RetryState::new(*self)
    }
}

/// Attempt counter for one call.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of attempts started so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Check if another attempt is available.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.attempt < self.policy.max_attempts
    }

    /// Start the next attempt, returning its 1-based number.
    ///
    /// Returns None once the policy is exhausted.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if !self.can_retry() {
            return None;
        }
        self.attempt = self.attempt.saturating_add(1);
        Some(self.attempt)
    }
}
