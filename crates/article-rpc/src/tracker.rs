//! Correlation of inbound replies with the pending call.
//!
//! At most one call is pending per validator. The reply slot is a oneshot
//! channel: the first matching delivery resolves it, everything else is
//! dropped without touching the pending call.

use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::debug;

use crate::envelope::{CorrelationId, reply_correlation_id};

/// What happened to one inbound delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The delivery resolved the pending call.
    Resolved,
    /// A call is pending but the delivery carries another (or no) id.
    Mismatched,
    /// Nothing was waiting for a reply.
    NoPendingCall,
    /// The body is not JSON.
    Malformed,
}

struct PendingCall {
    id: CorrelationId,
    /// Reply queue of the session the request went out on.
    reply_queue: String,
    slot: oneshot::Sender<Value>,
}

/// Matches replies against the single in-flight call.
#[derive(Default)]
pub struct CorrelationTracker {
    pending: Mutex<Option<PendingCall>>,
}

impl CorrelationTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id`, published on `reply_queue`, as the pending call and hand
    /// back its reply slot.
    ///
    /// Any previously pending call is discarded; its receiver observes a
    /// closed channel.
    pub fn register(&self, id: CorrelationId, reply_queue: &str) -> oneshot::Receiver<Value> {
        let (slot, receiver) = oneshot::channel();
        let call = PendingCall {
            id,
            reply_queue: reply_queue.to_string(),
            slot,
        };
        if let Some(previous) = self.lock().replace(call) {
            debug!(correlation_id = %previous.id, "Discarding superseded pending call");
        }
        receiver
    }

    /// Drop the pending call if it is still `id`.
    pub fn abandon(&self, id: &CorrelationId) {
        let mut pending = self.lock();
        if pending.as_ref().is_some_and(|call| call.id == *id) {
            *pending = None;
        }
    }

    /// The session owning `reply_queue` went away: drop the pending call if
    /// it was published there, so its waiter sees a lost connection.
    ///
    /// Calls registered on any other session are left alone. Returns whether
    /// a call was failed.
    pub fn fail_pending(&self, reply_queue: &str) -> bool {
        let mut pending = self.lock();
        match pending.take() {
            Some(call) if call.reply_queue == reply_queue => {
                debug!(
                    correlation_id = %call.id,
                    reply_queue,
                    "Failing pending call after transport loss"
                );
                true
            }
            other => {
                *pending = other;
                false
            }
        }
    }

    /// Id of the call currently waiting for a reply.
    #[must_use]
    pub fn pending_id(&self) -> Option<CorrelationId> {
        self.lock().as_ref().map(|call| call.id.clone())
    }

    /// Route one inbound delivery.
    ///
    /// Non-JSON bodies and replies for other calls are discarded silently.
    pub fn handle_delivery(
        &self,
        metadata_correlation_id: Option<&str>,
        body: &[u8],
    ) -> DeliveryOutcome {
        let Ok(payload) = serde_json::from_slice::<Value>(body) else {
            debug!(bytes = body.len(), "Discarding non-JSON reply");
            return DeliveryOutcome::Malformed;
        };

        let incoming = reply_correlation_id(metadata_correlation_id, &payload).map(str::to_owned);

        let mut pending = self.lock();
        let matches = match pending.as_ref() {
            None => {
                debug!(correlation_id = ?incoming, "Discarding reply with no pending call");
                return DeliveryOutcome::NoPendingCall;
            }
            Some(call) => incoming.as_deref() == Some(call.id.as_str()),
        };

        if !matches {
            debug!(correlation_id = ?incoming, "Discarding reply for another call");
            return DeliveryOutcome::Mismatched;
        }

        match pending.take() {
            Some(call) => {
                // The waiter may already have given up; that is not an error.
                let _ = call.slot.send(payload);
                DeliveryOutcome::Resolved
            }
            None => DeliveryOutcome::NoPendingCall,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
