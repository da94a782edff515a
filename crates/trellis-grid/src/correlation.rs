//! Pending-answer table — links outbound delivers to their eventual answers.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;

use trellis_core::protocol::{AnswerResult, CorrelationId};

/// Calls awaiting an answer, keyed by correlation.
pub struct CorrelationTable {
    pending: DashMap<CorrelationId, oneshot::Sender<AnswerResult>>,
    next: AtomicU64,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::with_seed(1)
    }

    /// Seed the id counter, so routers sharing a process in tests do not
    /// hand out overlapping correlations.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            pending: DashMap::new(),
            next: AtomicU64::new(seed),
        }
    }

    /// Allocate a correlation and the receiver its answer will complete.
    pub fn register(&self) -> (CorrelationId, oneshot::Receiver<AnswerResult>) {
        let id = CorrelationId(self.next.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        (id, rx)
    }

    /// Complete a pending call. An unmatched correlation is dropped — the
    /// caller has likely timed out already — and reported as `false`.
    pub fn complete(&self, correlation: CorrelationId, result: AnswerResult) -> bool {
        match self.pending.remove(&correlation) {
            Some((_, tx)) => {
                // The caller may have dropped the receiver; that is its
                // way of abandoning the call.
                let _ = tx.send(result);
                true
            }
            None => {
                tracing::debug!(correlation = %correlation, "answer with no pending call, dropping");
                false
            }
        }
    }

    /// Caller gave up waiting. Idempotent.
    pub fn abandon(&self, correlation: CorrelationId) {
        self.pending.remove(&correlation);
    }

    /// Drop registrations whose caller dropped the receiver. Returns how
    /// many were purged. Without this, an abandoned remote call would
    /// leave its sender in the map forever.
    pub fn purge_closed(&self) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, tx| !tx.is_closed());
        let purged = before.saturating_sub(self.pending.len());
        if purged > 0 {
            tracing::debug!(purged, "purged correlations with dropped receivers");
        }
        purged
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}
