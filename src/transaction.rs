//! Transaction sequencer — per-session monotonic transaction ids.
//!
//! DESIGN
//! ======
//! Every outbound synchronization response is stamped with a freshly issued
//! transaction id, and every inbound client message must carry the id it was
//! generated against. A mismatch means the message came from a superseded
//! view of server state (a second browser tab, a retried request) and is
//! rejected before any mutation happens. Ids start at 0, only increase, and
//! are never reused while the session lives.

use std::sync::atomic::{AtomicU64, Ordering};

/// Inbound message carried a transaction id that does not match the
/// session's current value. The message is dropped without mutation; the
/// client is expected to resynchronize.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("stale transaction id {claimed} (current {current})")]
pub struct StaleTransaction {
    pub claimed: u64,
    pub current: u64,
}

// =============================================================================
// SEQUENCER
// =============================================================================

#[derive(Debug, Default)]
pub struct TransactionSequencer {
    counter: AtomicU64,
}

impl TransactionSequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically increment the counter and return the new value.
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The last issued value, without mutation.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Check an inbound message's claimed transaction id against the current
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`StaleTransaction`] on mismatch. Does not mutate the counter.
    pub fn validate(&self, claimed: u64) -> Result<(), StaleTransaction> {
        let current = self.current();
        if claimed == current {
            Ok(())
        } else {
            Err(StaleTransaction { claimed, current })
        }
    }
}

#[cfg(test)]
#[path = "transaction_test.rs"]
mod tests;
