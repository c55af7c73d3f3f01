//! Per-document processing failure counters gating the manual-entry bypass.
//!
//! Best-effort: counts live in memory and are lost on restart. The audit
//! trail, not this counter, is the record of what happened.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

/// Exhausted processing attempts before manual entry unlocks.
pub const BYPASS_THRESHOLD: u32 = 3;

pub trait FailureTracker: Send + Sync {
    /// Increment and return the new count.
    fn record_failure(&self, document_id: &Uuid) -> u32;
    fn failure_count(&self, document_id: &Uuid) -> u32;
    fn reset(&self, document_id: &Uuid);

    fn bypass_unlocked(&self, document_id: &Uuid) -> bool {
        self.failure_count(document_id) >= BYPASS_THRESHOLD
    }
}

#[derive(Debug, Default)]
pub struct InMemoryFailureTracker {
    counts: Mutex<HashMap<Uuid, u32>>,
}

impl InMemoryFailureTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FailureTracker for InMemoryFailureTracker {
    fn record_failure(&self, document_id: &Uuid) -> u32 {
        // Poisoning is ignored; counts are advisory.
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let count = counts.entry(*document_id).or_insert(0);
        *count += 1;
        *count
    }

    fn failure_count(&self, document_id: &Uuid) -> u32 {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.get(document_id).copied().unwrap_or(0)
    }

    fn reset(&self, document_id: &Uuid) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.remove(document_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_document() {
        let tracker = InMemoryFailureTracker::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(tracker.record_failure(&a), 1);
        assert_eq!(tracker.record_failure(&a), 2);
        assert_eq!(tracker.failure_count(&b), 0);
    }

    #[test]
    fn bypass_unlocks_at_threshold() {
        let tracker = InMemoryFailureTracker::new();
        let doc = Uuid::new_v4();
        for _ in 0..BYPASS_THRESHOLD - 1 {
            tracker.record_failure(&doc);
        }
        assert!(!tracker.bypass_unlocked(&doc));
        tracker.record_failure(&doc);
        assert!(tracker.bypass_unlocked(&doc));
    }

    #[test]
    fn reset_clears_count() {
        let tracker = InMemoryFailureTracker::new();
        let doc = Uuid::new_v4();
        tracker.record_failure(&doc);
        tracker.reset(&doc);
        assert_eq!(tracker.failure_count(&doc), 0);
    }
}
