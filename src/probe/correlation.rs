use crate::probe::record::{ProbePath, ProbeRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

struct Pending {
    expected: u32,
    remaining: u32,
    record: Arc<ProbeRecord>,
}

/// Shared map from probe value to its outstanding async receiver count.
///
/// Every observation reported by any receiver for any probe goes through
/// here: the first observation fires the "async" (fastest) path, the last
/// expected one fires "async-max" (slowest) and drops the entry. This is the
/// one place in the core that needs a lock, because independent receiver
/// tasks mutate the counts concurrently.
#[derive(Default)]
pub struct CorrelationMap {
    pending: Mutex<HashMap<u64, Pending>>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the async expectation for a freshly launched probe.
    pub fn register(&self, record: Arc<ProbeRecord>, receivers: u32) {
        let expected = receivers.max(1);
        self.pending.lock().insert(
            record.value(),
            Pending {
                expected,
                remaining: expected,
                record,
            },
        );
    }

    /// Report one receiver's observation of a probe value. Observations for
    /// unknown or already-resolved values are anomalies (duplicate or late
    /// delivery), logged and ignored.
    pub fn observe(&self, value: u64) {
        let mut pending = self.pending.lock();
        let Some(entry) = pending.get_mut(&value) else {
            warn!("observation for unknown or already resolved probe {value}");
            return;
        };
        if entry.remaining == entry.expected {
            entry.record.complete(ProbePath::Async, false);
        }
        entry.remaining -= 1;
        if entry.remaining == 0 {
            let record = entry.record.clone();
            pending.remove(&value);
            record.complete(ProbePath::AsyncMax, false);
        }
    }

    /// Drop the async expectation for a probe without firing anything, used
    /// when publish failed or the timeout sweep ran.
    pub fn discard(&self, value: u64) -> bool {
        self.pending.lock().remove(&value).is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}
