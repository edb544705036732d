use crate::metrics::average::{DecayedAverage, DEFAULT_SAMPLE_SIZE};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

// The inner decayed average receives one sample per second.
const SAMPLES_PER_MINUTE: f64 = 60.0;

struct CallRateState {
    tally: u64,
    last_flush: Instant,
}

/// Converts discrete call events into a calls-per-second series fed into a
/// decayed-average metric.
///
/// The tally is flushed lazily: for every whole second elapsed since the last
/// flush one sample is emitted, the accumulated tally for the first second
/// and a zero for each further elapsed second.
pub struct CallRate {
    average: DecayedAverage,
    state: Mutex<CallRateState>,
}

impl Default for CallRate {
    fn default() -> Self {
        Self::new()
    }
}

impl CallRate {
    pub fn new() -> Self {
        Self {
            average: DecayedAverage::new(SAMPLES_PER_MINUTE, DEFAULT_SAMPLE_SIZE),
            state: Mutex::new(CallRateState {
                tally: 0,
                last_flush: Instant::now(),
            }),
        }
    }

    pub fn on_call(&self) {
        let mut state = self.state.lock();
        self.flush_locked(&mut state);
        state.tally += 1;
    }

    pub fn dump(&self) -> Map<String, Value> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state);
        self.average.dump()
    }

    /// Samples emitted so far (test hook).
    pub fn samples(&self) -> u64 {
        self.average.count()
    }

    fn flush_locked(&self, state: &mut CallRateState) {
        let elapsed = state.last_flush.elapsed().as_secs();
        if elapsed == 0 {
            return;
        }
        self.average.record(state.tally as f64);
        for _ in 1..elapsed {
            self.average.record(0.0);
        }
        state.tally = 0;
        state.last_flush += Duration::from_secs(elapsed);
    }
}

/// Mapping from status label to occurrence count, created lazily on first
/// occurrence. Dumped as `status_<label>: count`.
#[derive(Default)]
pub struct StatusCounter {
    counts: Mutex<HashMap<String, u64>>,
}

impl StatusCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, label: &str) {
        *self.counts.lock().entry(label.to_string()).or_insert(0) += 1;
    }

    pub fn count_for(&self, label: &str) -> u64 {
        self.counts.lock().get(label).copied().unwrap_or(0)
    }

    pub fn dump(&self) -> Map<String, Value> {
        self.counts
            .lock()
            .iter()
            .map(|(label, count)| (format!("status_{label}"), Value::from(*count)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_call_rate_emits_one_sample_per_second() {
        let rate = CallRate::new();
        rate.on_call();
        rate.on_call();
        rate.on_call();
        assert_eq!(rate.samples(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        let dump = rate.dump();
        assert_eq!(dump["count"], Value::from(1));
        assert_eq!(dump["last"], Value::from(3.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_rate_catch_up_pads_with_zeros() {
        let rate = CallRate::new();
        rate.on_call();
        tokio::time::advance(Duration::from_secs(5)).await;

        // One sample for the burst second, four zero samples after it.
        let dump = rate.dump();
        assert_eq!(dump["count"], Value::from(5));
        assert_eq!(dump["last"], Value::from(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_rate_resets_tally_after_flush() {
        let rate = CallRate::new();
        rate.on_call();
        tokio::time::advance(Duration::from_secs(1)).await;
        rate.on_call();
        tokio::time::advance(Duration::from_secs(1)).await;

        let dump = rate.dump();
        assert_eq!(dump["count"], Value::from(2));
        assert_eq!(dump["last"], Value::from(1.0));
    }

    #[test]
    fn test_status_counter_counts_per_label() {
        let counter = StatusCounter::new();
        counter.observe("200");
        counter.observe("200");
        counter.observe("503");

        assert_eq!(counter.count_for("200"), 2);
        assert_eq!(counter.count_for("503"), 1);
        assert_eq!(counter.count_for("404"), 0);

        let dump = counter.dump();
        assert_eq!(dump["status_200"], Value::from(2));
        assert_eq!(dump["status_503"], Value::from(1));
    }
}
