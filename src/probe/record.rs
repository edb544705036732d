use crate::metrics::{DecayedAverage, StatusCounter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One of the four completion paths measured per probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePath {
    Send,
    Sync,
    Async,
    AsyncMax,
}

impl ProbePath {
    pub fn label(&self) -> &'static str {
        match self {
            ProbePath::Send => "send",
            ProbePath::Sync => "sync",
            ProbePath::Async => "async",
            ProbePath::AsyncMax => "async_max",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Duration metrics for the four paths plus the channel's timeout tally.
#[derive(Clone)]
pub struct PathMetrics {
    durations: [Arc<DecayedAverage>; 4],
    timeouts: Arc<StatusCounter>,
}

impl PathMetrics {
    pub fn new(
        send: Arc<DecayedAverage>,
        sync: Arc<DecayedAverage>,
        r#async: Arc<DecayedAverage>,
        async_max: Arc<DecayedAverage>,
        timeouts: Arc<StatusCounter>,
    ) -> Self {
        Self {
            durations: [send, sync, r#async, async_max],
            timeouts,
        }
    }
}

/// One in-flight probe: the correlation key, its channel, the start
/// timestamp and the at-most-once state of each completion path.
pub struct ProbeRecord {
    value: u64,
    channel: String,
    started: Instant,
    fired: [AtomicBool; 4],
    metrics: PathMetrics,
}

impl ProbeRecord {
    pub fn new(value: u64, channel: &str, metrics: PathMetrics) -> Self {
        Self {
            value,
            channel: channel.to_string(),
            started: Instant::now(),
            fired: Default::default(),
            metrics,
        }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Fire one completion path. The first call wins, natural or forced;
    /// every later call for the same path is a silent no-op. A natural
    /// completion records the elapsed duration, a forced timeout records a
    /// timeout tally instead.
    pub fn complete(&self, path: ProbePath, timed_out: bool) {
        if self.fired[path.index()].swap(true, Ordering::SeqCst) {
            return;
        }
        if timed_out {
            warn!(
                "probe {} on {} timed out on {} path",
                self.value,
                self.channel,
                path.label()
            );
            self.metrics.timeouts.observe(path.label());
        } else {
            let elapsed = self.started.elapsed().as_secs_f64();
            debug!(
                "probe {} on {} completed {} path in {:.3}s",
                self.value,
                self.channel,
                path.label(),
                elapsed
            );
            self.metrics.durations[path.index()].record(elapsed);
        }
    }

    /// Forced completion of every path that never resolved, invoked once,
    /// `max_wait` after probe creation. Sync is only swept when the channel
    /// actually uses the synchronous read-back path.
    pub fn force_timeout(&self, sync_requested: bool) {
        self.complete(ProbePath::Send, true);
        self.complete(ProbePath::Async, true);
        self.complete(ProbePath::AsyncMax, true);
        if sync_requested {
            self.complete(ProbePath::Sync, true);
        }
    }

    pub fn has_fired(&self, path: ProbePath) -> bool {
        self.fired[path.index()].load(Ordering::SeqCst)
    }
}
