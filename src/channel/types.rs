use crate::config::ChannelConfig;
use crate::connector::Connector;
use crate::metrics::{CallRate, DecayedAverage, Metric, MetricRegistry, StatusCounter, DEFAULT_SAMPLE_SIZE};
use crate::probe::PathMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The metric family owned by one channel, created at install time and
/// deleted by identity at teardown.
pub struct ChannelMetrics {
    pub send: Arc<DecayedAverage>,
    pub sync: Arc<DecayedAverage>,
    pub async_fast: Arc<DecayedAverage>,
    pub async_max: Arc<DecayedAverage>,
    pub rps: Arc<CallRate>,
    pub status: Arc<StatusCounter>,
    pub timeouts: Arc<StatusCounter>,
    entries: Vec<(String, Metric)>,
}

impl ChannelMetrics {
    /// Build the family without touching the registry; `install` commits it.
    pub fn new(channel: &str, interval_secs: u64) -> Self {
        let rate_per_minute = 60.0 / interval_secs.max(1) as f64;
        let average = || Arc::new(DecayedAverage::new(rate_per_minute, DEFAULT_SAMPLE_SIZE));

        let send = average();
        let sync = average();
        let async_fast = average();
        let async_max = average();
        let rps = Arc::new(CallRate::new());
        let status = Arc::new(StatusCounter::new());
        let timeouts = Arc::new(StatusCounter::new());

        let prefix = format!("connector.{channel}");
        let entries = vec![
            (format!("{prefix}.send"), Metric::Average(send.clone())),
            (format!("{prefix}.sync"), Metric::Average(sync.clone())),
            (format!("{prefix}.async"), Metric::Average(async_fast.clone())),
            (
                format!("{prefix}.async_max"),
                Metric::Average(async_max.clone()),
            ),
            (format!("{prefix}.rps"), Metric::CallRate(rps.clone())),
            (format!("{prefix}.status"), Metric::Status(status.clone())),
            (format!("{prefix}.timeouts"), Metric::Status(timeouts.clone())),
        ];

        Self {
            send,
            sync,
            async_fast,
            async_max,
            rps,
            status,
            timeouts,
            entries,
        }
    }

    pub fn install(&self, registry: &MetricRegistry) {
        for (name, metric) in &self.entries {
            registry.insert(name, metric.clone());
        }
    }

    /// Delete-by-identity, so a reload that already replaced a same-named
    /// metric is left alone.
    pub fn delete(&self, registry: &MetricRegistry) {
        for (name, metric) in &self.entries {
            registry.delete(name, metric);
        }
    }

    pub fn path_metrics(&self) -> PathMetrics {
        PathMetrics::new(
            self.send.clone(),
            self.sync.clone(),
            self.async_fast.clone(),
            self.async_max.clone(),
            self.timeouts.clone(),
        )
    }
}

/// One live monitored channel.
pub struct Channel {
    pub name: String,
    pub config: ChannelConfig,
    pub connector: Arc<dyn Connector>,
    pub metrics: ChannelMetrics,
    active: AtomicBool,
}

impl Channel {
    pub fn new(
        name: String,
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
        metrics: ChannelMetrics,
    ) -> Self {
        Self {
            name,
            config,
            connector,
            metrics,
            active: AtomicBool::new(true),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Soft cancel: the channel's timer keeps firing but ticks become
    /// no-ops; in-flight probes still complete or time out.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}
