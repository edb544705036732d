use crate::channel::types::{Channel, ChannelMetrics};
use crate::config::{ChannelConfig, ConfigError, ConfigResult};
use crate::connector::{BuildContext, ConnectorFactory, TokenProvider};
use crate::metrics::{CallRate, MetricRegistry};
use crate::probe::{CorrelationMap, ProbeRecord};
use crate::scheduler::{self, TimerHandle};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Global probe launch rate across all channels.
const GLOBAL_RPS_METRIC: &str = "rps";

struct ChannelRuntime {
    channel: Arc<Channel>,
    timer: Mutex<Option<TimerHandle>>,
    init: Mutex<Option<JoinHandle<()>>>,
}

/// Holds the active channel set and wires each channel to a scheduler timer,
/// the correlation map and its metric family.
///
/// `replace` swaps the whole set atomically: the old channels are
/// deactivated, their connectors deinitialized (deferred while still
/// initializing) and their metrics deleted by identity.
pub struct ChannelRegistry {
    metrics: Arc<MetricRegistry>,
    correlation: Arc<CorrelationMap>,
    factory: ConnectorFactory,
    tokens: TokenProvider,
    /// Monotonically increasing probe value, unique across the process.
    value_counter: Arc<AtomicU64>,
    rps: Arc<CallRate>,
    active: RwLock<Vec<Arc<ChannelRuntime>>>,
}

impl ChannelRegistry {
    pub fn new(
        metrics: Arc<MetricRegistry>,
        tokens: TokenProvider,
        factory: ConnectorFactory,
    ) -> Self {
        let rps = metrics.create_call_rate(GLOBAL_RPS_METRIC);
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            metrics,
            correlation: Arc::new(CorrelationMap::new()),
            factory,
            tokens,
            value_counter: Arc::new(AtomicU64::new(seed)),
            rps,
            active: RwLock::new(Vec::new()),
        }
    }

    pub fn correlation(&self) -> Arc<CorrelationMap> {
        self.correlation.clone()
    }

    /// Current channel configurations, keyed by channel name.
    pub fn configs(&self) -> BTreeMap<String, ChannelConfig> {
        self.active
            .read()
            .iter()
            .map(|rt| (rt.channel.name.clone(), rt.channel.config.clone()))
            .collect()
    }

    /// Replace the active channel set. Validation happens up front; on any
    /// failure the running set is left untouched.
    pub fn replace(&self, mut configs: BTreeMap<String, ChannelConfig>) -> ConfigResult<()> {
        if configs.is_empty() {
            return Err(ConfigError::EmptyChannelSet);
        }
        for config in configs.values_mut() {
            config.normalize();
        }

        let mut built = Vec::new();
        for (name, config) in &configs {
            let metrics = ChannelMetrics::new(name, config.interval);
            let ctx = BuildContext {
                correlation: self.correlation.clone(),
                tokens: self.tokens.clone(),
                status: metrics.status.clone(),
            };
            let connector = self.factory.build(name, config, &ctx)?;
            built.push(Arc::new(Channel::new(
                name.clone(),
                config.clone(),
                connector,
                metrics,
            )));
        }

        let new_runtimes: Vec<Arc<ChannelRuntime>> = built
            .iter()
            .map(|channel| {
                Arc::new(ChannelRuntime {
                    channel: channel.clone(),
                    timer: Mutex::new(None),
                    init: Mutex::new(None),
                })
            })
            .collect();

        let old = {
            let mut active = self.active.write();
            std::mem::replace(&mut *active, new_runtimes.clone())
        };
        for runtime in old {
            self.teardown(runtime);
        }
        for runtime in new_runtimes {
            runtime.channel.metrics.install(&self.metrics);
            self.install(runtime);
        }
        Ok(())
    }

    fn install(&self, runtime: Arc<ChannelRuntime>) {
        let channel = runtime.channel.clone();
        let tick = self.make_tick(channel.clone());
        let interval = Duration::from_secs(channel.config.interval);
        let target = runtime.clone();
        let init = tokio::spawn(async move {
            match channel.connector.initialize().await {
                Ok(()) => {
                    if !channel.is_active() {
                        return;
                    }
                    info!(
                        "channel {} ready, probing every {}s",
                        channel.name,
                        interval.as_secs()
                    );
                    *target.timer.lock() = Some(scheduler::schedule(interval, tick));
                }
                Err(e) => {
                    warn!("channel {}: initialization abandoned: {}", channel.name, e);
                }
            }
        });
        *runtime.init.lock() = Some(init);
    }

    /// One probe cycle: allocate a value, register the correlation record,
    /// hand it to the connector, and arm the timeout sweep.
    fn make_tick(&self, channel: Arc<Channel>) -> impl Fn() + Send + 'static {
        let correlation = self.correlation.clone();
        let value_counter = self.value_counter.clone();
        let global_rps = self.rps.clone();
        move || {
            if !channel.is_active() {
                return;
            }
            let value = value_counter.fetch_add(1, Ordering::SeqCst) + 1;
            let use_sync = channel.config.uses_sync_path();
            let record = Arc::new(ProbeRecord::new(
                value,
                &channel.name,
                channel.metrics.path_metrics(),
            ));
            correlation.register(record.clone(), channel.config.receivers);
            global_rps.on_call();
            channel.metrics.rps.on_call();

            let connector = channel.connector.clone();
            let publish_record = record.clone();
            tokio::spawn(async move {
                connector.send_and_receive(publish_record, use_sync).await;
            });

            let max_wait = Duration::from_secs(channel.config.max_wait);
            let sweep_map = correlation.clone();
            tokio::spawn(async move {
                tokio::time::sleep(max_wait).await;
                sweep_map.discard(record.value());
                record.force_timeout(use_sync);
            });
        }
    }

    fn teardown(&self, runtime: Arc<ChannelRuntime>) {
        runtime.channel.deactivate();
        // Closing first lets a connector still retrying bootstrap bail out,
        // so the deferred deinitialize below cannot wait forever.
        runtime.channel.connector.close();
        let registry = self.metrics.clone();
        tokio::spawn(async move {
            // Deinitialize is deferred, not forced, while the connector's
            // initialization is still pending.
            let init = runtime.init.lock().take();
            if let Some(init) = init {
                let _ = init.await;
            }
            let timer = runtime.timer.lock().take();
            if let Some(timer) = timer {
                timer.cancel();
            }
            runtime.channel.connector.deinitialize().await;
            runtime.channel.metrics.delete(&registry);
            info!("channel {} decommissioned", runtime.channel.name);
        });
    }
}
