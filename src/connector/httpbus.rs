use crate::config::{ChannelConfig, ConfigError, ConfigResult};
use crate::connector::error::{ConnectorError, ConnectorResult};
use crate::connector::factory::BuildContext;
use crate::connector::token::TokenProvider;
use crate::connector::types::{
    advance_cursors, BootstrapState, Cursor, EventBatch, PartitionInfo, ProbeEvent,
};
use crate::connector::Connector;
use crate::metrics::StatusCounter;
use crate::probe::{CorrelationMap, ProbePath, ProbeRecord};
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures::StreamExt;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::{Method, RequestBuilder, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const STREAM_CURSORS_HEADER: &str = "X-Stream-Cursors";
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const SYNC_MAX_ATTEMPTS: u32 = 100;
const SYNC_RETRY_DELAY: Duration = Duration::from_secs(1);
// Used if the backoff policy ever runs out of suggestions.
const FALLBACK_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Backend-specific slice of a channel configuration.
#[derive(Debug, Clone)]
pub struct HttpBusConfig {
    pub host: String,
    pub topic: String,
    pub verify: bool,
    pub receivers: u32,
    pub trash_size: usize,
    pub token_env: Option<String>,
}

impl HttpBusConfig {
    pub fn from_channel(name: &str, config: &ChannelConfig) -> ConfigResult<Self> {
        let host = config.host.clone().ok_or(ConfigError::MissingField {
            name: name.to_string(),
            field: "host",
        })?;
        let topic = config.topic.clone().ok_or(ConfigError::MissingField {
            name: name.to_string(),
            field: "topic",
        })?;
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            topic,
            verify: config.verify,
            receivers: config.receivers,
            trash_size: config.trash_size,
            token_env: config.token_env.clone(),
        })
    }
}

struct Inner {
    name: String,
    config: HttpBusConfig,
    client: reqwest::Client,
    tokens: TokenProvider,
    instance_id: String,
    filler: String,
    correlation: Arc<CorrelationMap>,
    status: Arc<StatusCounter>,
    /// Shared cursor set used by the synchronous read-back path.
    cursors: Mutex<Vec<Cursor>>,
    closed: AtomicBool,
    receiver_tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Adapter for an HTTP event-bus backend with REST publish/poll/stream and
/// explicit partition cursors.
pub struct HttpBusConnector {
    inner: Arc<Inner>,
}

impl HttpBusConnector {
    pub fn new(name: &str, config: &ChannelConfig, ctx: &BuildContext) -> ConfigResult<Self> {
        let bus = HttpBusConfig::from_channel(name, config)?;
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!bus.verify)
            .build()
            .map_err(|source| ConfigError::HttpClient {
                name: name.to_string(),
                source,
            })?;
        let tokens = match &bus.token_env {
            Some(var) => TokenProvider::Env(var.clone()),
            None => ctx.tokens.clone(),
        };
        Ok(Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                filler: generate_filler(bus.trash_size),
                config: bus,
                client,
                tokens,
                instance_id: uuid::Uuid::new_v4().to_string(),
                correlation: ctx.correlation.clone(),
                status: ctx.status.clone(),
                cursors: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                receiver_tasks: Mutex::new(Vec::new()),
            }),
        })
    }
}

fn generate_filler(size: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(size)
        .map(char::from)
        .collect()
}

#[async_trait]
impl Connector for HttpBusConnector {
    fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    async fn initialize(&self) -> ConnectorResult<()> {
        let inner = &self.inner;
        let mut state = BootstrapState::CheckingExists;
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        while state != BootstrapState::Ready {
            if inner.closed.load(Ordering::SeqCst) {
                return Err(ConnectorError::Closed);
            }
            let step = match state {
                BootstrapState::CheckingExists => inner.check_topic().await,
                BootstrapState::Creating => inner
                    .create_topic()
                    .await
                    .map(|_| BootstrapState::FetchingCursors),
                BootstrapState::FetchingCursors => inner.fetch_cursors().await.map(|cursors| {
                    *inner.cursors.lock() = cursors;
                    BootstrapState::StartingReceivers
                }),
                BootstrapState::StartingReceivers => {
                    start_receivers(inner);
                    Ok(BootstrapState::Ready)
                }
                BootstrapState::Ready => Ok(BootstrapState::Ready),
            };
            match step {
                Ok(next) => {
                    debug!("{}: bootstrap {:?} -> {:?}", inner.name, state, next);
                    backoff.reset();
                    state = next;
                }
                Err(e) => {
                    let delay = backoff.next_backoff().unwrap_or(FALLBACK_RETRY_DELAY);
                    warn!(
                        "{}: bootstrap step {:?} failed: {}, retrying in {:?}",
                        inner.name, state, e, delay
                    );
                    sleep(delay).await;
                }
            }
        }
        info!(
            "{}: connector for topic {} is ready",
            inner.name, inner.config.topic
        );
        Ok(())
    }

    async fn send_and_receive(&self, probe: Arc<ProbeRecord>, use_sync_path: bool) {
        let inner = &self.inner;
        match inner.publish(probe.value()).await {
            Ok(status) => {
                inner.status.observe(status.as_str());
                if status.is_success() {
                    probe.complete(ProbePath::Send, false);
                    if use_sync_path {
                        tokio::spawn(run_sync_poll(inner.clone(), probe));
                    }
                } else {
                    warn!(
                        "{}: publish of probe {} returned status {}",
                        inner.name,
                        probe.value(),
                        status
                    );
                    inner.correlation.discard(probe.value());
                }
            }
            Err(e) => {
                error!(
                    "{}: publish of probe {} failed: {}",
                    inner.name,
                    probe.value(),
                    e
                );
                inner.status.observe("error");
                inner.correlation.discard(probe.value());
            }
        }
    }

    async fn deinitialize(&self) {
        let inner = &self.inner;
        inner.closed.store(true, Ordering::SeqCst);
        for task in inner.receiver_tasks.lock().drain(..) {
            task.abort();
        }
        info!("{}: connector closed", inner.name);
    }
}

impl Inner {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.host, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        if let Some(token) = self.tokens.token() {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn check_topic(&self) -> ConnectorResult<BootstrapState> {
        let path = format!("/topics/{}", self.config.topic);
        let response = self.request(Method::GET, &path).send().await?;
        match response.status() {
            StatusCode::OK => {
                debug!("topic {} exists", self.config.topic);
                Ok(BootstrapState::FetchingCursors)
            }
            StatusCode::NOT_FOUND => Ok(BootstrapState::Creating),
            status => Err(ConnectorError::UnexpectedStatus {
                context: "topic check",
                status,
            }),
        }
    }

    async fn create_topic(&self) -> ConnectorResult<()> {
        let body = serde_json::json!({
            "name": self.config.topic,
            "owning_application": "streampulse",
            "category": "business",
            "schema": {
                "type": "json_schema",
                "title": "Schema for end-to-end latency probes",
                "schema": {
                    "properties": {
                        "value": {"type": "number"},
                        "instance_id": {"type": "string"},
                        "filler": {"type": "string"},
                    },
                    "required": ["value", "instance_id", "filler"],
                },
            },
        });
        let response = self.request(Method::POST, "/topics").json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                context: "topic creation",
                status,
            });
        }
        info!("created topic {}", self.config.topic);
        Ok(())
    }

    /// Starting cursors: every partition mapped to its newest offset, so
    /// receivers only see events published after bootstrap.
    async fn fetch_cursors(&self) -> ConnectorResult<Vec<Cursor>> {
        let path = format!("/topics/{}/partitions", self.config.topic);
        let response = self.request(Method::GET, &path).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                context: "partition listing",
                status,
            });
        }
        let partitions: Vec<PartitionInfo> = response.json().await?;
        Ok(partitions
            .into_iter()
            .map(|p| Cursor {
                partition: p.partition,
                offset: p.newest_available_offset,
            })
            .collect())
    }

    async fn publish(&self, value: u64) -> ConnectorResult<StatusCode> {
        let path = format!("/topics/{}/events", self.config.topic);
        let events = [ProbeEvent {
            value,
            instance_id: self.instance_id.clone(),
            filler: self.filler.clone(),
        }];
        let response = self.request(Method::POST, &path).json(&events).send().await?;
        Ok(response.status())
    }

    /// One streaming read: newline-delimited JSON batches until the backend
    /// closes the connection.
    async fn stream_events(&self, cursors: &mut Vec<Cursor>) -> ConnectorResult<()> {
        let path = format!("/topics/{}/events", self.config.topic);
        let response = self
            .request(Method::GET, &path)
            .query(&[("batch_limit", "1")])
            .header(STREAM_CURSORS_HEADER, serde_json::to_string(cursors)?)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                context: "event streaming",
                status,
            });
        }
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(chunk) = body.next().await {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(());
            }
            buffer.extend_from_slice(&chunk?);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                self.handle_batch_line(&line[..line.len() - 1], cursors);
            }
        }
        Ok(())
    }

    fn handle_batch_line(&self, line: &[u8], cursors: &mut [Cursor]) {
        if line.is_empty() {
            return;
        }
        let batch: EventBatch = match serde_json::from_slice(line) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("{}: dropping malformed batch line: {}", self.name, e);
                return;
            }
        };
        advance_cursors(cursors, &batch.cursor);
        for event in &batch.events {
            if event.instance_id == self.instance_id {
                self.correlation.observe(event.value);
            }
        }
    }

    /// One bounded poll with the shared cursor set.
    async fn poll_once(&self, cursors: &[Cursor]) -> ConnectorResult<EventBatch> {
        let path = format!("/topics/{}/events", self.config.topic);
        let response = self
            .request(Method::GET, &path)
            .query(&[("batch_limit", "1"), ("stream_limit", "1")])
            .header(STREAM_CURSORS_HEADER, serde_json::to_string(cursors)?)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                context: "event poll",
                status,
            });
        }
        Ok(response.json().await?)
    }
}

/// Spawn one streaming receiver per configured receiver count, each with its
/// own copy of the bootstrap cursors.
fn start_receivers(inner: &Arc<Inner>) {
    let mut tasks = inner.receiver_tasks.lock();
    for index in 0..inner.config.receivers.max(1) {
        let cursors = inner.cursors.lock().clone();
        tasks.push(tokio::spawn(run_receiver(inner.clone(), index, cursors)));
    }
}

/// Background receiver: streams events with its own cursor copy and reports
/// every matching probe value, reconnecting on any error.
async fn run_receiver(inner: Arc<Inner>, index: u32, mut cursors: Vec<Cursor>) {
    debug!("{}: receiver {} started", inner.name, index);
    while !inner.closed.load(Ordering::SeqCst) {
        if let Err(e) = inner.stream_events(&mut cursors).await {
            warn!(
                "{}: receiver {} stream failed: {}, reconnecting",
                inner.name, index, e
            );
        }
        sleep(RECONNECT_DELAY).await;
    }
}

/// Synchronous read-back: bounded poll loop over the shared cursors looking
/// for one specific probe value.
async fn run_sync_poll(inner: Arc<Inner>, probe: Arc<ProbeRecord>) {
    for _ in 0..SYNC_MAX_ATTEMPTS {
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let cursors = inner.cursors.lock().clone();
        match inner.poll_once(&cursors).await {
            Ok(batch) => {
                advance_cursors(&mut inner.cursors.lock(), &batch.cursor);
                let found = batch
                    .events
                    .iter()
                    .any(|e| e.instance_id == inner.instance_id && e.value == probe.value());
                if found {
                    probe.complete(ProbePath::Sync, false);
                    return;
                }
            }
            Err(e) => {
                warn!(
                    "{}: sync read-back for probe {} failed: {}",
                    inner.name,
                    probe.value(),
                    e
                );
            }
        }
        sleep(SYNC_RETRY_DELAY).await;
    }
    debug!(
        "{}: sync read-back for probe {} gave up after {} attempts",
        inner.name,
        probe.value(),
        SYNC_MAX_ATTEMPTS
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{DecayedAverage, DEFAULT_SAMPLE_SIZE};
    use crate::probe::PathMetrics;

    fn channel_config() -> ChannelConfig {
        ChannelConfig {
            kind: "httpbus".into(),
            interval: 10,
            max_wait: 60,
            receivers: 2,
            trash_size: 16,
            host: Some("https://bus.example.org/".into()),
            topic: Some("e2e-monitor".into()),
            verify: true,
            token_env: None,
        }
    }

    fn build_context() -> BuildContext {
        BuildContext {
            correlation: Arc::new(CorrelationMap::new()),
            tokens: TokenProvider::Disabled,
            status: Arc::new(StatusCounter::new()),
        }
    }

    fn probe_record(value: u64) -> (Arc<ProbeRecord>, Arc<DecayedAverage>) {
        let averages: [Arc<DecayedAverage>; 4] =
            std::array::from_fn(|_| Arc::new(DecayedAverage::new(6.0, DEFAULT_SAMPLE_SIZE)));
        let async_metric = averages[2].clone();
        let metrics = PathMetrics::new(
            averages[0].clone(),
            averages[1].clone(),
            averages[2].clone(),
            averages[3].clone(),
            Arc::new(StatusCounter::new()),
        );
        (
            Arc::new(ProbeRecord::new(value, "orders", metrics)),
            async_metric,
        )
    }

    #[test]
    fn test_config_requires_host_and_topic() {
        let mut config = channel_config();
        config.host = None;
        assert!(matches!(
            HttpBusConfig::from_channel("orders", &config),
            Err(ConfigError::MissingField { field: "host", .. })
        ));

        let mut config = channel_config();
        config.topic = None;
        assert!(matches!(
            HttpBusConfig::from_channel("orders", &config),
            Err(ConfigError::MissingField { field: "topic", .. })
        ));
    }

    #[test]
    fn test_config_trims_trailing_slash() {
        let bus = HttpBusConfig::from_channel("orders", &channel_config()).unwrap();
        assert_eq!(bus.host, "https://bus.example.org");
    }

    #[test]
    fn test_filler_has_configured_size() {
        let filler = generate_filler(64);
        assert_eq!(filler.len(), 64);
        assert!(filler.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_batch_line_reports_matching_events() {
        let ctx = build_context();
        let connector = HttpBusConnector::new("orders", &channel_config(), &ctx).unwrap();
        let (record, async_metric) = probe_record(7);
        ctx.correlation.register(record, 1);

        let mut cursors = vec![Cursor {
            partition: "0".into(),
            offset: "10".into(),
        }];
        let line = format!(
            r#"{{"cursor": {{"partition": "0", "offset": "11"}}, "events": [{{"value": 7, "instance_id": "{}", "filler": ""}}]}}"#,
            connector.inner.instance_id
        );
        connector
            .inner
            .handle_batch_line(line.as_bytes(), &mut cursors);

        assert_eq!(async_metric.count(), 1);
        assert_eq!(cursors[0].offset, "11");
    }

    #[tokio::test]
    async fn test_batch_line_ignores_foreign_instances() {
        let ctx = build_context();
        let connector = HttpBusConnector::new("orders", &channel_config(), &ctx).unwrap();
        let (record, async_metric) = probe_record(8);
        ctx.correlation.register(record, 1);

        let mut cursors = vec![Cursor {
            partition: "0".into(),
            offset: "10".into(),
        }];
        let line = r#"{"cursor": {"partition": "0", "offset": "11"}, "events": [{"value": 8, "instance_id": "someone-else", "filler": ""}]}"#;
        connector
            .inner
            .handle_batch_line(line.as_bytes(), &mut cursors);

        assert_eq!(async_metric.count(), 0);
        assert_eq!(ctx.correlation.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_batch_line_is_dropped() {
        let ctx = build_context();
        let connector = HttpBusConnector::new("orders", &channel_config(), &ctx).unwrap();
        let mut cursors = Vec::new();
        connector
            .inner
            .handle_batch_line(b"not json at all", &mut cursors);
        connector.inner.handle_batch_line(b"", &mut cursors);
    }

    #[tokio::test]
    async fn test_close_signal_stops_bootstrap() {
        let ctx = build_context();
        let connector = HttpBusConnector::new("orders", &channel_config(), &ctx).unwrap();
        connector.close();
        assert!(matches!(
            connector.initialize().await,
            Err(ConnectorError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_initialize_bails_out_once_closed() {
        let ctx = build_context();
        let connector = HttpBusConnector::new("orders", &channel_config(), &ctx).unwrap();
        connector.deinitialize().await;
        assert!(matches!(
            connector.initialize().await,
            Err(ConnectorError::Closed)
        ));
    }
}
