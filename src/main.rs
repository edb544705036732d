use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use streampulse::api::{create_api_server, AppState};
use streampulse::channel::ChannelRegistry;
use streampulse::config;
use streampulse::connector::{ConnectorFactory, TokenProvider};
use streampulse::metrics::MetricRegistry;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// End-to-end latency monitor for event-streaming platforms.
#[derive(Parser, Debug)]
#[command(name = "streampulse", version)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Port to serve the HTTP API on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Static bearer token for backend requests.
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("reading configuration from {}", args.config.display());
    let connectors = config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let tokens = match args.token {
        Some(token) => TokenProvider::Static(token),
        None => TokenProvider::Disabled,
    };

    let metrics = Arc::new(MetricRegistry::new());
    let channels = Arc::new(ChannelRegistry::new(
        metrics.clone(),
        tokens,
        ConnectorFactory::with_defaults(),
    ));
    channels
        .replace(connectors)
        .context("invalid channel configuration")?;

    let app = create_api_server(AppState {
        channels,
        metrics,
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("failed to bind port {}", args.port))?;
    info!("serving on port {}", args.port);
    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
