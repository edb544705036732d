use crate::api::error::ApiResult;
use crate::channel::ChannelRegistry;
use crate::config::ChannelConfig;
use crate::metrics::MetricRegistry;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct AppState {
    pub channels: Arc<ChannelRegistry>,
    pub metrics: Arc<MetricRegistry>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(dump_metrics))
        .route("/connectors", get(list_connectors).post(replace_connectors))
}

async fn health() -> &'static str {
    "OK"
}

async fn dump_metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.metrics.dump())
}

async fn list_connectors(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, ChannelConfig>> {
    Json(state.channels.configs())
}

async fn replace_connectors(
    State(state): State<Arc<AppState>>,
    Json(configs): Json<BTreeMap<String, ChannelConfig>>,
) -> ApiResult<&'static str> {
    state.channels.replace(configs)?;
    Ok("OK")
}
