//! HTTP API surface
//!
//! Read-only health/metrics/connector-list endpoints plus channel-set
//! replacement on `POST /connectors`.

mod error;
mod rest;

pub use error::{ApiError, ApiResult};
pub use rest::AppState;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the full router with permissive CORS.
pub fn create_api_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    rest::routes().layer(cors).with_state(Arc::new(state))
}
