//! Connector boundary
//!
//! Per-backend adapters consumed by the core. A connector performs one-time
//! backend setup, publishes probes, and reports completions back through the
//! probe correlation engine at its own pace.

mod error;
mod factory;
mod httpbus;
mod token;
mod types;

pub use error::{ConnectorError, ConnectorResult};
pub use factory::{BuildContext, ConnectorFactory};
pub use httpbus::{HttpBusConfig, HttpBusConnector};
pub use token::TokenProvider;
pub use types::{advance_cursors, BootstrapState, Cursor, EventBatch, PartitionInfo, ProbeEvent};

use crate::probe::ProbeRecord;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Signal shutdown. Non-blocking and safe to call at any time; a
    /// bootstrap retry loop still running in `initialize` observes the
    /// signal and returns instead of retrying further.
    fn close(&self) {}

    /// One-time backend setup. Completes exactly once when the channel is
    /// ready to receive probes; retries internally on transient failure.
    /// Returns an error only when the connector was closed mid-bootstrap.
    async fn initialize(&self) -> ConnectorResult<()>;

    /// Publish one probe value. Completions (send-ack status, async
    /// observations, and a sync resolution if `use_sync_path`) are reported
    /// back through the correlation engine; publish failures are absorbed
    /// here and recorded as status observations.
    async fn send_and_receive(&self, probe: Arc<ProbeRecord>, use_sync_path: bool);

    /// Release backend resources. Safe to call only after any pending
    /// `initialize` has completed; the composition glue closes the
    /// connector first and defers this until the init task returns.
    async fn deinitialize(&self);
}

impl std::fmt::Debug for dyn Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Connector")
    }
}
