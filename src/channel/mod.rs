//! Channel registry and composition glue
//!
//! Wires the configured channel set to scheduler timers, correlation state
//! and per-channel metrics, and supports atomic replacement of the whole
//! active set on configuration reload.

mod registry;
mod types;

pub use registry::ChannelRegistry;
pub use types::{Channel, ChannelMetrics};
