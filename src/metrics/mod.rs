//! Metrics engine
//!
//! Turns streams of duration/event samples into queryable aggregates,
//! organized under dotted hierarchical names.
//!
//! Three metric kinds:
//! - Decayed-average: EMAs over 1/5/15 minute windows plus sliding-window
//!   percentiles (p95/p98/p99), count and last value
//! - Call-rate: converts discrete call events into a calls-per-second series
//! - Status counter: tally per status label

mod average;
mod counters;
mod registry;

pub use average::{DecayedAverage, PercentileSample, DEFAULT_SAMPLE_SIZE};
pub use counters::{CallRate, StatusCounter};
pub use registry::{Metric, MetricRegistry};
