//! Probe correlation engine
//!
//! Creates a per-probe record at probe start and guarantees each of the four
//! completion paths (send-ack, sync, async, async-max) is recorded exactly
//! once, with forced timeout as the fallback when a path never resolves.

mod correlation;
mod record;

pub use correlation::CorrelationMap;
pub use record::{PathMetrics, ProbePath, ProbeRecord};
