//! streampulse: end-to-end latency monitoring for event-streaming platforms
//!
//! Publishes synthetic probe events on a per-channel schedule and times how
//! long each probe takes to reappear through the different delivery paths
//! (publish acknowledgement, synchronous read-back, and asynchronous
//! delivery seen by the fastest and slowest background receiver). Results
//! are aggregated into decayed moving averages, sliding-window percentiles
//! and status histograms, exposed over HTTP for scraping.

pub mod api;
pub mod channel;
pub mod config;
pub mod connector;
pub mod metrics;
pub mod probe;
pub mod scheduler;
