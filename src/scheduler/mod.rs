//! Periodic task scheduler
//!
//! One independent self-rescheduling timer per monitored channel: fire, then
//! arm the next tick `interval` after the start of the previous one.

mod timer;

pub use timer::{schedule, TimerHandle};
