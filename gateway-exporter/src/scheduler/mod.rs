//! Scheduled gateway polling.

mod error;
mod service;
mod source;

pub use error::PollError;
pub use service::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, PollScheduler, PollSchedulerConfig};
pub use source::ProductionSource;
