//! Prometheus exporter for Enphase Envoy gateway production readings.
//!
//! A [`CredentialManager`](credentials::CredentialManager) keeps a gateway
//! token fresh, a [`PollScheduler`](scheduler::PollScheduler) reads the
//! production counters with it, and the latest values are served on
//! `/metrics`.

pub mod api;
pub mod app;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod reading;
pub mod rrd;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use app::App;
pub use error::{Error, Result};
