//! HTTP surface: Prometheus scrape endpoint and health probes.

pub mod routes;
pub mod server;

pub use server::{AppState, MetricsServer};
