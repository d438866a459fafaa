//! Production gauges and their Prometheus exposition.
//!
//! [`MetricsCollector`] is registered as a reading sink on the poll scheduler;
//! [`PrometheusExporter`] renders its current state for `GET /metrics`.

mod collector;
mod prometheus;

pub use collector::{MetricsCollector, MetricsSnapshot};
pub use prometheus::{DEFAULT_NAMESPACE, PrometheusExporter};
