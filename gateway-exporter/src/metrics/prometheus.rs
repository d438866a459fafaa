//! Prometheus text exposition.

use std::sync::Arc;

use super::collector::MetricsCollector;

/// Metric name prefix.
pub const DEFAULT_NAMESPACE: &str = "enphase";

/// Renders a [`MetricsCollector`] in Prometheus text format (v0.0.4).
pub struct PrometheusExporter {
    collector: Arc<MetricsCollector>,
    namespace: String,
}

impl PrometheusExporter {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self::with_namespace(collector, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(collector: Arc<MetricsCollector>, namespace: impl Into<String>) -> Self {
        Self {
            collector,
            namespace: namespace.into(),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let snapshot = self.collector.snapshot();
        let mut output = String::new();

        self.write_gauge(
            &mut output,
            "energy_today_wh",
            "Energy produced today in watt-hours",
            snapshot.energy_today_wh,
        );
        self.write_gauge(
            &mut output,
            "energy_seven_days_wh",
            "Energy produced over the last seven days in watt-hours",
            snapshot.energy_seven_days_wh,
        );
        self.write_gauge(
            &mut output,
            "energy_lifetime_wh",
            "Energy produced over the installation lifetime in watt-hours",
            snapshot.energy_lifetime_wh,
        );
        self.write_gauge(
            &mut output,
            "power_now_w",
            "Current power production in watts",
            snapshot.power_now_w,
        );
        self.write_gauge(
            &mut output,
            "last_poll_timestamp_seconds",
            "Unix time of the last successful gateway poll",
            snapshot.last_poll_timestamp_seconds,
        );

        self.write_counter(
            &mut output,
            "polls_total",
            "Total successful gateway polls",
            snapshot.polls_total as f64,
        );
        self.write_counter(
            &mut output,
            "poll_failures_total",
            "Total failed gateway polls",
            snapshot.poll_failures_total as f64,
        );

        output
    }

    /// Unset gauges keep their HELP/TYPE lines but emit no sample.
    fn write_gauge(&self, output: &mut String, name: &str, help: &str, value: Option<f64>) {
        let full_name = format!("{}_{}", self.namespace, name);
        output.push_str(&format!("# HELP {} {}\n", full_name, help));
        output.push_str(&format!("# TYPE {} gauge\n", full_name));
        if let Some(value) = value {
            output.push_str(&format!("{} {}\n", full_name, value));
        }
    }

    fn write_counter(&self, output: &mut String, name: &str, help: &str, value: f64) {
        let full_name = format!("{}_{}", self.namespace, name);
        output.push_str(&format!("# HELP {} {}\n", full_name, help));
        output.push_str(&format!("# TYPE {} counter\n", full_name));
        output.push_str(&format!("{} {}\n", full_name, value));
    }
}
