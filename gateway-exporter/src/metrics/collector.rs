//! Lock-free gauge storage fed by the poll scheduler.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

use crate::reading::{Reading, ReadingSink};
use crate::scheduler::PollError;

/// An `f64` gauge that remembers whether it was ever set.
#[derive(Debug, Default)]
struct Gauge {
    bits: AtomicU64,
    set: AtomicBool,
}

impl Gauge {
    fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
        self.set.store(true, Ordering::Release);
    }

    fn get(&self) -> Option<f64> {
        if self.set.load(Ordering::Acquire) {
            Some(f64::from_bits(self.bits.load(Ordering::Relaxed)))
        } else {
            None
        }
    }
}

/// Current production gauges and poll counters.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    energy_today_wh: Gauge,
    energy_seven_days_wh: Gauge,
    energy_lifetime_wh: Gauge,
    power_now_w: Gauge,
    last_poll_timestamp_seconds: Gauge,

    polls_total: AtomicU64,
    poll_failures_total: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set all production gauges from one reading.
    pub fn set_reading(&self, reading: &Reading) {
        self.energy_today_wh.set(reading.energy_today_wh);
        self.energy_seven_days_wh.set(reading.energy_seven_days_wh);
        self.energy_lifetime_wh.set(reading.energy_lifetime_wh);
        self.power_now_w.set(reading.power_now_w);
        self.last_poll_timestamp_seconds
            .set(reading.taken_at.timestamp_millis() as f64 / 1000.0);
        self.polls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_failure(&self) {
        self.poll_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            energy_today_wh: self.energy_today_wh.get(),
            energy_seven_days_wh: self.energy_seven_days_wh.get(),
            energy_lifetime_wh: self.energy_lifetime_wh.get(),
            power_now_w: self.power_now_w.get(),
            last_poll_timestamp_seconds: self.last_poll_timestamp_seconds.get(),
            polls_total: self.polls_total.load(Ordering::Relaxed),
            poll_failures_total: self.poll_failures_total.load(Ordering::Relaxed),
        }
    }
}

impl ReadingSink for MetricsCollector {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn record(&self, reading: &Reading) {
        self.set_reading(reading);
    }

    fn record_failure(&self, _error: &PollError) {
        self.record_poll_failure();
    }
}

/// Point-in-time copy of the collector. `None` means never set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub energy_today_wh: Option<f64>,
    pub energy_seven_days_wh: Option<f64>,
    pub energy_lifetime_wh: Option<f64>,
    pub power_now_w: Option<f64>,
    pub last_poll_timestamp_seconds: Option<f64>,
    /// Successful polls.
    pub polls_total: u64,
    pub poll_failures_total: u64,
}
