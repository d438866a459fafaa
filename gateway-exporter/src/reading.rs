//! Production readings and the sinks that consume them.

use chrono::{DateTime, Utc};
use enphase_client::Production;
use serde::Serialize;

use crate::scheduler::PollError;

/// One successful poll of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    /// Energy produced so far today, in Wh.
    pub energy_today_wh: f64,
    /// Energy produced over the last seven days, in Wh.
    pub energy_seven_days_wh: f64,
    /// Energy produced over the lifetime of the installation, in Wh.
    pub energy_lifetime_wh: f64,
    /// Instantaneous power, in W.
    pub power_now_w: f64,
    /// When the poll that produced this reading completed.
    pub taken_at: DateTime<Utc>,
}

impl Reading {
    pub fn from_production(production: Production, taken_at: DateTime<Utc>) -> Self {
        Self {
            energy_today_wh: production.watt_hours_today,
            energy_seven_days_wh: production.watt_hours_seven_days,
            energy_lifetime_wh: production.watt_hours_lifetime,
            power_now_w: production.watts_now,
            taken_at,
        }
    }

    /// The four values keyed by a short field name.
    pub fn fields(&self) -> [(&'static str, f64); 4] {
        [
            ("today", self.energy_today_wh),
            ("seven_days", self.energy_seven_days_wh),
            ("lifetime", self.energy_lifetime_wh),
            ("now", self.power_now_w),
        ]
    }
}

/// Consumer of successful readings.
///
/// Sinks are called synchronously from the poll loop and must not block;
/// anything slow has to be spawned.
pub trait ReadingSink: Send + Sync {
    /// Sink name used in logs.
    fn name(&self) -> &'static str;

    fn record(&self, reading: &Reading);

    /// Called when a poll produced no reading.
    fn record_failure(&self, _error: &PollError) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_production() {
        let production = Production {
            watt_hours_today: 100.0,
            watt_hours_seven_days: 500.0,
            watt_hours_lifetime: 9000.0,
            watts_now: 250.0,
        };
        let reading = Reading::from_production(production, Utc::now());

        assert_eq!(
            reading.fields(),
            [
                ("today", 100.0),
                ("seven_days", 500.0),
                ("lifetime", 9000.0),
                ("now", 250.0),
            ]
        );
    }
}
