//! Poll loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::PollError;
use super::source::ProductionSource;
use crate::credentials::CredentialManager;
use crate::reading::{Reading, ReadingSink};

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on a single poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(20);

/// Configuration for the [`PollScheduler`].
#[derive(Debug, Clone)]
pub struct PollSchedulerConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Polls the gateway on a fixed cadence and fans readings out to sinks.
pub struct PollScheduler {
    source: Arc<dyn ProductionSource>,
    credentials: Arc<CredentialManager>,
    sinks: Vec<Arc<dyn ReadingSink>>,
    config: PollSchedulerConfig,
}

impl PollScheduler {
    pub fn new(
        source: Arc<dyn ProductionSource>,
        credentials: Arc<CredentialManager>,
        config: PollSchedulerConfig,
    ) -> Self {
        Self {
            source,
            credentials,
            sinks: Vec::new(),
            config,
        }
    }

    /// Register a sink for successful readings.
    pub fn with_sink(mut self, sink: Arc<dyn ReadingSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Poll the gateway once.
    ///
    /// On success the reading has already been handed to every sink. On
    /// failure no sink sees anything except [`ReadingSink::record_failure`].
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<Reading, PollError> {
        let token = self.credentials.get();
        let timeout = self.config.timeout;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            result = tokio::time::timeout(timeout, self.source.fetch_production(token.as_str())) => result,
        };

        let production = match result {
            Ok(Ok(production)) => production,
            Ok(Err(e)) => return Err(self.failed(PollError::Fetch(e))),
            Err(_) => return Err(self.failed(PollError::Timeout(timeout))),
        };

        let reading = Reading::from_production(production, Utc::now());
        for sink in &self.sinks {
            debug!(sink = sink.name(), "Forwarding reading");
            sink.record(&reading);
        }
        Ok(reading)
    }

    fn failed(&self, error: PollError) -> PollError {
        for sink in &self.sinks {
            debug!(sink = sink.name(), error = %error, "Reporting poll failure");
            sink.record_failure(&error);
        }
        error
    }

    /// Poll immediately, then every interval, until `cancel` fires.
    ///
    /// Ticks missed because a poll overran are skipped, not replayed.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval = ?self.config.interval,
            timeout = ?self.config.timeout,
            sinks = self.sinks.len(),
            "Starting poll scheduler"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.poll_once(&cancel).await {
                        Ok(reading) => debug!(
                            power_now_w = reading.power_now_w,
                            energy_today_wh = reading.energy_today_wh,
                            "Poll succeeded"
                        ),
                        Err(PollError::Cancelled) => break,
                        Err(e) if e.is_unauthorized() => warn!(
                            error = %e,
                            last_refreshed_at = ?self.credentials.last_refreshed_at(),
                            "Gateway rejected the current token"
                        ),
                        Err(e) => warn!(error = %e, "Poll failed"),
                    }
                }
            }
        }

        info!("Poll scheduler shutting down");
    }
}
