//! Gateway token lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::error::CredentialError;
use super::source::TokenSource;
use super::types::Credential;

/// Default period between scheduled refreshes (7 days).
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default bound on a single refresh cycle.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the [`CredentialManager`].
#[derive(Debug, Clone)]
pub struct CredentialManagerConfig {
    /// Time between scheduled refreshes after the first one.
    pub refresh_period: Duration,
    /// Upper bound on one refresh cycle (both remote calls).
    pub refresh_timeout: Duration,
}

impl Default for CredentialManagerConfig {
    fn default() -> Self {
        Self {
            refresh_period: DEFAULT_REFRESH_PERIOD,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }
}

/// Owns the gateway bearer token.
///
/// The token is obtained once at startup, then refreshed on a fixed period.
/// Readers get a copy through [`get`](Self::get) and never wait on network I/O.
/// A one-shot ready signal fires after the first successful refresh.
pub struct CredentialManager {
    source: Arc<dyn TokenSource>,
    config: CredentialManagerConfig,
    credential: Mutex<Credential>,
    ready_tx: watch::Sender<bool>,
    consecutive_failures: AtomicU32,
    last_refreshed_at: Mutex<Option<DateTime<Utc>>>,
}

impl CredentialManager {
    pub fn new(source: Arc<dyn TokenSource>, config: CredentialManagerConfig) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            source,
            config,
            credential: Mutex::new(Credential::default()),
            ready_tx,
            consecutive_failures: AtomicU32::new(0),
            last_refreshed_at: Mutex::new(None),
        }
    }

    /// Current token; empty before the first successful refresh.
    pub fn get(&self) -> Credential {
        self.credential.lock().clone()
    }

    /// Whether the first refresh has succeeded.
    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// Subscribe to the ready signal. The value flips to `true` once.
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    /// When the token was last replaced.
    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        *self.last_refreshed_at.lock()
    }

    /// Scheduled refreshes that failed since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Wait until the first token is available or `timeout` elapses.
    ///
    /// Returns immediately if the ready signal already fired.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<(), CredentialError> {
        let mut ready_rx = self.ready_tx.subscribe();
        match tokio::time::timeout(timeout, ready_rx.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => Ok(()),
            // The sender lives as long as `self`, so only the deadline can end the wait.
            Ok(Err(_)) | Err(_) => Err(CredentialError::ReadyTimeout(timeout)),
        }
    }

    /// Run one refresh cycle: session login, then token exchange.
    ///
    /// The stored token is replaced only if both steps succeed.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), CredentialError> {
        debug!("Fetching session id");
        let session_id = self
            .source
            .fetch_session_id()
            .await
            .map_err(CredentialError::SessionExchange)?;

        debug!("Fetching gateway token");
        let token = self
            .source
            .fetch_token(&session_id)
            .await
            .map_err(CredentialError::TokenExchange)?;

        *self.credential.lock() = Credential::new(token);
        *self.last_refreshed_at.lock() = Some(Utc::now());
        self.consecutive_failures.store(0, Ordering::Relaxed);

        info!("Gateway token stored");
        Ok(())
    }

    async fn refresh_bounded(&self) -> Result<(), CredentialError> {
        let timeout = self.config.refresh_timeout;
        tokio::time::timeout(timeout, self.refresh())
            .await
            .map_err(|_| CredentialError::RefreshTimeout(timeout))?
    }

    fn mark_ready(&self) {
        let fired = self.ready_tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        });
        if fired {
            info!("First gateway token obtained");
        }
    }

    /// Run the refresh loop until `cancel` fires.
    ///
    /// Refreshes immediately. A failure of that first cycle is returned as an
    /// error; later failures are logged and the previous token is kept.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), CredentialError> {
        info!(
            refresh_period = ?self.config.refresh_period,
            "Starting credential manager"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Credential manager cancelled before the first token");
                return Ok(());
            }
            result = self.refresh_bounded() => {
                if let Err(e) = result {
                    error!(error = %e, "Initial gateway token refresh failed");
                    return Err(e);
                }
            }
        }

        self.mark_ready();

        let period = self.config.refresh_period;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let result = tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.refresh_bounded() => result,
                    };

                    if let Err(e) = result {
                        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(
                            error = %e,
                            consecutive_failures = failures,
                            last_refreshed_at = ?self.last_refreshed_at(),
                            "Scheduled gateway token refresh failed, keeping previous token"
                        );
                    }
                }
            }
        }

        info!("Credential manager shutting down");
        Ok(())
    }
}
