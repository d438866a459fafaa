//! Process orchestration: wires the components together and owns shutdown.

use std::sync::Arc;
use std::time::Duration;

use enphase_client::{GatewayClient, IdentityClient, install_rustls_provider};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::api::{AppState, MetricsServer};
use crate::config::AppConfig;
use crate::credentials::{CredentialError, CredentialManager, EnlightenTokenSource, TokenSource};
use crate::error::{Error, Result};
use crate::metrics::{MetricsCollector, PrometheusExporter};
use crate::rrd::RrdSink;
use crate::scheduler::{PollScheduler, ProductionSource};

/// The exporter process.
///
/// Startup order: bind the metrics listener, start serving, start the
/// credential manager, wait for the first token, then start polling. All
/// tasks share one cancellation token and are tracked so shutdown can wait
/// for every one of them.
pub struct App {
    config: AppConfig,
    credentials: Arc<CredentialManager>,
    production: Arc<dyn ProductionSource>,
    collector: Arc<MetricsCollector>,
    listener: Option<TcpListener>,
}

impl App {
    /// Build the exporter against the real identity service and gateway.
    pub fn new(config: AppConfig) -> Result<Self> {
        install_rustls_provider();

        let identity = IdentityClient::new(config.identity.clone())?;
        let token_source = EnlightenTokenSource::new(identity, config.account.clone());
        let gateway = GatewayClient::new(&config.gateway_host)?;

        Ok(Self::with_sources(
            config,
            Arc::new(token_source),
            Arc::new(gateway),
        ))
    }

    /// Build the exporter on top of arbitrary token and production sources.
    pub fn with_sources(
        config: AppConfig,
        token_source: Arc<dyn TokenSource>,
        production: Arc<dyn ProductionSource>,
    ) -> Self {
        let credentials = Arc::new(CredentialManager::new(
            token_source,
            config.credentials.clone(),
        ));
        Self {
            config,
            credentials,
            production,
            collector: Arc::new(MetricsCollector::new()),
            listener: None,
        }
    }

    /// Serve metrics on an already bound listener instead of `listen_addr`.
    pub fn with_listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn credentials(&self) -> Arc<CredentialManager> {
        self.credentials.clone()
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Run until `cancel` fires or a startup step fails.
    ///
    /// Returns an error for any fatal startup failure, for a metrics server
    /// that dies while running, or when tasks do not stop within the
    /// shutdown grace period.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let grace = self.config.shutdown_grace;
        let tracker = TaskTracker::new();

        let listener = match self.listener {
            Some(listener) => listener,
            None => MetricsServer::bind(self.config.listen_addr).await?,
        };

        let exporter = Arc::new(PrometheusExporter::new(self.collector.clone()));
        let server = MetricsServer::new(
            AppState::new(exporter, self.credentials.clone()),
            cancel.clone(),
        );
        let mut server_task = tracker.spawn(async move { server.serve(listener).await });

        let credentials = self.credentials.clone();
        let credential_cancel = cancel.clone();
        let mut credential_task =
            tracker.spawn(async move { credentials.run(credential_cancel).await });

        let wait_timeout = self.config.token_wait_timeout;
        info!(timeout = ?wait_timeout, "Waiting for the first gateway token");

        let startup = tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(()),
            result = &mut credential_task => credential_exit(result, &cancel),
            result = &mut server_task => server_exit(result, &cancel),
            result = self.credentials.wait_for_ready(wait_timeout) => result.map_err(Error::from),
        };

        if let Err(e) = startup {
            error!(error = %e, "Startup failed");
            drain(&tracker, &cancel, grace).await?;
            return Err(e);
        }

        if cancel.is_cancelled() {
            info!("Shutdown requested before the first gateway token");
            return drain(&tracker, &cancel, grace).await;
        }

        let mut scheduler = PollScheduler::new(
            self.production.clone(),
            self.credentials.clone(),
            self.config.poll.clone(),
        )
        .with_sink(self.collector.clone());

        if let Some(rrd) = &self.config.rrd {
            info!(daemon = %rrd.daemon, dir = %rrd.dir.display(), "rrdupdate sink enabled");
            scheduler = scheduler.with_sink(Arc::new(RrdSink::new(&rrd.daemon, &rrd.dir)));
        }

        let scheduler_cancel = cancel.clone();
        tracker.spawn(async move { scheduler.run(scheduler_cancel).await });
        tracker.close();

        info!("Gateway exporter running");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(()),
            result = &mut server_task => server_exit(result, &cancel),
        };

        if let Err(e) = &outcome {
            error!(error = %e, "Metrics server stopped unexpectedly");
        }

        drain(&tracker, &cancel, grace).await?;
        outcome
    }
}

/// Cancel every task and wait up to `grace` for them to finish.
async fn drain(tracker: &TaskTracker, cancel: &CancellationToken, grace: Duration) -> Result<()> {
    info!(grace = ?grace, "Shutting down");
    cancel.cancel();
    tracker.close();

    match tokio::time::timeout(grace, tracker.wait()).await {
        Ok(()) => {
            info!("All tasks stopped");
            Ok(())
        }
        Err(_) => {
            warn!(remaining = tracker.len(), "Tasks still running after grace period");
            Err(Error::shutdown(format!(
                "{} task(s) did not stop within {:?}",
                tracker.len(),
                grace
            )))
        }
    }
}

/// A task that returns `Ok(())` after cancellation stopped cleanly; before it,
/// the exit is a failure.
fn credential_exit(
    result: std::result::Result<std::result::Result<(), CredentialError>, tokio::task::JoinError>,
    cancel: &CancellationToken,
) -> Result<()> {
    match result {
        Ok(Err(e)) => Err(e.into()),
        Ok(Ok(())) if cancel.is_cancelled() => Ok(()),
        Ok(Ok(())) => Err(Error::Other(
            "Credential manager exited before the first token".into(),
        )),
        Err(e) => Err(Error::Other(format!("Credential manager task failed: {}", e))),
    }
}

fn server_exit(
    result: std::result::Result<Result<()>, tokio::task::JoinError>,
    cancel: &CancellationToken,
) -> Result<()> {
    match result {
        Ok(Err(e)) => Err(e),
        Ok(Ok(())) if cancel.is_cancelled() => Ok(()),
        Ok(Ok(())) => Err(Error::ApiError("Metrics server exited".into())),
        Err(e) => Err(Error::ApiError(format!("Metrics server task failed: {}", e))),
    }
}

/// Resolve on SIGINT or, on unix, SIGTERM.
pub async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C");
    }

    Ok(())
}

/// Spawn a task that cancels `cancel` on the first shutdown signal.
pub fn spawn_signal_handler(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "Failed to listen for shutdown signals");
        }
        cancel.cancel();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;

    use enphase_client::IdentityEndpoints;

    use crate::credentials::{Account, CredentialManagerConfig};
    use crate::scheduler::PollSchedulerConfig;
    use crate::testing::{FakeProductionSource, FakeTokenSource, PollStep, TokenStep};

    fn config() -> AppConfig {
        AppConfig {
            gateway_host: "127.0.0.1".to_string(),
            account: Account {
                username: "me@example.com".to_string(),
                password: "hunter2".to_string(),
                serial: "122".to_string(),
            },
            identity: IdentityEndpoints::default(),
            credentials: CredentialManagerConfig::default(),
            poll: PollSchedulerConfig::default(),
            token_wait_timeout: Duration::from_secs(60),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            shutdown_grace: Duration::from_secs(15),
            rrd: None,
        }
    }

    fn app(tokens: Vec<TokenStep>, polls: Vec<PollStep>) -> App {
        App::with_sources(
            config(),
            Arc::new(FakeTokenSource::new(tokens)),
            Arc::new(FakeProductionSource::new(polls)),
        )
    }

    #[tokio::test]
    async fn test_initial_refresh_failure_is_fatal() {
        let app = app(vec![TokenStep::session_error(401)], vec![]);
        let cancel = CancellationToken::new();

        let err = app.run(cancel.clone()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Credential(CredentialError::SessionExchange(_))
        ));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_timeout_is_fatal() {
        let app = app(vec![TokenStep::Hang], vec![]);
        let mut config = config();
        config.token_wait_timeout = Duration::from_secs(5);
        let app = App { config, ..app };

        let err = app.run(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Credential(CredentialError::ReadyTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut app = app(vec![TokenStep::ok("tok-123")], vec![]);
        app.config.listen_addr = taken.local_addr().unwrap();

        let err = app.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::ApiError(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_after_ready_and_stops_on_cancel() {
        let app = app(
            vec![TokenStep::ok("tok-123")],
            vec![PollStep::ok(100.0, 500.0, 9000.0, 250.0)],
        );
        let collector = app.collector();
        let credentials = app.credentials();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(app.run(cancel.clone()));

        credentials
            .wait_for_ready(Duration::from_secs(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(collector.snapshot().power_now_w, Some(250.0));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_ready_is_clean() {
        let app = app(vec![TokenStep::Hang], vec![]);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(app.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        handle.await.unwrap().unwrap();
    }

    #[test]
    fn test_task_exit_after_cancel_is_clean() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(server_exit(Ok(Ok(())), &cancel).is_ok());
        assert!(credential_exit(Ok(Ok(())), &cancel).is_ok());
    }

    #[test]
    fn test_task_exit_without_cancel_is_failure() {
        let cancel = CancellationToken::new();

        assert!(matches!(
            server_exit(Ok(Ok(())), &cancel),
            Err(Error::ApiError(_))
        ));
        assert!(matches!(
            credential_exit(Ok(Ok(())), &cancel),
            Err(Error::Other(_))
        ));
    }

    #[test]
    fn test_task_error_wins_over_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = credential_exit(
            Ok(Err(CredentialError::RefreshTimeout(Duration::from_secs(1)))),
            &cancel,
        );
        assert!(matches!(
            result,
            Err(Error::Credential(CredentialError::RefreshTimeout(_)))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_after_ready_is_always_clean() {
        for round in 0..100 {
            let app = app(
                vec![TokenStep::ok("tok-123")],
                vec![PollStep::ok(1.0, 2.0, 3.0, 4.0)],
            );
            let credentials = app.credentials();
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(app.run(cancel.clone()));

            credentials
                .wait_for_ready(Duration::from_secs(5))
                .await
                .unwrap();
            cancel.cancel();

            let result = handle.await.unwrap();
            assert!(result.is_ok(), "round {round}: {:?}", result);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_before_ready_is_always_clean() {
        for round in 0..100 {
            let app = app(vec![TokenStep::Hang], vec![]);
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(app.run(cancel.clone()));

            tokio::task::yield_now().await;
            cancel.cancel();

            let result = handle.await.unwrap();
            assert!(result.is_ok(), "round {round}: {:?}", result);
        }
    }
}
