//! Metrics HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{Span, info};

use crate::api::routes;
use crate::credentials::CredentialManager;
use crate::error::{Error, Result};
use crate::metrics::PrometheusExporter;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    pub exporter: Arc<PrometheusExporter>,
    pub credentials: Arc<CredentialManager>,
}

impl AppState {
    pub fn new(exporter: Arc<PrometheusExporter>, credentials: Arc<CredentialManager>) -> Self {
        Self {
            start_time: Instant::now(),
            exporter,
            credentials,
        }
    }
}

/// Serves the scrape endpoint until its cancellation token fires.
pub struct MetricsServer {
    state: AppState,
    cancel_token: CancellationToken,
}

impl MetricsServer {
    pub fn new(state: AppState, cancel_token: CancellationToken) -> Self {
        Self {
            state,
            cancel_token,
        }
    }

    /// Bind the listen address. Failure here is fatal at startup.
    pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .map_err(|e| Error::ApiError(format!("Failed to bind {}: {}", addr, e)))
    }

    pub(crate) fn build_router(&self) -> Router {
        routes::create_router(self.state.clone()).layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    // Probes and scrapes are too frequent to trace at info.
                    let level = if req.uri().path().starts_with("/health")
                        || req.uri().path() == "/metrics"
                    {
                        tracing::Level::DEBUG
                    } else {
                        tracing::Level::INFO
                    };
                    let mut make_span = tower_http::trace::DefaultMakeSpan::new().level(level);
                    use tower_http::trace::MakeSpan;
                    make_span.make_span(req)
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let on_response = tower_http::trace::DefaultOnResponse::new()
                            .level(tracing::Level::DEBUG);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                ),
        )
    }

    /// Serve on an already bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        let router = self.build_router();

        info!("Metrics server listening on http://{}/metrics", addr);

        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("Metrics server shutting down...");
            })
            .await
            .map_err(|e| Error::ApiError(format!("Server error: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chrono::Utc;
    use tower::ServiceExt;

    use crate::credentials::CredentialManagerConfig;
    use crate::metrics::MetricsCollector;
    use crate::reading::{Reading, ReadingSink};
    use crate::testing::{FakeTokenSource, TokenStep};

    fn server(steps: Vec<TokenStep>) -> (MetricsServer, Arc<MetricsCollector>, Arc<CredentialManager>) {
        server_with_cancel(steps, CancellationToken::new())
    }

    fn server_with_cancel(
        steps: Vec<TokenStep>,
        cancel: CancellationToken,
    ) -> (MetricsServer, Arc<MetricsCollector>, Arc<CredentialManager>) {
        let collector = Arc::new(MetricsCollector::new());
        let credentials = Arc::new(CredentialManager::new(
            Arc::new(FakeTokenSource::new(steps)),
            CredentialManagerConfig::default(),
        ));
        let state = AppState::new(
            Arc::new(PrometheusExporter::new(collector.clone())),
            credentials.clone(),
        );
        (
            MetricsServer::new(state, cancel),
            collector,
            credentials,
        )
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, String, Option<String>) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap(), content_type)
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (server, collector, _) = server(vec![]);
        collector.record(&Reading {
            energy_today_wh: 100.0,
            energy_seven_days_wh: 500.0,
            energy_lifetime_wh: 9000.0,
            power_now_w: 250.0,
            taken_at: Utc::now(),
        });

        let (status, body, content_type) = get(server.build_router(), "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            content_type.as_deref(),
            Some(routes::metrics::PROMETHEUS_CONTENT_TYPE)
        );
        assert!(body.contains("enphase_power_now_w 250\n"));
        assert!(body.contains("enphase_energy_lifetime_wh 9000\n"));
    }

    #[tokio::test]
    async fn test_ready_is_503_until_first_token() {
        let (server, _, credentials) = server(vec![TokenStep::ok("tok-123")]);

        let (status, body, _) = get(server.build_router(), "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "not ready");

        let cancel = CancellationToken::new();
        let handle = {
            let credentials = credentials.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { credentials.run(cancel).await })
        };
        credentials
            .wait_for_ready(Duration::from_secs(5))
            .await
            .unwrap();

        let (status, body, _) = get(server.build_router(), "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ready");

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_liveness() {
        let (server, _, _) = server(vec![]);

        let (status, body, _) = get(server.build_router(), "/health/live").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "alive");
        assert_eq!(json["token_refreshed_at"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let (server, _, _) = server_with_cancel(vec![], cancel.clone());
        let listener = MetricsServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move { server.serve(listener).await });

        tokio::task::yield_now().await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let taken = MetricsServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = taken.local_addr().unwrap();

        let err = MetricsServer::bind(addr).await.unwrap_err();
        assert!(matches!(err, Error::ApiError(_)));
    }
}
