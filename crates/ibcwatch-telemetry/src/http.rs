//! HTTP metrics endpoint for Prometheus scraping.
//!
//! Every request to the metrics path runs a full scrape; nothing is cached
//! between requests.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    registry::MetricsRegistry,
    types::{MetricError, MetricResult},
};

/// Configuration for the metrics HTTP server
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the metrics server to
    pub bind_address: SocketAddr,
    /// Path to expose metrics on (default: /metrics)
    pub metrics_path: String,
    /// Whether to include a health check endpoint
    pub enable_health_check: bool,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8008)),
            metrics_path: "/metrics".to_string(),
            enable_health_check: true,
        }
    }
}

#[derive(Clone)]
struct AppState {
    registry: Arc<MetricsRegistry>,
    /// Process token; scrapes run under a child of it
    shutdown: CancellationToken,
}

/// Metrics HTTP server
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: AppState,
}

impl MetricsServer {
    /// Create a new metrics server. Cancelling `shutdown` aborts in-flight
    /// scrapes and stops the server.
    pub fn new(
        config: MetricsServerConfig,
        registry: Arc<MetricsRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            state: AppState { registry, shutdown },
        }
    }

    fn build_router(&self) -> Router {
        let mut router = Router::new().route(&self.config.metrics_path, get(metrics_handler));

        if self.config.enable_health_check {
            router = router.route("/health", get(health_handler));
        }

        router.with_state(self.state.clone()).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
    }

    /// Bind the configured address and serve until shutdown
    pub async fn start(self) -> MetricResult<()> {
        let listener = TcpListener::bind(&self.config.bind_address)
            .await
            .map_err(|e| MetricError::HttpServerError(format!("Failed to bind: {e}")))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(self, listener: TcpListener) -> MetricResult<()> {
        let app = self.build_router();
        let address = listener
            .local_addr()
            .map_err(|e| MetricError::HttpServerError(e.to_string()))?;

        tracing::info!(
            address = %address,
            path = %self.config.metrics_path,
            "Metrics server listening"
        );

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| MetricError::HttpServerError(e.to_string()))?;

        tracing::info!("Metrics server stopped");
        Ok(())
    }

    /// Start the metrics server in the background
    pub fn spawn(self) -> tokio::task::JoinHandle<MetricResult<()>> {
        tokio::spawn(async move { self.start().await })
    }
}

/// Handler for the metrics endpoint
async fn metrics_handler(State(state): State<AppState>) -> Result<Response, StatusCode> {
    match state.registry.scrape(&state.shutdown).await {
        Ok(metrics) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            metrics,
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handler for the health check endpoint
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry() -> Arc<MetricsRegistry> {
        Arc::new(MetricsRegistry::new(Duration::from_secs(5)).unwrap())
    }

    async fn spawn_server(config: MetricsServerConfig) -> (String, CancellationToken) {
        let token = CancellationToken::new();
        let server = MetricsServer::new(config, registry(), token.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(server.serve(listener));
        (format!("http://{address}"), token)
    }

    #[tokio::test]
    async fn test_metrics_handler() {
        let state = AppState {
            registry: registry(),
            shutdown: CancellationToken::new(),
        };
        let response = metrics_handler(State(state)).await.unwrap();
        let (parts, _body) = response.into_parts();

        assert_eq!(parts.status, StatusCode::OK);
        assert!(parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/plain")));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_default_config() {
        let config = MetricsServerConfig::default();
        assert_eq!(config.metrics_path, "/metrics");
        assert!(config.enable_health_check);
        assert_eq!(config.bind_address.port(), 8008);
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let config = MetricsServerConfig {
            metrics_path: "/ibc".to_string(),
            ..Default::default()
        };
        let (base, token) = spawn_server(config).await;

        let body = reqwest::get(format!("{base}/ibc"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("ibcwatch_config_generation"));

        let missing = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        token.cancel();
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let token = CancellationToken::new();
        let server = MetricsServer::new(MetricsServerConfig::default(), registry(), token.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let handle = tokio::spawn(server.serve(listener));

        token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
