//! HTTP transport.
//!
//! Serves the JSON-RPC endpoint over axum for web-based clients, plus health
//! and Prometheus endpoints.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::error_handling::HandleErrorLayer;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{BoxError, Json, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::metrics::Metrics;

use super::{MessageHandler, StatCounters, Transport, TransportStats};

/// Listener settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
    pub debug: bool,
    pub compression: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            timeout_secs: 30,
            debug: false,
            compression: false,
        }
    }
}

#[derive(Clone)]
struct AppState {
    handler: Arc<dyn MessageHandler>,
    metrics: Option<Arc<Metrics>>,
    stats: Arc<StatCounters>,
    debug: bool,
}

/// Transport over an HTTP listener.
///
/// `POST /mcp` carries the JSON-RPC body. Requests dispatch concurrently;
/// the handler must be shareable.
pub struct HttpTransport {
    config: HttpConfig,
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    metrics: Option<Arc<Metrics>>,
    stats: Arc<StatCounters>,
    cancel: Mutex<CancellationToken>,
    done: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            handler: Mutex::new(None),
            metrics: None,
            stats: StatCounters::new(),
            cancel: Mutex::new(CancellationToken::new()),
            done: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Expose `GET /metrics` backed by this collector.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The bound address once started. With port 0 this is the real port.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.local_addr.lock() {
            Ok(guard) => *guard,
            Err(_) => None,
        }
    }

    fn current_handler(&self) -> Option<Arc<dyn MessageHandler>> {
        match self.handler.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }

    fn store_tokens(&self, cancel: &CancellationToken, done: &CancellationToken) {
        if let Ok(mut slot) = self.cancel.lock() {
            *slot = cancel.clone();
        }
        if let Ok(mut slot) = self.done.lock() {
            *slot = done.clone();
        }
    }

    fn cancel_token(&self) -> CancellationToken {
        match self.cancel.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => CancellationToken::new(),
        }
    }

    fn done_token(&self) -> CancellationToken {
        match self.done.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => CancellationToken::new(),
        }
    }

    fn take_task(&self) -> Option<JoinHandle<()>> {
        match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        if let Ok(mut slot) = self.handler.lock() {
            *slot = Some(handler);
        }
    }

    async fn start(&self) -> Result<()> {
        if self.stats.is_connected() {
            return Err(Error::Transport(
                "http transport already running".to_string(),
            ));
        }
        let handler = self
            .current_handler()
            .ok_or_else(|| Error::Transport("no message handler set".to_string()))?;

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Transport(format!("failed to bind {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Transport(format!("failed to read bound address: {}", e)))?;
        if let Ok(mut slot) = self.local_addr.lock() {
            *slot = Some(local_addr);
        }

        let state = AppState {
            handler,
            metrics: self.metrics.clone(),
            stats: Arc::clone(&self.stats),
            debug: self.config.debug,
        };
        let app = build_router(state, &self.config);

        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        self.store_tokens(&cancel, &done);

        let stats = Arc::clone(&self.stats);
        stats.mark_connected();

        let server =
            axum::serve(listener, app).with_graceful_shutdown(cancel.clone().cancelled_owned());
        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("http server error: {}", e);
                stats.inc_errors();
            }
            stats.mark_disconnected();
            done.cancel();
        });

        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }
        info!(addr = %local_addr, "http transport started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.cancel_token().cancel();
        if let Some(task) = self.take_task() {
            if let Err(e) = task.await {
                warn!("http transport task ended abnormally: {}", e);
            }
        }
        info!("http transport stopped");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stats.is_connected()
    }

    fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }

    async fn closed(&self) {
        self.done_token().cancelled_owned().await;
    }
}

/// Requests past this cap queue until a slot frees up.
const MAX_CONCURRENT_REQUESTS: usize = 256;

fn build_router(state: AppState, config: &HttpConfig) -> Router {
    let mut router = Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .concurrency_limit(MAX_CONCURRENT_REQUESTS)
                .timeout(Duration::from_secs(config.timeout_secs)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if config.compression {
        router = router.layer(CompressionLayer::new());
    }
    router
}

/// JSON-RPC endpoint. Notification-only bodies get `202 Accepted`.
async fn handle_mcp(State(state): State<AppState>, body: String) -> Response {
    state.stats.inc_received();
    if state.debug {
        debug!(%body, "mcp request body");
    }

    match state.handler.handle(&body).await {
        Some(response) => {
            state.stats.inc_sent();
            (
                [(header::CONTENT_TYPE, "application/json")],
                response,
            )
                .into_response()
        }
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Health check endpoint.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// Prometheus endpoint, 404 unless a metrics handle is attached.
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(metrics) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics.to_prometheus(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_middleware_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("internal middleware error: {}", err),
        )
    }
}
