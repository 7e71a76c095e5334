//! Server lifecycle.
//!
//! [`McpServer`] owns the registries, the protocol handler, the metrics
//! collector, and the active transport. Lifecycle transitions are serialized
//! behind one lock; snapshot accessors never block dispatch.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{Config, Transport as TransportMode};
use crate::error::{Error, Result};
use crate::metrics::{self, Metrics, MetricsSnapshot};
use crate::protocol::handler::ProtocolHandler;
use crate::registry::{Registry, RegistryCounts};
use crate::transport::http::{HttpConfig, HttpTransport};
use crate::transport::stdio::StdioTransport;
use crate::transport::Transport;

/// Lifecycle state machine: `Uninitialized → Initialized → Running ⇄ Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Point-in-time server status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub instance_id: Uuid,
    pub state: ServerState,
    pub transport: Option<String>,
    pub connected: bool,
    pub registered: RegistryCounts,
    pub uptime_secs: u64,
}

/// MCP server.
pub struct McpServer {
    config: Config,
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
    handler: Arc<ProtocolHandler>,
    state: RwLock<ServerState>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    /// Serializes lifecycle transitions. The state and transport locks are
    /// only ever held for non-awaiting sections, so snapshot readers can
    /// never interleave into a deadlock with a transition.
    lifecycle: Mutex<()>,
    instance_id: Uuid,
    started_at: Instant,
    terminated: AtomicBool,
}

impl McpServer {
    pub fn new(config: Config, registry: Arc<Registry>) -> Self {
        let metrics = Metrics::new();
        let handler = Arc::new(ProtocolHandler::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
        ));

        Self {
            config,
            registry,
            metrics,
            handler,
            state: RwLock::new(ServerState::Uninitialized),
            transport: RwLock::new(None),
            lifecycle: Mutex::new(()),
            instance_id: Uuid::new_v4(),
            started_at: Instant::now(),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn handler(&self) -> &Arc<ProtocolHandler> {
        &self.handler
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// `Uninitialized → Initialized`. The capability set declared by the
    /// handler becomes visible to clients from here on.
    pub async fn initialize(&self) -> Result<()> {
        let _transition = self.lifecycle.lock().await;

        let state = *self.state.read().await;
        if state != ServerState::Uninitialized {
            return Err(Error::state(format!(
                "cannot initialize from {} state",
                state
            )));
        }

        *self.state.write().await = ServerState::Initialized;
        info!(
            instance = %self.instance_id,
            capabilities = ?self.handler.declared_capabilities().features().collect::<Vec<_>>(),
            "server initialized"
        );
        Ok(())
    }

    /// Build the configured transport, wire the handler, and enter `Running`.
    ///
    /// A fresh transport is built on every start so `Stopped → Running` never
    /// reuses a closed listener.
    pub async fn start(&self) -> Result<()> {
        let _transition = self.lifecycle.lock().await;

        if self.terminated.load(Ordering::SeqCst) {
            return Err(Error::state("server has been shut down"));
        }

        match *self.state.read().await {
            ServerState::Initialized | ServerState::Stopped => {}
            other => return Err(Error::state(format!("cannot start from {} state", other))),
        }

        let transport = self.build_transport();
        transport.set_handler(self.handler.clone());
        transport.start().await?;

        *self.transport.write().await = Some(transport);
        *self.state.write().await = ServerState::Running;
        self.metrics.set_active_connections(1);
        info!(transport = %self.config.transport, "server running");
        Ok(())
    }

    /// `Running → Stopped`, closing the active transport.
    pub async fn stop(&self) -> Result<()> {
        let _transition = self.lifecycle.lock().await;

        let state = *self.state.read().await;
        if state != ServerState::Running {
            return Err(Error::state(format!("cannot stop from {} state", state)));
        }

        let transport = self.transport.write().await.take();
        if let Some(transport) = transport {
            transport.stop().await?;
        }
        *self.state.write().await = ServerState::Stopped;
        self.metrics.set_active_connections(0);
        info!("server stopped");
        Ok(())
    }

    /// Stop, then start. The stop step is skipped when there is nothing
    /// running, so a restart after `stop()` simply brings the server back up.
    pub async fn restart(&self) -> Result<()> {
        match self.stop().await {
            Ok(()) | Err(Error::State(_)) => {}
            Err(e) => return Err(e),
        }
        self.start().await
    }

    /// Terminal stop: closes the transport, clears the registries, and
    /// refuses any further start.
    pub async fn shutdown(&self) -> Result<()> {
        let _transition = self.lifecycle.lock().await;
        self.terminated.store(true, Ordering::SeqCst);

        let transport = self.transport.write().await.take();
        if let Some(transport) = transport {
            if let Err(e) = transport.stop().await {
                warn!("transport stop during shutdown failed: {}", e);
            }
        }
        *self.state.write().await = ServerState::Stopped;
        self.metrics.set_active_connections(0);

        self.registry.clear_all();
        info!("server shut down");
        Ok(())
    }

    /// Start, then serve until SIGINT/SIGTERM or the transport exits.
    pub async fn run(&self) -> Result<()> {
        self.start().await?;

        let transport = self.transport.read().await.clone();
        if let Some(transport) = transport {
            wait_for_shutdown(transport.as_ref()).await;
        }

        match self.stop().await {
            Ok(()) => Ok(()),
            // The transport may have already closed underneath a racing stop.
            Err(Error::State(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Reads state first, then the transport slot, dropping each guard
    /// before the next; the same order every snapshot accessor uses.
    pub async fn status(&self) -> ServerStatus {
        let state = *self.state.read().await;
        let transport = self.transport.read().await;
        let name = transport.as_ref().map(|t| t.name().to_string());
        let connected = transport.as_ref().map(|t| t.is_connected()).unwrap_or(false);
        drop(transport);

        ServerStatus {
            instance_id: self.instance_id,
            state,
            transport: name,
            connected,
            registered: self.registry.counts(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    pub async fn health(&self) -> Value {
        let state = *self.state.read().await;
        json!({
            "status": if state == ServerState::Running { "ok" } else { "idle" },
            "state": state,
            "version": crate::VERSION,
        })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Everything an operator would want in one snapshot.
    pub async fn diagnostics(&self) -> Value {
        let state = *self.state.read().await;
        let transport = self.transport.read().await;
        let transport_name = transport.as_ref().map(|t| t.name().to_string());
        let transport_stats = transport.as_ref().map(|t| t.stats());
        drop(transport);

        json!({
            "instanceId": self.instance_id,
            "state": state,
            "uptimeSecs": self.started_at.elapsed().as_secs(),
            "declaredCapabilities": self.handler.declared_capabilities(),
            "negotiatedCapabilities": self.handler.negotiated_capabilities().await,
            "registry": self.registry.counts(),
            "counters": self.metrics.snapshot(),
            "transport": transport_name,
            "transportStats": transport_stats,
            "memoryRssBytes": metrics::memory_rss_bytes(),
        })
    }

    fn build_transport(&self) -> Arc<dyn Transport> {
        match self.config.transport {
            TransportMode::Stdio => Arc::new(StdioTransport::new(
                self.config.framing,
                self.config.compress,
            )),
            TransportMode::Http => Arc::new(
                HttpTransport::new(HttpConfig {
                    host: self.config.host.clone(),
                    port: self.config.port,
                    timeout_secs: self.config.timeout_secs,
                    debug: self.config.debug,
                    compression: self.config.compress,
                })
                .with_metrics(Arc::clone(&self.metrics)),
            ),
        }
    }
}

async fn wait_for_shutdown(transport: &dyn Transport) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                tokio::select! {
                    _ = ctrl_c => info!("received ctrl-c, shutting down"),
                    _ = transport.closed() => info!("transport closed"),
                }
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => info!("received ctrl-c, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = transport.closed() => info!("transport closed"),
        }
    }

    #[cfg(not(unix))]
    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = transport.closed() => info!("transport closed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_config() -> Config {
        Config {
            transport: TransportMode::Http,
            port: 0,
            ..Config::default()
        }
    }

    fn server() -> McpServer {
        McpServer::new(http_config(), Arc::new(Registry::new()))
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let server = server();
        assert_eq!(server.state().await, ServerState::Uninitialized);

        server.initialize().await.unwrap();
        assert_eq!(server.state().await, ServerState::Initialized);

        server.start().await.unwrap();
        assert_eq!(server.state().await, ServerState::Running);

        server.stop().await.unwrap();
        assert_eq!(server.state().await, ServerState::Stopped);

        server.restart().await.unwrap();
        assert_eq!(server.state().await, ServerState::Running);

        server.restart().await.unwrap();
        assert_eq!(server.state().await, ServerState::Running);

        server.shutdown().await.unwrap();
        assert_eq!(server.state().await, ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_after_stop_ends_running() {
        let server = server();
        server.initialize().await.unwrap();
        server.start().await.unwrap();
        server.stop().await.unwrap();

        server.restart().await.unwrap();
        assert_eq!(server.state().await, ServerState::Running);

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_snapshots_and_transitions() {
        use std::time::Duration;

        let server = Arc::new(server());
        server.initialize().await.unwrap();
        server.start().await.unwrap();

        let poller = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                for _ in 0..50 {
                    let _ = server.status().await;
                    let _ = server.health().await;
                    let _ = server.diagnostics().await;
                }
            })
        };
        let cycler = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                for _ in 0..10 {
                    server.stop().await.unwrap();
                    server.start().await.unwrap();
                }
            })
        };

        tokio::time::timeout(Duration::from_secs(10), async {
            poller.await.unwrap();
            cycler.await.unwrap();
        })
        .await
        .expect("snapshots must not block lifecycle transitions");

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_before_initialize_fails() {
        let server = server();
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[tokio::test]
    async fn test_double_initialize_fails() {
        let server = server();
        server.initialize().await.unwrap();
        assert!(server.initialize().await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_is_terminal() {
        let server = server();
        server.initialize().await.unwrap();
        server.start().await.unwrap();

        server.shutdown().await.unwrap();
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[tokio::test]
    async fn test_shutdown_clears_registries() {
        use crate::registry::ToolHandler;
        use crate::protocol::types::{Tool, ToolResult};
        use crate::registry::component::success_result;
        use async_trait::async_trait;
        use serde_json::json;
        use std::collections::HashMap;

        struct NoopTool;

        #[async_trait]
        impl ToolHandler for NoopTool {
            fn definition(&self) -> Tool {
                Tool {
                    name: "noop".to_string(),
                    description: String::new(),
                    input_schema: json!({"type": "object"}),
                }
            }

            async fn execute(&self, _args: HashMap<String, Value>) -> Result<ToolResult> {
                Ok(success_result("ok"))
            }
        }

        let registry = Arc::new(Registry::new());
        registry
            .tools
            .register(Arc::new(NoopTool), HashMap::new())
            .unwrap();

        let server = McpServer::new(http_config(), registry);
        server.initialize().await.unwrap();
        assert_eq!(server.registry().counts().total(), 1);

        server.shutdown().await.unwrap();
        assert_eq!(server.registry().counts().total(), 0);
    }

    #[tokio::test]
    async fn test_status_and_health_snapshots() {
        let server = server();
        server.initialize().await.unwrap();
        server.start().await.unwrap();

        let status = server.status().await;
        assert_eq!(status.state, ServerState::Running);
        assert_eq!(status.transport.as_deref(), Some("http"));
        assert!(status.connected);

        let health = server.health().await;
        assert_eq!(health["status"], json!("ok"));
        assert_eq!(health["state"], json!("running"));

        let diagnostics = server.diagnostics().await;
        assert_eq!(diagnostics["state"], json!("running"));
        assert!(diagnostics["declaredCapabilities"]["tools"].is_object());
        assert_eq!(diagnostics["counters"]["requests_processed"], json!(0));

        server.stop().await.unwrap();

        let health = server.health().await;
        assert_eq!(health["status"], json!("idle"));
    }

    #[tokio::test]
    async fn test_stopped_transport_slot_is_cleared() {
        let server = server();
        server.initialize().await.unwrap();
        server.start().await.unwrap();
        server.stop().await.unwrap();

        let status = server.status().await;
        assert_eq!(status.transport, None);
        assert!(!status.connected);
    }
}
