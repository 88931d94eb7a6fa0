//! Test server harness for E2E testing
//!
//! Provides `TestIntercomServer` for spawning real intercom server instances
//! in tests, backed by any `MediaBridge`.

use intercom_service::bridge::MediaBridge;
use intercom_service::config::Config;
use intercom_service::directory::{LivenessThresholds, SessionDirectory};
use intercom_service::routes::{self, AppState};
use intercom_service::serializer::RequestSerializer;
use intercom_service::services::Orchestrator;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the intercom server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let server = TestIntercomServer::spawn(Arc::new(MockBridge::new())).await?;
/// let response = reqwest::get(format!("{}/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestIntercomServer {
    addr: SocketAddr,
    orchestrator: Arc<Orchestrator>,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestIntercomServer {
    /// Spawn a server on a random local port with default configuration.
    pub async fn spawn(bridge: Arc<dyn MediaBridge>) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(bridge, HashMap::new()).await
    }

    /// Spawn a server, overriding configuration variables with `overrides`.
    pub async fn spawn_with_vars(
        bridge: Arc<dyn MediaBridge>,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            (
                "BRIDGE_URL".to_string(),
                "http://bridge.invalid/conferences".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let directory = Arc::new(SessionDirectory::in_memory(LivenessThresholds {
            active: config.session_active_threshold,
            disconnect: config.session_disconnect_threshold,
        }));
        let orchestrator = Arc::new(
            Orchestrator::new(bridge, directory, RequestSerializer::new())
                .with_endpoint_idle_timeout(config.endpoint_idle_timeout_seconds),
        );

        let state = Arc::new(AppState {
            orchestrator: Arc::clone(&orchestrator),
            config: config.clone(),
        });

        // A local recorder handle; the global recorder is left alone so
        // parallel tests do not fight over it.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            orchestrator,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The orchestrator behind the routes, for direct state inspection.
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestIntercomServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
