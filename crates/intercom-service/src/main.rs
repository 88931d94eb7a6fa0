//! Intercom Service
//!
//! Session broker between WebRTC intercom clients and a media bridge.
//!
//! # Startup
//!
//! 1. Initialize tracing and load configuration
//! 2. Install the Prometheus metrics recorder
//! 3. Build the bridge client, session directory and orchestrator
//! 4. Spawn the session sweeper and bridge status poller
//! 5. Serve HTTP until SIGINT/SIGTERM, then drain and stop the tasks

use common::secret::is_configured;
use intercom_service::bridge::{BridgeClient, MediaBridge};
use intercom_service::config::Config;
use intercom_service::directory::{LivenessThresholds, SessionDirectory};
use intercom_service::observability::metrics::init_metrics_recorder;
use intercom_service::routes::{self, AppState};
use intercom_service::serializer::RequestSerializer;
use intercom_service::services::Orchestrator;
use intercom_service::tasks::{start_bridge_status_poller, start_session_sweeper};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intercom_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Intercom Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        bridge_url = %config.bridge_url,
        bridge_auth = is_configured(config.bridge_api_key.as_ref()),
        endpoint_idle_timeout_seconds = config.endpoint_idle_timeout_seconds,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        format!("Failed to install Prometheus metrics recorder: {e}")
    })?;
    info!("Prometheus metrics recorder initialized");

    let bridge: Arc<dyn MediaBridge> = Arc::new(
        BridgeClient::new(&config.bridge_url, config.bridge_api_key.clone()).map_err(|e| {
            error!("Failed to create bridge client: {}", e);
            e
        })?,
    );

    let directory = Arc::new(SessionDirectory::in_memory(LivenessThresholds {
        active: config.session_active_threshold,
        disconnect: config.session_disconnect_threshold,
    }));

    let serializer = RequestSerializer::new();
    let orchestrator = Arc::new(
        Orchestrator::new(Arc::clone(&bridge), Arc::clone(&directory), serializer.clone())
            .with_endpoint_idle_timeout(config.endpoint_idle_timeout_seconds),
    );

    // Background tasks
    let cancel_token = CancellationToken::new();

    let sweeper_token = cancel_token.child_token();
    let sweeper_handle = tokio::spawn(start_session_sweeper(
        Arc::clone(&orchestrator),
        config.session_sweep_interval,
        sweeper_token,
    ));

    let status_token = cancel_token.child_token();
    let status_handle = tokio::spawn(start_bridge_status_poller(
        Arc::clone(&bridge),
        config.bridge_status_interval,
        status_token,
    ));

    let bind_address = config.bind_address.clone();
    let drain_seconds = config.drain_seconds;

    let state = Arc::new(AppState {
        orchestrator,
        config,
    });
    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Intercom Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_seconds))
    .await?;

    info!("Stopping background tasks...");
    cancel_token.cancel();
    serializer.shutdown();

    if let Err(e) = sweeper_handle.await {
        warn!(error = %e, "Session sweeper task ended abnormally");
    }
    if let Err(e) = status_handle.await {
        warn!(error = %e, "Bridge status task ended abnormally");
    }

    info!("Intercom Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal(drain_seconds: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", drain_seconds);
        tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    }
}
