//! Bridge status poller background task.
//!
//! Lists the bridge's conferences on a fixed interval and logs endpoints
//! whose ICE or DTLS transport has failed. Runs apart from the session
//! sweeper so bridge latency never delays liveness tracking.

use crate::bridge::MediaBridge;
use crate::observability::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Poll every conference once. Returns the number of failed endpoints.
pub async fn check_bridge_status(bridge: &dyn MediaBridge) -> usize {
    let mut failed = 0;
    for conference_id in bridge.list_conferences().await {
        for endpoint in bridge.get_conference_detail(&conference_id).await {
            if endpoint.is_failed() {
                failed += 1;
                warn!(
                    target: "intercom.task.bridge_status",
                    conference_id = %conference_id,
                    endpoint_id = %endpoint.id,
                    ice_state = %endpoint.ice_state,
                    dtls_state = %endpoint.dtls_state,
                    "Bridge endpoint transport failed"
                );
            }
        }
    }
    failed
}

/// Start the bridge status poller.
///
/// # Arguments
///
/// * `bridge` - Bridge to poll; list/detail failures read as empty
/// * `interval` - Time between polls
/// * `cancel_token` - Token for graceful shutdown
#[instrument(skip_all, name = "intercom.task.bridge_status")]
pub async fn start_bridge_status_poller(
    bridge: Arc<dyn MediaBridge>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "intercom.task.bridge_status",
        interval_seconds = interval.as_secs(),
        "Starting bridge status poller"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let failed = check_bridge_status(bridge.as_ref()).await;
                metrics::set_bridge_failed_endpoints(failed);
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "intercom.task.bridge_status",
                    "Bridge status poller received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "intercom.task.bridge_status", "Bridge status poller stopped");
}
