//! Session sweeper background task.
//!
//! Recomputes session liveness on a fixed interval, reaps expired sessions,
//! releases their bridge endpoints and wakes participant long-polls when the
//! picture changed.
//!
//! # Graceful Shutdown
//!
//! The task exits when the cancellation token is triggered.

use crate::observability::metrics;
use crate::services::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Start the session sweeper.
///
/// # Arguments
///
/// * `orchestrator` - Owner of the directory and bridge to sweep
/// * `interval` - Time between sweeps
/// * `cancel_token` - Token for graceful shutdown
#[instrument(skip_all, name = "intercom.task.session_sweeper")]
pub async fn start_session_sweeper(
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "intercom.task.session_sweeper",
        interval_ms = interval.as_millis() as u64,
        "Starting session sweeper task"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = orchestrator.sweep_sessions(Instant::now());
                metrics::set_session_counts(
                    report.counts.active,
                    report.counts.inactive,
                    report.counts.expired,
                );
                if !report.reaped.is_empty() {
                    metrics::record_sessions_reaped(report.reaped.len());
                }
                if report.notified {
                    debug!(
                        target: "intercom.task.session_sweeper",
                        active = report.counts.active,
                        inactive = report.counts.inactive,
                        reaped = report.reaped.len(),
                        "Session picture changed"
                    );
                }
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "intercom.task.session_sweeper",
                    "Session sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "intercom.task.session_sweeper", "Session sweeper stopped");
}
