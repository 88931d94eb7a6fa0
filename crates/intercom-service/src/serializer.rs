//! `RequestSerializer` - process-wide FIFO for bridge check-then-act sequences.
//!
//! Every job shares one queue and runs to completion before the next one
//! starts. A job's result, success or error, goes only to its own caller.
//! Jobs run in their own spawned task, so a panicking job is reported to its
//! waiter as `IntercomError::Internal` and the queue moves on.
//!
//! The queue is global rather than sharded per line. Conference allocation
//! happens once per line's cold start, so the contention is negligible.

use crate::errors::IntercomError;
use crate::observability::metrics;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct QueuedJob {
    job: Job,
    enqueued_at: Instant,
}

/// Handle to the serializer actor.
#[derive(Clone)]
pub struct RequestSerializer {
    sender: mpsc::UnboundedSender<QueuedJob>,
    cancel_token: CancellationToken,
}

impl RequestSerializer {
    /// Spawn the serializer actor and return a handle to it.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        tokio::spawn(run(receiver, cancel_token.clone()));

        Self {
            sender,
            cancel_token,
        }
    }

    /// Run `task` after every previously enqueued task has finished.
    ///
    /// # Errors
    ///
    /// Returns the task's own error, or `IntercomError::Internal` if the task
    /// panicked or the serializer has shut down.
    pub async fn enqueue<T, F, Fut>(&self, task: F) -> Result<T, IntercomError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, IntercomError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let result = task().await;
            // The caller may have given up; nothing to do then.
            let _ = tx.send(result);
        });

        self.sender
            .send(QueuedJob {
                job,
                enqueued_at: Instant::now(),
            })
            .map_err(|_| {
                error!(target: "intercom.serializer", "Serializer is not running");
                IntercomError::Internal
            })?;

        rx.await.map_err(|_| {
            warn!(target: "intercom.serializer", "Serialized job ended without a result");
            IntercomError::Internal
        })?
    }

    /// Stop accepting work. Queued jobs are dropped and their callers see
    /// `IntercomError::Internal`.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Default for RequestSerializer {
    fn default() -> Self {
        Self::new()
    }
}

#[instrument(skip_all, name = "intercom.serializer")]
async fn run(mut receiver: mpsc::UnboundedReceiver<QueuedJob>, cancel_token: CancellationToken) {
    debug!(target: "intercom.serializer", "Request serializer started");
    let mut processed: u64 = 0;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!(target: "intercom.serializer", "Request serializer received cancellation signal");
                break;
            }

            queued = receiver.recv() => {
                let Some(queued) = queued else {
                    debug!(target: "intercom.serializer", "All serializer handles dropped, exiting");
                    break;
                };

                metrics::record_serializer_wait(queued.enqueued_at.elapsed());

                if let Err(e) = tokio::spawn(queued.job).await {
                    if e.is_panic() {
                        error!(target: "intercom.serializer", "Serialized job panicked");
                    } else {
                        warn!(target: "intercom.serializer", error = %e, "Serialized job was cancelled");
                    }
                }
                processed += 1;
            }
        }
    }

    info!(target: "intercom.serializer", jobs_processed = processed, "Request serializer stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_returns_task_value() {
        let serializer = RequestSerializer::new();
        let value = serializer.enqueue(|| async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_error_goes_only_to_its_caller() {
        let serializer = RequestSerializer::new();

        let failed: Result<(), _> = serializer
            .enqueue(|| async { Err(IntercomError::LineNotFound("l1".to_string())) })
            .await;
        assert!(matches!(failed, Err(IntercomError::LineNotFound(_))));

        let next = serializer.enqueue(|| async { Ok("still running") }).await;
        assert_eq!(next.unwrap(), "still running");
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let serializer = RequestSerializer::new();

        let panicked: Result<(), _> = serializer
            .enqueue(|| async { panic!("job blew up") })
            .await;
        assert!(matches!(panicked, Err(IntercomError::Internal)));

        let next = serializer.enqueue(|| async { Ok(1) }).await;
        assert_eq!(next.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tasks_never_overlap_and_run_in_order() {
        let serializer = RequestSerializer::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut waiters = Vec::new();
        for i in 0..5 {
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            let order = Arc::clone(&order);
            // join_all polls in vec order, which fixes submission order.
            let fut = serializer.enqueue(move || async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                order.lock().unwrap().push(i);
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
            waiters.push(fut);
        }

        futures::future::join_all(waiters).await;

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_internal() {
        let serializer = RequestSerializer::new();
        serializer.shutdown();
        // Give the actor a chance to observe cancellation.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = serializer.enqueue(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(IntercomError::Internal)));
    }
}
