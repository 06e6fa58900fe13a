//! Fold job execution substrate.
//!
//! The orchestrator never spawns tasks directly; it hands opaque fold
//! futures to a [`JobExecutor`] and joins the returned handles. That
//! keeps the scheduling transport (in-process tasks today, a queue
//! tomorrow) swappable without touching the state machine. A handle
//! reports exactly once: either the job's own output or an abort if the
//! execution substrate lost the job.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Semaphore};

use crate::errors::JobError;
use crate::trainer::FoldResult;

/// Output of one fold job, tagged with its submission-order index.
pub type FoldOutput = (usize, Result<FoldResult, JobError>);

/// A boxed fold job future.
pub type FoldTask = Pin<Box<dyn Future<Output = FoldOutput> + Send>>;

/// Token for requesting cancellation of a pipeline run.
///
/// Cancellation is cooperative: jobs observe the token before doing
/// work; in-flight jobs are allowed to finish. The first cancel reason
/// wins.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl CancellationToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Requests cancellation. Idempotent; the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            *self.reason.lock() = Some(reason.into());
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

/// Handle to a submitted fold job.
#[derive(Debug)]
pub struct JobHandle {
    fold_index: usize,
    rx: oneshot::Receiver<FoldOutput>,
}

impl JobHandle {
    /// Waits for the job to report its output.
    ///
    /// A job whose reporting channel closed without a value (panicked or
    /// dropped by the substrate) joins as an [`JobError::Aborted`]
    /// failure rather than poisoning the whole collection phase.
    pub async fn join(self) -> FoldOutput {
        match self.rx.await {
            Ok(output) => output,
            Err(_) => (
                self.fold_index,
                Err(JobError::Aborted(
                    "job terminated without reporting a result".to_string(),
                )),
            ),
        }
    }
}

/// Joins every handle; the full barrier the orchestrator suspends at.
///
/// Outputs are returned in submission order regardless of completion
/// order.
pub async fn await_all(handles: Vec<JobHandle>) -> Vec<FoldOutput> {
    futures::future::join_all(handles.into_iter().map(JobHandle::join)).await
}

/// Dispatches fold jobs for concurrent execution.
pub trait JobExecutor: Send + Sync {
    /// Submits a fold job and returns its handle.
    fn submit(&self, fold_index: usize, task: FoldTask) -> JobHandle;
}

/// In-process executor on the tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct TokioJobExecutor {
    limiter: Option<Arc<Semaphore>>,
}

impl TokioJobExecutor {
    /// Creates an executor that runs every submitted job immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor that runs at most `max_concurrent` jobs at a
    /// time; further submissions queue on a semaphore.
    #[must_use]
    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            limiter: Some(Arc::new(Semaphore::new(max_concurrent.max(1)))),
        }
    }
}

impl JobExecutor for TokioJobExecutor {
    fn submit(&self, fold_index: usize, task: FoldTask) -> JobHandle {
        let (tx, rx) = oneshot::channel();
        let limiter = self.limiter.clone();

        tokio::spawn(async move {
            let _permit = match limiter {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            let output = task.await;
            // The receiver may be gone if the pipeline was dropped; the
            // job already ran to completion either way.
            let _ = tx.send(output);
        });

        JobHandle { fold_index, rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::ParamAssignment;
    use std::time::Duration;

    fn ok_result(fold_index: usize, accuracy: f64) -> FoldOutput {
        (
            fold_index,
            Ok(FoldResult {
                fold_index,
                accuracy,
                params: ParamAssignment::new(),
                elapsed: Duration::from_millis(1),
            }),
        )
    }

    #[tokio::test]
    async fn test_outputs_keep_submission_order() {
        let executor = TokioJobExecutor::new();
        let handles = vec![
            executor.submit(
                0,
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    ok_result(0, 0.5)
                }),
            ),
            executor.submit(1, Box::pin(async { ok_result(1, 0.9) })),
        ];

        let outputs = await_all(handles).await;

        // Fold 1 finished first but fold 0 is still reported first.
        assert_eq!(outputs[0].0, 0);
        assert_eq!(outputs[1].0, 1);
    }

    #[tokio::test]
    async fn test_panicked_job_joins_as_aborted() {
        let executor = TokioJobExecutor::new();
        let handle = executor.submit(
            2,
            Box::pin(async {
                panic!("fold job blew up");
            }),
        );

        let (fold_index, result) = handle.join().await;

        assert_eq!(fold_index, 2);
        assert!(matches!(result, Err(JobError::Aborted(_))));
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_respected() {
        use std::sync::atomic::AtomicUsize;

        let executor = TokioJobExecutor::with_max_concurrent(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                executor.submit(
                    i,
                    Box::pin(async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        ok_result(i, 0.5)
                    }),
                )
            })
            .collect();

        let outputs = await_all(handles).await;

        assert_eq!(outputs.len(), 4);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancellation_token_first_reason_wins() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        token.cancel("caller shutdown");
        token.cancel("second reason");

        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("caller shutdown"));
    }
}
