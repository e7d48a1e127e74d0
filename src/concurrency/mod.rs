//! C2: bounded admission layer. An unbounded FIFO submission queue feeds a
//! dispatcher that gates concurrent execution with a counting semaphore
//! (the "GPU slot" of the spec) sized to `max_parallel_jobs`. Kept as an
//! explicit-lifecycle component (`start`/`stop`), constructed fresh per
//! process/test, never an ambient singleton.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Terminal result of one subprocess invocation, handed back to whoever
/// called `submit`.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub exit_code: i32,
}

type BoxedJob = Pin<Box<dyn Future<Output = JobOutcome> + Send>>;

struct Submission {
    job: BoxedJob,
    completion: oneshot::Sender<JobOutcome>,
}

#[derive(Debug, thiserror::Error)]
#[error("concurrency manager is shut down")]
pub struct ShutDown;

/// Bounded worker pool + GPU semaphore + FIFO submission queue, per §4.2.
pub struct ConcurrencyManager {
    sender: mpsc::UnboundedSender<Submission>,
    semaphore: Arc<Semaphore>,
    token: CancellationToken,
    dispatcher: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ConcurrencyManager {
    /// Constructs the manager and immediately starts its dispatcher task
    /// (equivalent to the spec's `start()`, folded into construction since
    /// this crate never needs a manager that exists without running).
    pub fn start(max_parallel_jobs: usize) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(max_parallel_jobs.max(1)));
        let token = CancellationToken::new();

        let manager = Arc::new(Self {
            sender,
            semaphore: Arc::clone(&semaphore),
            token: token.clone(),
            dispatcher: std::sync::Mutex::new(None),
        });

        let handle = tokio::spawn(Self::dispatch_loop(receiver, semaphore, token));
        *manager.dispatcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        manager
    }

    /// Enqueues `job` and returns a handle resolving to its terminal result.
    /// The queue is unbounded: submission never blocks on pool capacity,
    /// only the eventual await does.
    pub fn submit(
        &self,
        job: impl Future<Output = JobOutcome> + Send + 'static,
    ) -> Result<oneshot::Receiver<JobOutcome>, ShutDown> {
        if self.token.is_cancelled() {
            return Err(ShutDown);
        }
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Submission {
                job: Box::pin(job),
                completion: tx,
            })
            .map_err(|_| ShutDown)?;
        Ok(rx)
    }

    /// Cancels dispatch of not-yet-started submissions and waits (up to a
    /// bounded grace period) for in-flight jobs to finish. In-flight
    /// subprocesses are allowed to complete; only the dispatcher loop itself
    /// is cancelled, never an already-spawned job.
    pub async fn stop(&self, grace_period: std::time::Duration) {
        self.token.cancel();
        let handle = self.dispatcher.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(grace_period, handle).await;
        }
    }

    /// Single dequeue loop: FIFO order is preserved because submissions are
    /// only ever handed to a freshly spawned task after this loop acquires a
    /// permit for them — two jobs submitted in order never race for which
    /// starts first.
    async fn dispatch_loop(
        mut receiver: mpsc::UnboundedReceiver<Submission>,
        semaphore: Arc<Semaphore>,
        token: CancellationToken,
    ) {
        loop {
            let submission = tokio::select! {
                _ = token.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(submission) => submission,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = token.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            tokio::spawn(async move {
                let outcome = submission.job.await;
                let _ = submission.completion.send(outcome);
                drop(permit);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn pool_bound_never_exceeds_max_parallel_jobs() {
        let manager = ConcurrencyManager::start(2);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let mut receivers = Vec::new();
        for _ in 0..6 {
            let concurrent = Arc::clone(&concurrent);
            let max_observed = Arc::clone(&max_observed);
            let rx = manager
                .submit(async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    JobOutcome { exit_code: 0 }
                })
                .unwrap();
            receivers.push(rx);
        }
        for rx in receivers {
            rx.await.unwrap();
        }
        assert!(max_observed.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn fifo_submission_with_pool_size_one_starts_in_order() {
        let manager = ConcurrencyManager::start(1);
        let start_order = Arc::new(Mutex::new(Vec::new()));

        let mut receivers = Vec::new();
        for label in ["A", "B", "C"] {
            let start_order = Arc::clone(&start_order);
            let rx = manager
                .submit(async move {
                    start_order.lock().await.push(label);
                    JobOutcome { exit_code: 0 }
                })
                .unwrap();
            receivers.push(rx);
        }
        for rx in receivers {
            rx.await.unwrap();
        }
        assert_eq!(*start_order.lock().await, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn submit_after_stop_fails_with_shutdown() {
        let manager = ConcurrencyManager::start(1);
        manager.stop(Duration::from_secs(1)).await;
        let result = manager.submit(async { JobOutcome { exit_code: 0 } });
        assert!(result.is_err());
    }
}
