//! Fire-and-forget task pool.
//!
//! [`TaskPool`] runs submitted operations on a tokio runtime with at most
//! `max_workers` of them executing at once. `submit` returns a [`TaskHandle`]
//! right away; callbacks registered on it fire once the operation finishes
//! (immediately, if it already has). Errors and panics inside an operation are
//! caught at the pool boundary and routed to the failure callback.
//!
//! The pool is owned by the caller and passed in explicitly. Nothing is
//! cancelled once submitted, not even when the pool is dropped; call
//! [`TaskPool::wait`] to drain queued work.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::config::ClientConfig;
use super::errors::InferenceError;

type SuccessCallback<T> = Box<dyn FnOnce(T) + Send>;
type FailureCallback = Box<dyn FnOnce(InferenceError) + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Handle ──────────────────────────────────────────────────────────────────

struct Slot<T> {
    outcome: Option<Result<T, InferenceError>>,
    on_success: Option<SuccessCallback<T>>,
    on_failure: Option<FailureCallback>,
}

/// Completion handle for one submitted operation.
///
/// Exactly one of the two callbacks ever fires, at most once.
pub struct TaskHandle<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                outcome: None,
                on_success: None,
                on_failure: None,
            })),
        }
    }

    /// Register the callback for a successful result.
    pub fn on_success(&self, callback: impl FnOnce(T) + Send + 'static) -> &Self {
        lock(&self.slot).on_success = Some(Box::new(callback));
        self.dispatch();
        self
    }

    /// Register the callback for a failure. Receives the wrapped error.
    pub fn on_failure(&self, callback: impl FnOnce(InferenceError) + Send + 'static) -> &Self {
        lock(&self.slot).on_failure = Some(Box::new(callback));
        self.dispatch();
        self
    }

    /// The operation has finished and its outcome has not been delivered yet.
    pub fn is_finished(&self) -> bool {
        lock(&self.slot).outcome.is_some()
    }

    fn complete(&self, outcome: Result<T, InferenceError>) {
        lock(&self.slot).outcome = Some(outcome);
        self.dispatch();
    }

    /// Fire the matching callback if both it and the outcome are present.
    /// Callbacks run outside the lock.
    fn dispatch(&self) {
        let ready = {
            let mut slot = lock(&self.slot);
            match slot.outcome.take() {
                Some(Ok(value)) => match slot.on_success.take() {
                    Some(callback) => {
                        slot.on_failure = None;
                        Some(Delivery::Success(callback, value))
                    }
                    None => {
                        slot.outcome = Some(Ok(value));
                        None
                    }
                },
                Some(Err(err)) => match slot.on_failure.take() {
                    Some(callback) => {
                        slot.on_success = None;
                        Some(Delivery::Failure(callback, err))
                    }
                    None => {
                        slot.outcome = Some(Err(err));
                        None
                    }
                },
                None => None,
            }
        };

        match ready {
            Some(Delivery::Success(callback, value)) => callback(value),
            Some(Delivery::Failure(callback, err)) => callback(err),
            None => {}
        }
    }
}

enum Delivery<T> {
    Success(SuccessCallback<T>, T),
    Failure(FailureCallback, InferenceError),
}

// ─── Pool ────────────────────────────────────────────────────────────────────

/// Fixed-size pool of concurrently running operations.
pub struct TaskPool {
    runtime: Handle,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    max_workers: usize,
}

impl TaskPool {
    /// Create a pool on the current tokio runtime.
    pub fn new(max_workers: usize) -> Result<Self, InferenceError> {
        let runtime = Handle::try_current().map_err(|e| InferenceError::ConfigError {
            reason: format!("task pool needs a tokio runtime: {e}"),
        })?;
        Self::with_runtime(runtime, max_workers)
    }

    /// Create a pool that spawns onto an explicit runtime.
    pub fn with_runtime(runtime: Handle, max_workers: usize) -> Result<Self, InferenceError> {
        if max_workers == 0 {
            return Err(InferenceError::ConfigError {
                reason: "max_workers must be at least 1".into(),
            });
        }
        Ok(Self {
            runtime,
            permits: Arc::new(Semaphore::new(max_workers)),
            tasks: Mutex::new(JoinSet::new()),
            max_workers,
        })
    }

    /// Create a pool on the current runtime sized by `config.max_workers`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, InferenceError> {
        Self::new(config.max_workers)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Schedule `operation` without waiting for it.
    ///
    /// The operation starts once a worker slot is free. An `Err` it returns
    /// reaches `on_failure` as [`InferenceError::AsyncOperationFailed`]; a
    /// panic as [`InferenceError::TaskPanicked`].
    pub fn submit<T, F>(&self, operation: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, InferenceError>> + Send + 'static,
    {
        let handle = TaskHandle::new();
        let completion = handle.clone();
        let permits = Arc::clone(&self.permits);

        let task = async move {
            // The semaphore is never closed, so acquire only fails if it is.
            let _permit = permits.acquire_owned().await.ok();

            let outcome = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(InferenceError::AsyncOperationFailed {
                    source: Box::new(e),
                }),
                Err(panic) => Err(InferenceError::TaskPanicked {
                    reason: panic_message(panic.as_ref()),
                }),
            };

            if let Err(ref e) = outcome {
                tracing::warn!(error = %e, "pooled operation failed");
            }
            completion.complete(outcome);
        };

        lock(&self.tasks).spawn_on(task, &self.runtime);
        handle
    }

    /// Number of operations submitted and not yet reaped by [`wait`](Self::wait).
    pub fn pending(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Wait until every submitted operation, including ones submitted while
    /// waiting, has finished and delivered its outcome.
    pub async fn wait(&self) {
        loop {
            let mut tasks = Detached(std::mem::take(&mut *lock(&self.tasks)));
            if tasks.0.is_empty() {
                return;
            }
            while let Some(joined) = tasks.0.join_next().await {
                if let Err(e) = joined {
                    // Panics are caught inside the task; this is an abort.
                    tracing::warn!(error = %e, "pooled task did not complete");
                }
            }
        }
    }
}

impl Drop for TaskPool {
    /// Let submitted operations run to completion and deliver their outcome.
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            tracing::debug!(pending = tasks.len(), "task pool dropped, detaching operations");
        }
        tasks.detach_all();
    }
}

/// Tasks taken out of the pool by [`TaskPool::wait`]. Detached rather than
/// aborted if the waiting future is dropped.
struct Detached(JoinSet<()>);

impl Drop for Detached {
    fn drop(&mut self) {
        self.0.detach_all();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_success_callback_fires() {
        let pool = TaskPool::new(2).unwrap();
        let seen = Arc::new(Mutex::new(None));
        let failed = Arc::new(AtomicUsize::new(0));

        let handle = pool.submit(async { Ok::<_, InferenceError>("done") });
        let s = Arc::clone(&seen);
        let f = Arc::clone(&failed);
        handle
            .on_success(move |v| *s.lock().unwrap() = Some(v))
            .on_failure(move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            });

        pool.wait().await;
        assert_eq!(*seen.lock().unwrap(), Some("done"));
        assert_eq!(failed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_is_wrapped_and_success_never_fires() {
        let pool = TaskPool::new(2).unwrap();
        let error = Arc::new(Mutex::new(None));
        let succeeded = Arc::new(AtomicUsize::new(0));

        let handle = pool.submit(async {
            Err::<(), _>(InferenceError::HttpError {
                status: 400,
                body: "bad request".into(),
            })
        });
        let e = Arc::clone(&error);
        let s = Arc::clone(&succeeded);
        handle
            .on_success(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .on_failure(move |err| *e.lock().unwrap() = Some(err));

        pool.wait().await;
        assert_eq!(succeeded.load(Ordering::SeqCst), 0);
        let outcome = error.lock().unwrap().take();
        match outcome {
            Some(InferenceError::AsyncOperationFailed { source }) => {
                assert!(matches!(*source, InferenceError::HttpError { status: 400, .. }));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let pool = TaskPool::new(1).unwrap();
        let error = Arc::new(Mutex::new(None));

        let handle = pool.submit(async {
            if true {
                panic!("boom");
            }
            Ok::<(), InferenceError>(())
        });
        let e = Arc::clone(&error);
        handle.on_failure(move |err| *e.lock().unwrap() = Some(err));

        pool.wait().await;
        let outcome = error.lock().unwrap().take();
        match outcome {
            Some(InferenceError::TaskPanicked { reason }) => assert_eq!(reason, "boom"),
            other => panic!("unexpected outcome: {other:?}"),
        }

        // The pool keeps working after a panic.
        let ok = pool.submit(async { Ok::<_, InferenceError>(1) });
        pool.wait().await;
        assert!(ok.is_finished());
    }

    #[tokio::test]
    async fn test_callback_registered_after_completion() {
        let pool = TaskPool::new(1).unwrap();
        let handle = pool.submit(async { Ok::<_, InferenceError>(7) });
        pool.wait().await;
        assert!(handle.is_finished());

        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        handle.on_success(move |v| {
            s.store(v, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert!(!handle.is_finished());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_limit_is_respected() {
        let pool = TaskPool::new(2).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, InferenceError>(())
            });
        }
        assert_eq!(pool.pending(), 6);

        pool.wait().await;
        assert_eq!(pool.pending(), 0);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_dropped_pool_still_delivers_outcomes() {
        let pool = TaskPool::new(1).unwrap();
        let ok = pool.submit(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, InferenceError>(5)
        });
        let failed = pool.submit(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<(), _>(InferenceError::StreamError {
                reason: "reset".into(),
            })
        });
        drop(pool);

        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        ok.on_success(move |v| {
            f.fetch_add(v, Ordering::SeqCst);
        });
        let f = Arc::clone(&fired);
        failed.on_failure(move |_| {
            f.fetch_add(100, Ordering::SeqCst);
        });

        for _ in 0..50 {
            if fired.load(Ordering::SeqCst) == 105 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 105);
    }

    #[tokio::test]
    async fn test_abandoned_wait_does_not_cancel() {
        let pool = TaskPool::new(1).unwrap();
        let handle = pool.submit(async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, InferenceError>(())
        });

        let timed_out = tokio::time::timeout(Duration::from_millis(5), pool.wait()).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished());
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        assert!(matches!(
            TaskPool::new(2),
            Err(InferenceError::ConfigError { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        assert!(TaskPool::new(0).is_err());
    }
}
