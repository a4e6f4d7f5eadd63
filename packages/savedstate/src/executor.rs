//! Background execution for async default loaders.
//!
//! Loaders never run on the store's thread. The store hands each load to a
//! [`BackgroundExecutor`] as a boxed future; the only thing that future does
//! when it finishes is post a completion back to the store.
//!
//! Two executors are provided:
//! - [`TokioExecutor`]: spawns onto a tokio runtime, bounded by [`PoolConfig`]
//! - [`ManualExecutor`]: queues loads until a test drives them explicitly

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use savedstate_core::{Error, Result};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::warn;

use crate::config::PoolConfig;

/// A unit of background work: one default load plus its completion post.
pub type LoadTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Something that can run load tasks off the store's thread.
///
/// Implementations can use a real runtime or hold tasks for a test to run.
/// One executor may be shared by many stores.
pub trait BackgroundExecutor: Send + Sync {
    /// Start (or queue) a task. The returned handle can cancel it.
    fn spawn(&self, task: LoadTask) -> TaskHandle;
}

/// Handle to a spawned load, used to cancel it.
#[derive(Debug, Default)]
pub struct TaskHandle {
    abort: Option<AbortHandle>,
}

impl TaskHandle {
    /// A handle for executors that cannot cancel their tasks.
    pub fn detached() -> Self {
        Self { abort: None }
    }

    pub fn abort(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }
}

/// Production executor running loads on a tokio runtime.
///
/// A semaphore bounds how many loads run at once, so declaring many async
/// defaults does not fan out into unbounded concurrent work.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
    permits: Arc<Semaphore>,
}

impl TokioExecutor {
    /// Create an executor on the given runtime.
    pub fn new(handle: Handle, config: PoolConfig) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(config.max_concurrent_loads.max(1))),
        }
    }

    /// Create an executor on the runtime the caller is running in.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| Error::Executor {
            message: e.to_string(),
        })?;
        Ok(Self::new(handle, PoolConfig::default()))
    }
}

impl BackgroundExecutor for TokioExecutor {
    fn spawn(&self, task: LoadTask) -> TaskHandle {
        let permits = self.permits.clone();
        let join = self.handle.spawn(async move {
            // The semaphore is never closed, so acquisition only waits.
            let _permit = permits.acquire_owned().await.ok();
            task.await;
        });
        TaskHandle {
            abort: Some(join.abort_handle()),
        }
    }
}

/// Deterministic executor for tests.
///
/// Spawned loads are queued and do nothing until [`run_next`](Self::run_next)
/// or [`run_all`](Self::run_all) is called. Each run blocks the calling
/// thread on a private current-thread runtime, so it must not be called
/// from inside another tokio runtime.
///
/// # Example
///
/// ```rust
/// use savedstate::{InMemoryContainer, KeyedStateStore, ManualExecutor};
/// use std::sync::Arc;
///
/// let executor = ManualExecutor::new().unwrap();
/// let store = KeyedStateStore::new(InMemoryContainer::new(), Arc::new(executor.clone()));
///
/// let greeting = store
///     .declare::<String>("greeting")
///     .default_loader(|| async { Ok::<_, std::io::Error>(Some("hello".to_string())) })
///     .property();
///
/// assert_eq!(greeting.get().unwrap(), None);
/// executor.run_all();
/// store.run_pending();
/// assert_eq!(greeting.get().unwrap(), Some("hello".to_string()));
/// ```
#[derive(Clone)]
pub struct ManualExecutor {
    queue: Arc<Mutex<VecDeque<LoadTask>>>,
    runtime: Arc<Runtime>,
}

impl ManualExecutor {
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            runtime: Arc::new(runtime),
        })
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<LoadTask>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of loads waiting to run.
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    /// Run the oldest queued load to completion. Returns false if the
    /// queue was empty.
    ///
    /// A load that panics is reported and otherwise ignored, the same way
    /// a runtime isolates a panicking task.
    pub fn run_next(&self) -> bool {
        let Some(task) = self.queue().pop_front() else {
            return false;
        };
        let join = self.runtime.spawn(task);
        if let Err(err) = self.runtime.block_on(join) {
            warn!(error = %err, "load task did not finish");
        }
        true
    }

    /// Run every queued load, including loads queued while running.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Drop every queued load without running it.
    pub fn discard_all(&self) -> usize {
        let drained: Vec<LoadTask> = self.queue().drain(..).collect();
        drained.len()
    }
}

impl std::fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}

impl BackgroundExecutor for ManualExecutor {
    fn spawn(&self, task: LoadTask) -> TaskHandle {
        self.queue().push_back(task);
        TaskHandle::detached()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_task(counter: &Arc<AtomicUsize>) -> LoadTask {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn manual_executor_runs_in_order_on_demand() {
        let executor = ManualExecutor::new().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            executor.spawn(Box::pin(async move {
                order.lock().unwrap().push(i);
            }));
        }

        assert_eq!(executor.pending(), 3);
        assert!(order.lock().unwrap().is_empty());

        assert!(executor.run_next());
        assert_eq!(*order.lock().unwrap(), vec![0]);

        assert_eq!(executor.run_all(), 2);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert!(!executor.run_next());
    }

    #[test]
    fn manual_executor_supports_timers() {
        let executor = ManualExecutor::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let inner = counter_task_after_sleep(&counter);

        executor.spawn(inner);
        executor.run_all();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    fn counter_task_after_sleep(counter: &Arc<AtomicUsize>) -> LoadTask {
        let task = counting_task(counter);
        Box::pin(async move {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            task.await;
        })
    }

    #[test]
    fn manual_executor_isolates_panics() {
        let executor = ManualExecutor::new().unwrap();
        executor.spawn(Box::pin(async {
            panic!("loader blew up");
        }));

        assert!(executor.run_next());
        assert_eq!(executor.pending(), 0);
    }

    #[test]
    fn discard_drops_without_running() {
        let executor = ManualExecutor::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        executor.spawn(counting_task(&counter));

        assert_eq!(executor.discard_all(), 1);
        assert_eq!(executor.run_all(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tokio_executor_runs_tasks() {
        let executor = TokioExecutor::current().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = tokio::sync::oneshot::channel();

        let task = counting_task(&counter);
        executor.spawn(Box::pin(async move {
            task.await;
            let _ = tx.send(());
        }));

        rx.await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tokio_executor_abort_cancels() {
        let executor = TokioExecutor::current().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = executor.spawn(counting_task(&counter));
        handle.abort();
        tokio::task::yield_now().await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn tokio_executor_requires_a_runtime() {
        assert!(matches!(
            TokioExecutor::current(),
            Err(Error::Executor { .. })
        ));
    }
}
