//! Fixed-size worker pool with a bounded, blocking submission queue.
//!
//! A fast producer (the dump planner, the load reader) must not run ahead of
//! slow workers. When the queue is full, [`BlockingWorkerPool::submit`] waits
//! for space instead of failing. Every `block_timeout` without progress it
//! asks the blocked-submit callback whether to keep waiting; a `false`
//! answer turns the wait into [`MigrateError::RejectedExecution`].
//!
//! Shutdown drains: work already queued still runs, only new submissions are
//! rejected.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Decides whether a blocked submitter keeps waiting.
pub type BlockedCallback = Arc<dyn Fn(&PoolStatus) -> bool + Send + Sync>;

/// Default time a submitter waits before consulting the callback.
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Snapshot handed to the blocked-submit callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub pool_size: usize,
    pub queue_capacity: usize,
    pub active: usize,
    pub queued: usize,
    /// Failed offers so far for the blocked submission, starting at 1.
    pub attempts: usize,
}

/// Result of a submitted task.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<std::thread::Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task. A panicking task is reported as an error.
    pub async fn join(self) -> Result<T> {
        match self.rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(MigrateError::RejectedExecution("task panicked".into())),
            Err(_) => Err(MigrateError::RejectedExecution("task was dropped before completion".into())),
        }
    }
}

pub struct BlockingWorkerPoolBuilder {
    pool_size: usize,
    queue_size: usize,
    block_timeout: Duration,
    on_blocked: Option<BlockedCallback>,
}

impl BlockingWorkerPoolBuilder {
    /// Requested queue length; the queue never holds fewer slots than there
    /// are workers.
    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    pub fn on_blocked<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PoolStatus) -> bool + Send + Sync + 'static,
    {
        self.on_blocked = Some(Arc::new(callback));
        self
    }

    /// Spawn the workers. Must be called inside a tokio runtime.
    pub fn build(self) -> BlockingWorkerPool {
        let pool_size = self.pool_size.max(1);
        let queue_capacity = pool_size.max(self.queue_size);
        let (tx, rx) = mpsc::channel::<Task>(queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let active = Arc::new(AtomicUsize::new(0));

        let workers = (0..pool_size)
            .map(|id| {
                let rx = Arc::clone(&rx);
                let active = Arc::clone(&active);
                tokio::spawn(async move {
                    loop {
                        // Holding the lock only while waiting keeps one idle
                        // worker parked on the queue at a time.
                        let task = rx.lock().await.recv().await;
                        let Some(task) = task else {
                            break;
                        };
                        active.fetch_add(1, Ordering::SeqCst);
                        task.await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    }
                    debug!("Worker {} finished", id);
                })
            })
            .collect();

        let on_blocked = self.on_blocked.unwrap_or_else(|| {
            Arc::new(|status: &PoolStatus| {
                warn!(
                    "Worker queue full ({} queued, {} active); still waiting (attempt {})",
                    status.queued, status.active, status.attempts
                );
                true
            })
        });

        BlockingWorkerPool {
            pool_size,
            queue_capacity,
            block_timeout: self.block_timeout,
            on_blocked,
            sender: std::sync::Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            active,
        }
    }
}

/// Bounded pool of async workers; see the module docs.
pub struct BlockingWorkerPool {
    pool_size: usize,
    queue_capacity: usize,
    block_timeout: Duration,
    on_blocked: BlockedCallback,
    sender: std::sync::Mutex<Option<mpsc::Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    active: Arc<AtomicUsize>,
}

impl fmt::Debug for BlockingWorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingWorkerPool")
            .field("pool_size", &self.pool_size)
            .field("queue_capacity", &self.queue_capacity)
            .field("block_timeout", &self.block_timeout)
            .finish()
    }
}

impl BlockingWorkerPool {
    pub fn builder(pool_size: usize) -> BlockingWorkerPoolBuilder {
        BlockingWorkerPoolBuilder {
            pool_size,
            queue_size: 0,
            block_timeout: DEFAULT_BLOCK_TIMEOUT,
            on_blocked: None,
        }
    }

    /// Pool with `pool_size` workers and the default blocking policy.
    pub fn new(pool_size: usize, queue_size: usize) -> Self {
        Self::builder(pool_size).queue_size(queue_size).build()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    fn sender(&self) -> Result<mpsc::Sender<Task>> {
        self.sender
            .lock()
            .map_err(|_| MigrateError::RejectedExecution("worker pool state is poisoned".into()))?
            .clone()
            .ok_or_else(|| MigrateError::RejectedExecution("worker pool is shut down".into()))
    }

    pub fn status(&self) -> PoolStatus {
        let queued = self
            .sender
            .lock()
            .ok()
            .and_then(|s| s.as_ref().map(|tx| self.queue_capacity - tx.capacity()))
            .unwrap_or(0);
        PoolStatus {
            pool_size: self.pool_size,
            queue_capacity: self.queue_capacity,
            active: self.active.load(Ordering::SeqCst),
            queued,
            attempts: 0,
        }
    }

    /// Queue `task`, waiting while the queue is full.
    pub async fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.sender()?;
        let mut attempts = 0;
        let permit = loop {
            match tokio::time::timeout(self.block_timeout, sender.reserve()).await {
                Ok(Ok(permit)) => break permit,
                Ok(Err(_)) => {
                    return Err(MigrateError::RejectedExecution("worker pool is shut down".into()))
                }
                Err(_) => {
                    attempts += 1;
                    let status = PoolStatus {
                        attempts,
                        ..self.status()
                    };
                    if !(self.on_blocked)(&status) {
                        return Err(MigrateError::RejectedExecution(format!(
                            "worker queue stayed full for {} attempts of {:?}",
                            attempts, self.block_timeout
                        )));
                    }
                }
            }
        };

        let (tx, rx) = oneshot::channel();
        permit.send(Box::pin(async move {
            let outcome = AssertUnwindSafe(task).catch_unwind().await;
            // The submitter may have stopped listening.
            let _ = tx.send(outcome);
        }));
        Ok(TaskHandle { rx })
    }

    /// Stop accepting work. Queued tasks still run.
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            if sender.take().is_some() {
                debug!("Worker pool shutting down");
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().map(|s| s.is_none()).unwrap_or(true)
    }

    /// Shut down and wait until every queued task has finished.
    pub async fn await_termination(&self) {
        self.shutdown();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Worker ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_runs_tasks_and_returns_results() {
        let pool = BlockingWorkerPool::new(2, 4);
        let mut handles = Vec::new();
        for i in 0..8u64 {
            handles.push(pool.submit(async move { i * 2 }).await.unwrap());
        }
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.join().await.unwrap());
        }
        assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12, 14]);
        pool.await_termination().await;
    }

    #[tokio::test]
    async fn test_queue_capacity_is_at_least_pool_size() {
        assert_eq!(BlockingWorkerPool::new(4, 0).queue_capacity(), 4);
        assert_eq!(BlockingWorkerPool::new(4, 10).queue_capacity(), 10);
        assert_eq!(BlockingWorkerPool::new(0, 0).pool_size(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_blocks_then_rejects() {
        let release = Arc::new(Notify::new());
        let offers = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&offers);
        let pool = BlockingWorkerPool::builder(1)
            .queue_size(0)
            .block_timeout(Duration::from_millis(50))
            .on_blocked(move |status| {
                counter.fetch_add(1, Ordering::SeqCst);
                status.attempts < 2
            })
            .build();

        // One running, one queued: the pool is saturated.
        let gate = Arc::clone(&release);
        let running = pool.submit(async move { gate.notified().await }).await.unwrap();
        let queued = pool.submit(async { 7 }).await.unwrap();

        let err = pool.submit(async { 8 }).await.err().unwrap();
        assert!(matches!(err, MigrateError::RejectedExecution(_)));
        assert_eq!(offers.load(Ordering::SeqCst), 2);

        release.notify_one();
        running.join().await.unwrap();
        assert_eq!(queued.join().await.unwrap(), 7);
        pool.await_termination().await;
    }

    #[tokio::test]
    async fn test_blocked_submit_proceeds_when_slot_frees() {
        let release = Arc::new(Notify::new());
        let pool = Arc::new(
            BlockingWorkerPool::builder(1)
                .block_timeout(Duration::from_millis(20))
                .on_blocked(|_| true)
                .build(),
        );
        let gate = Arc::clone(&release);
        let first = pool.submit(async move { gate.notified().await }).await.unwrap();
        let second = pool.submit(async { 2 }).await.unwrap();

        let releaser = Arc::clone(&release);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            releaser.notify_one();
        });
        let third = pool.submit(async { 3 }).await.unwrap();

        first.join().await.unwrap();
        assert_eq!(second.join().await.unwrap(), 2);
        assert_eq!(third.join().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_work() {
        let pool = BlockingWorkerPool::new(1, 8);
        let done = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let done = Arc::clone(&done);
            handles.push(
                pool.submit(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .await
                .unwrap(),
            );
        }
        pool.await_termination().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert!(pool.is_shutdown());
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let pool = BlockingWorkerPool::new(2, 2);
        pool.shutdown();
        let err = pool.submit(async {}).await.err().unwrap();
        assert!(matches!(err, MigrateError::RejectedExecution(_)));
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_kill_worker() {
        let pool = BlockingWorkerPool::new(1, 1);
        let flag = Arc::new(AtomicBool::new(false));
        let bad = pool.submit(async { panic!("boom") }).await.unwrap();
        assert!(bad.join().await.is_err());
        let seen = Arc::clone(&flag);
        let good = pool
            .submit(async move { seen.store(true, Ordering::SeqCst) })
            .await
            .unwrap();
        good.join().await.unwrap();
        assert!(flag.load(Ordering::SeqCst));
        pool.await_termination().await;
    }
}
