use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::PoolTask;
use super::ThreadPool;
use crate::PoolConfig;
use crate::Result;
use crate::SystemError;

/// Bounded pool of tokio workers running synchronous tasks.
///
/// Each worker pulls from a shared queue and runs the task on the blocking pool, so a
/// single-worker pool executes tasks strictly in submission order.
///
/// On shutdown the queue is closed, so new submissions fail with `PoolShutdown`, and
/// every task accepted before the close runs before the workers exit.
pub struct WorkerPool {
    name: String,
    capacity: usize,
    task_tx: mpsc::Sender<PoolTask>,
}

impl WorkerPool {
    /// Spawns the workers. Must be called from within a tokio runtime.
    pub fn start(
        name: &str,
        config: &PoolConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> (Arc<Self>, Vec<JoinHandle<()>>) {
        let (task_tx, task_rx) = mpsc::channel(config.queue_capacity);
        let task_rx = Arc::new(Mutex::new(task_rx));

        let handles = (0..config.workers)
            .map(|worker_id| {
                let worker = PoolWorker {
                    pool: name.to_string(),
                    worker_id,
                    task_rx: task_rx.clone(),
                    shutdown_signal: shutdown_signal.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            "[{}] pool started with {} workers, queue capacity {}",
            name, config.workers, config.queue_capacity
        );

        let pool = Self {
            name: name.to_string(),
            capacity: config.queue_capacity,
            task_tx,
        };
        (Arc::new(pool), handles)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tasks currently waiting for a worker.
    pub fn queued(&self) -> usize {
        self.capacity - self.task_tx.capacity()
    }
}

impl ThreadPool for WorkerPool {
    fn submit(
        &self,
        task: PoolTask,
    ) -> Result<()> {
        self.task_tx.try_send(task).map_err(|e| match e {
            TrySendError::Full(_) => SystemError::QueueFull {
                pool: self.name.clone(),
                capacity: self.capacity,
            }
            .into(),
            TrySendError::Closed(_) => SystemError::PoolShutdown {
                pool: self.name.clone(),
            }
            .into(),
        })
    }
}

struct PoolWorker {
    pool: String,
    worker_id: usize,
    task_rx: Arc<Mutex<mpsc::Receiver<PoolTask>>>,
    shutdown_signal: watch::Receiver<()>,
}

impl PoolWorker {
    async fn run(self) {
        debug!("[{}-{}] worker started", self.pool, self.worker_id);
        let mut shutdown_signal = self.shutdown_signal.clone();

        loop {
            let next = {
                let mut task_rx = self.task_rx.lock().await;
                tokio::select! {
                    // P0: shutdown received
                    _ = shutdown_signal.changed() => {
                        // Late submissions now fail with Closed
                        task_rx.close();
                        None
                    }

                    task = task_rx.recv() => Some(task),
                }
            };

            match next {
                Some(Some(task)) => self.execute(task).await,
                Some(None) => {
                    debug!("[{}-{}] task channel closed", self.pool, self.worker_id);
                    return;
                }
                None => {
                    info!("[{}-{}] shutdown signal received", self.pool, self.worker_id);
                    break;
                }
            }
        }

        // Graceful drain: once closed, recv returns None only after every accepted task
        // has been handed out
        loop {
            let task = self.task_rx.lock().await.recv().await;
            match task {
                Some(task) => self.execute(task).await,
                None => break,
            }
        }

        debug!("[{}-{}] worker stopped", self.pool, self.worker_id);
    }

    async fn execute(
        &self,
        task: PoolTask,
    ) {
        if let Err(e) = tokio::task::spawn_blocking(task).await {
            error!("[{}-{}] task failed: {:?}", self.pool, self.worker_id, e);
        }
    }
}
