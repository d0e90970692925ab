//! Fixed-size worker pool fed by a bounded queue

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Unit of work run by a worker
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Worker pool is shut down")]
pub struct PoolClosed;

/// N workers pulling jobs off one bounded channel
///
/// A full queue makes `submit` wait. `shutdown` lets queued jobs drain, then
/// joins every worker.
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    stop: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawns `workers` tasks on the current runtime
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let stop = CancellationToken::new();

        let handles = (0..workers)
            .map(|id| tokio::spawn(worker_loop(id, Arc::clone(&receiver), stop.clone())))
            .collect();

        Self {
            sender,
            stop,
            workers: Mutex::new(handles),
            size: workers,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queues a job, waiting for room if the queue is full
    pub async fn submit(&self, job: Job) -> Result<(), PoolClosed> {
        if self.stop.is_cancelled() {
            return Err(PoolClosed);
        }
        self.sender.send(job).await.map_err(|_| PoolClosed)
    }

    /// Stops accepting work, drains the queue and joins the workers
    pub async fn shutdown(&self) {
        self.stop.cancel();

        let handles: Vec<_> = {
            let mut workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
            workers.drain(..).collect()
        };

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Worker ended abnormally: {}", e);
            }
        }
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    stop: CancellationToken,
) {
    tracing::debug!("Worker {} started", id);
    loop {
        let job = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                job = rx.recv() => job,
                _ = stop.cancelled() => rx.try_recv().ok(),
            }
        };

        match job {
            Some(job) => job.await,
            None => break,
        }
    }
    tracing::debug!("Worker {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_pool_bounds_parallelism() {
        let pool = WorkerPool::new(2, 8);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let done = Arc::clone(&done);
            pool.submit(Box::pin(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();
        }

        pool.shutdown().await;

        assert_eq!(done.load(Ordering::SeqCst), 6);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let pool = WorkerPool::new(1, 1);
        pool.shutdown().await;

        let result = pool.submit(Box::pin(async {})).await;
        assert_eq!(result, Err(PoolClosed));
    }
}
