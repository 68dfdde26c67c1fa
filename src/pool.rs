//! Bounded background job pool.
//!
//! Not used by the upload path, which is strictly sequential. It is the execution
//! backend for sending parts in parallel later on.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// Runs queued jobs on at most `workers` tasks at a time.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    jobs: JoinSet<()>,
    stopped: bool,
}

impl WorkerPool {
    /// Creates a pool with `workers` concurrent slots (at least one).
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            jobs: JoinSet::new(),
            stopped: false,
        }
    }

    /// Queues a job. Returns `false`, dropping the job, once the pool is stopping.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add<F>(&mut self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.stopped {
            return false;
        }
        let permits = Arc::clone(&self.permits);
        self.jobs.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            job.await;
        });
        true
    }

    /// Number of jobs queued or running.
    pub fn pending(&self) -> usize {
        self.jobs.len()
    }

    /// Refuses new jobs and waits for every queued one to finish.
    pub async fn stop(&mut self) {
        self.stopped = true;
        while let Some(result) = self.jobs.join_next().await {
            if let Err(e) = result {
                warn!("Worker job failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_drains_all_jobs() {
        let mut pool = WorkerPool::new(2);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let done = Arc::clone(&done);
            assert!(pool.add(async move {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.stop().await;

        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(pool.pending(), 0);
        assert!(!pool.add(async {}));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.add(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        pool.stop().await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }
}
