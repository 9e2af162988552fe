use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,
}

/// Bounded set of concurrent workers
///
/// Jobs beyond `max_workers` wait for a permit instead of being rejected.
#[derive(Debug)]
pub struct WorkerPool {
    max_workers: u32,
    active: AtomicU32,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(max_workers: u32) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            max_workers,
            active: AtomicU32::new(0),
            semaphore: Arc::new(Semaphore::new(max_workers as usize)),
        }
    }

    /// Run `job` once a worker slot is free
    pub async fn submit<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: Future<Output = T>,
    {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| PoolError::Closed)?;

        self.active.fetch_add(1, Ordering::SeqCst);
        let result = job.await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        drop(permit);
        Ok(result)
    }

    /// Stop handing out slots; queued and future submissions fail
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn max_workers(&self) -> u32 {
        self.max_workers
    }

    pub fn active(&self) -> u32 {
        self.active.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_pool_runs_job() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.submit(async { 42 }).await.unwrap(), 42);
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let pool = Arc::new(WorkerPool::new(2));
        let peak = Arc::new(AtomicU32::new(0));
        let mut handles = vec![];

        for i in 0..6 {
            let pool = pool.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let inner = pool.clone();
                pool.submit(async move {
                    peak.fetch_max(inner.active(), Ordering::SeqCst);
                    sleep(Duration::from_millis(30)).await;
                    i
                })
                .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects() {
        let pool = WorkerPool::new(1);
        pool.close();
        assert!(matches!(pool.submit(async {}).await, Err(PoolError::Closed)));
    }
}
