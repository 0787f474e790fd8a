//! Bounded worker pool for fetch tasks.

use crate::error::{ControlTreeError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Runs futures on the tokio runtime, at most `size` at a time.
///
/// Cloning shares the same permits, so one pool can serve many
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Spawns `task` once a permit is free and waits for its result.
    ///
    /// Dropping the returned future aborts the task, releasing its permit.
    /// Tasks must not submit to the pool themselves.
    pub async fn run<F, T>(&self, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ControlTreeError::Worker(e.to_string()))?;

        let mut handle = AbortOnDrop(tokio::spawn(async move {
            let _permit = permit;
            task.await
        }));

        (&mut handle.0)
            .await
            .map_err(|e| ControlTreeError::Worker(e.to_string()))?
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_result() {
        let pool = WorkerPool::new(2);
        let value = pool.run(async { Ok(21 * 2) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..8).map(|_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.run(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        });
        futures::future::try_join_all(jobs).await.unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.size(), 2);
    }

    #[tokio::test]
    async fn test_panic_becomes_worker_error() {
        let pool = WorkerPool::new(1);
        let result: Result<()> = pool
            .run(async {
                if true {
                    panic!("fetch blew up");
                }
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ControlTreeError::Worker(_))));
    }

    #[tokio::test]
    async fn test_failed_join_releases_permit() {
        let pool = WorkerPool::new(1);

        let slow = pool.run(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let failing = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<(), _>(ControlTreeError::Worker("sibling failed".to_string()))
        };
        assert!(tokio::try_join!(slow, failing).is_err());

        let value = tokio::time::timeout(Duration::from_secs(1), pool.run(async { Ok(7) }))
            .await
            .expect("permit was not released")
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_zero_size_is_clamped() {
        assert_eq!(WorkerPool::new(0).size(), 1);
    }
}
