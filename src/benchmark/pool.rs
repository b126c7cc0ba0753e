//! Shared worker capacity

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle};

use super::lane::panic_message;
use crate::error::{AdapterError, AdapterResult};

/// Bounded capacity shared by every cell of an invocation
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Capacity of `parallelism` slots per provider
    pub fn for_providers(providers: usize, parallelism: usize) -> Self {
        Self::new(providers.saturating_mul(parallelism))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot.
    ///
    /// The slot is released when the returned permit is dropped, so it can be
    /// moved into whatever task actually does the work.
    pub async fn acquire(&self) -> AdapterResult<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AdapterError::LaneClosed)
    }
}

/// Run a synchronous call on the blocking thread pool.
///
/// `slot` is dropped only when `call` returns. A blocking thread cannot be
/// cancelled, so a caller that stops waiting must not free its slot early.
pub fn spawn_blocking_with<F, T>(call: F, slot: Option<OwnedSemaphorePermit>) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let _slot = slot;
        call()
    })
}

/// Map a failed join to the adapter error it stands for
pub fn join_error(e: JoinError) -> AdapterError {
    if e.is_panic() {
        AdapterError::Panicked(panic_message(e.into_panic().as_ref()))
    } else {
        AdapterError::Panicked("task cancelled".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_capacity() {
        assert_eq!(WorkerPool::for_providers(3, 4).capacity(), 12);
        assert_eq!(WorkerPool::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn test_acquire_bounds_concurrency() {
        let pool = WorkerPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..6).map(|_| {
            let pool = pool.clone();
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let _slot = pool.acquire().await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        });
        futures::future::join_all(tasks).await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_blocking_call_keeps_slot_after_caller_gives_up() {
        let pool = WorkerPool::new(1);
        let slot = pool.acquire().await.unwrap();

        let mut handle = spawn_blocking_with(
            || std::thread::sleep(Duration::from_millis(300)),
            Some(slot),
        );
        let waited = tokio::time::timeout(Duration::from_millis(20), &mut handle).await;
        assert!(waited.is_err());

        // The thread is still sleeping, so the slot is still taken
        assert_eq!(pool.available(), 0);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), pool.acquire())
                .await
                .is_err()
        );

        handle.await.unwrap();
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_blocking_panic_maps_to_adapter_error() {
        assert_eq!(spawn_blocking_with(|| 5, None).await.unwrap(), 5);

        let err = spawn_blocking_with(|| -> u32 { panic!("sync sdk failed") }, None)
            .await
            .map_err(join_error)
            .unwrap_err();
        assert!(matches!(err, AdapterError::Panicked(m) if m == "sync sdk failed"));
    }
}
