//! Shared client pool
//!
//! Adapters that hold connections (one Docker client per endpoint, say) keep
//! them here instead of in module-level state. The pool is created by the
//! caller, injected into adapters and closed explicitly at shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::error::{AdapterError, AdapterResult};

pub struct ClientPool<C> {
    clients: Mutex<HashMap<String, C>>,
    closed: AtomicBool,
}

impl<C: Clone + Send> Default for ClientPool<C> {
    fn default() -> Self {
        Self::open()
    }
}

impl<C: Clone + Send> ClientPool<C> {
    /// Open an empty pool
    pub fn open() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the client for `key`, connecting on first use.
    ///
    /// The lock is held while connecting so concurrent callers share one client.
    pub async fn get_or_connect<F>(&self, key: &str, connect: F) -> AdapterResult<C>
    where
        F: FnOnce() -> AdapterResult<C>,
    {
        if self.is_closed() {
            return Err(AdapterError::Unavailable("client pool is closed".to_string()));
        }

        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(key) {
            return Ok(client.clone());
        }

        let client = connect()?;
        tracing::debug!(endpoint = %key, "Connected new client");
        clients.insert(key.to_string(), client.clone());
        Ok(client)
    }

    /// Drop every cached client and refuse further use; returns how many were held
    pub async fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let mut clients = self.clients.lock().await;
        let count = clients.len();
        clients.clear();
        count
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_connects_once_per_key() {
        let pool: ClientPool<u32> = ClientPool::open();
        let connects = AtomicUsize::new(0);
        let connect = || {
            connects.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        };

        assert_eq!(pool.get_or_connect("eu", connect).await.unwrap(), 7);
        assert_eq!(pool.get_or_connect("eu", || Ok(9)).await.unwrap(), 7);
        assert_eq!(pool.get_or_connect("us", || Ok(9)).await.unwrap(), 9);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn test_connect_error_not_cached() {
        let pool: ClientPool<u32> = ClientPool::open();
        let err = pool
            .get_or_connect("eu", || Err(AdapterError::Docker("refused".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Docker(_)));
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_close() {
        let pool: ClientPool<u32> = ClientPool::open();
        pool.get_or_connect("eu", || Ok(1)).await.unwrap();

        assert_eq!(pool.close().await, 1);
        assert!(pool.is_closed());
        let err = pool.get_or_connect("eu", || Ok(1)).await.unwrap_err();
        assert!(matches!(err, AdapterError::Unavailable(_)));
    }
}
