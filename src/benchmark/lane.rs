//! Serialized execution for rate-limited providers
//!
//! A [`SerialLane`] owns one worker task that runs submitted jobs strictly in
//! submission order. An [`ApiGate`] is the process-wide weight-1 semaphore
//! every rate-limited remote call passes through, followed by a fixed pacing
//! delay.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{AdapterError, AdapterResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Single-worker FIFO execution channel
pub struct SerialLane {
    name: String,
    sender: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
}

impl SerialLane {
    /// Start the worker task
    pub fn spawn(name: impl Into<String>) -> Self {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let lane = name.clone();
        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                job.await;
            }
            tracing::debug!(lane = %lane, "Execution lane drained");
        });

        Self {
            name,
            sender,
            worker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job; the receiver yields its output once the worker reaches it.
    ///
    /// A panic inside the job is caught and reported as [`AdapterError::Panicked`]
    /// so the worker keeps serving later jobs.
    pub fn enqueue<F, T>(&self, job: F) -> AdapterResult<oneshot::Receiver<AdapterResult<T>>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let wrapped: Job = Box::pin(async move {
            let outcome = AssertUnwindSafe(job)
                .catch_unwind()
                .await
                .map_err(|payload| AdapterError::Panicked(panic_message(payload.as_ref())));
            // Receiver gone means nobody wants the result
            let _ = tx.send(outcome);
        });

        self.sender
            .send(wrapped)
            .map_err(|_| AdapterError::LaneClosed)?;
        Ok(rx)
    }

    /// Stop accepting jobs and wait for the queued ones to finish
    pub async fn close(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            tracing::error!(lane = %self.name, "Execution lane worker failed: {}", e);
        }
    }
}

/// Global gate for rate-limited remote calls
#[derive(Debug, Clone)]
pub struct ApiGate {
    permits: Arc<Semaphore>,
    pacing: Duration,
}

impl ApiGate {
    pub fn new(pacing: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
            pacing,
        }
    }

    /// Run `call` alone, then hold the gate for the pacing delay
    pub async fn call<F: Future>(&self, call: F) -> AdapterResult<F::Output> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AdapterError::LaneClosed)?;
        let output = call.await;
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
        Ok(output)
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
