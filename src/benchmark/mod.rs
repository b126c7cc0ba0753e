//! Benchmark orchestration engine
//!
//! [`SandboxExecutor`] fans a set of tests out across providers:
//!
//! 1. **Warmup** passes run every multi-run test on every provider and
//!    discard the results.
//! 2. **Measurement** runs every (test, run, provider) cell concurrently.
//!    Rate-limited providers go through a [`SerialLane`] paced by an
//!    [`ApiGate`]; standard providers share a [`WorkerPool`].
//!
//! Results land in a [`crate::models::ResultTable`], which
//! [`BenchmarkHistory`] persists and [`ResultsVisualizer`] renders.

pub mod executor;
pub mod history;
pub mod lane;
pub mod metrics;
pub mod observer;
pub mod pool;
pub mod report;

pub use executor::SandboxExecutor;
pub use history::BenchmarkHistory;
pub use lane::{ApiGate, SerialLane};
pub use metrics::{PhaseStats, TimingMetrics};
pub use observer::{LoggingObserver, NoopObserver, ProgressObserver, RunPhase};
pub use pool::WorkerPool;
pub use report::ResultsVisualizer;
