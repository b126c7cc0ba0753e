//! Sandbench - Sandbox Provider Benchmarking
//!
//! This library runs the same benchmark programs across several code
//! execution sandboxes and compares how long each lifecycle phase takes.
//!
//! # Features
//!
//! - Pluggable providers behind a single adapter trait (local subprocess, Docker)
//! - Warmup passes, repeated measurement runs and per-cell failure isolation
//! - Serialized, paced execution for rate-limited provider APIs
//! - JSON history with trend and provider comparison queries
//!
//! # Architecture
//!
//! - **Suite / Registry**: benchmark programs and their selection
//! - **Providers**: adapters that create a workspace, run code and clean up
//! - **Benchmark**: scheduling, timing metrics, history and reports
//! - **Models**: result table and history records

pub mod benchmark;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod providers;
pub mod registry;
pub mod suite;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{AdapterError, BenchError, BenchResult, ExecutionFailure};
pub use registry::TestRegistry;
