//! Progress reporting hooks
//!
//! The executor reports progress through a [`ProgressObserver`] passed to
//! `run`. All methods default to no-ops so observers only implement what
//! they need.

use std::fmt;

use crate::models::{CellKey, RunResult};

/// Which pass the executor is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// 1-based warmup iteration out of `of`
    Warmup { iteration: u32, of: u32 },
    Measurement,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warmup { iteration, of } => write!(f, "warmup {}/{}", iteration, of),
            Self::Measurement => write!(f, "measurement"),
        }
    }
}

pub trait ProgressObserver: Send + Sync {
    /// A pass is starting with `cells` executions
    fn phase_started(&self, _phase: RunPhase, _cells: usize) {}

    /// A measurement cell is about to run
    fn cell_started(&self, _cell: &CellKey) {}

    /// A measurement cell finished, successfully or not
    fn cell_finished(&self, _cell: &CellKey, _result: &RunResult) {}

    fn phase_finished(&self, _phase: RunPhase) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Observer that writes progress to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl ProgressObserver for LoggingObserver {
    fn phase_started(&self, phase: RunPhase, cells: usize) {
        tracing::info!("Starting {} pass ({} executions)", phase, cells);
    }

    fn cell_started(&self, cell: &CellKey) {
        tracing::debug!(cell = %cell, "Cell started");
    }

    fn cell_finished(&self, cell: &CellKey, result: &RunResult) {
        match &result.error {
            Some(error) => tracing::warn!(cell = %cell, "Cell failed: {}", error),
            None => tracing::info!(
                cell = %cell,
                total_ms = result.metrics.get_total_time(),
                "Cell completed"
            ),
        }
    }

    fn phase_finished(&self, phase: RunPhase) {
        tracing::info!("Finished {} pass", phase);
    }
}
