//! Phase timing collection and analysis

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::constants::phases;
use crate::utils::stats;

/// Summary statistics for one phase, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Named phase durations plus the errors seen during one execution.
///
/// Samples are stored in milliseconds. `add_metric` takes seconds and
/// converts, except for phases registered with [`TimingMetrics::mark_milliseconds`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingMetrics {
    phases: BTreeMap<String, Vec<f64>>,
    errors: Vec<String>,
    #[serde(skip)]
    millisecond_phases: BTreeSet<String>,
}

impl TimingMetrics {
    /// Create an empty metrics bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a duration given in seconds (or ms for phases marked as such)
    pub fn add_metric(&mut self, name: &str, value: f64) {
        let ms = if self.millisecond_phases.contains(name) {
            value
        } else {
            value * 1000.0
        };

        // NaN and negative clock skew both land on zero
        self.phases
            .entry(name.to_string())
            .or_default()
            .push(ms.max(0.0));
    }

    /// Declare that values for `name` already arrive in milliseconds
    pub fn mark_milliseconds(&mut self, name: &str) {
        self.millisecond_phases.insert(name.to_string());
    }

    /// Record a duration already measured in milliseconds
    pub fn add_milliseconds(&mut self, name: &str, ms: f64) {
        self.mark_milliseconds(name);
        self.add_metric(name, ms);
    }

    /// Record an error message
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Samples recorded for a phase, empty if none
    pub fn samples(&self, name: &str) -> &[f64] {
        self.phases.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Phases that hold at least one sample
    pub fn phase_names(&self) -> impl Iterator<Item = &str> {
        self.phases
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(name, _)| name.as_str())
    }

    /// Mean of a phase, `None` when the phase has no data
    pub fn phase_mean(&self, name: &str) -> Option<f64> {
        stats::mean(self.samples(name))
    }

    /// Per-phase statistics; phases without samples are omitted
    pub fn get_statistics(&self) -> BTreeMap<String, PhaseStats> {
        self.phases
            .iter()
            .filter_map(|(name, samples)| {
                Some((
                    name.clone(),
                    PhaseStats {
                        mean: stats::mean(samples)?,
                        std: stats::population_std(samples)?,
                        min: stats::min(samples)?,
                        max: stats::max(samples)?,
                    },
                ))
            })
            .collect()
    }

    /// Sum of the means of the standard lifecycle phases.
    ///
    /// Diagnostic phases such as Internal Execution are nested inside
    /// Code Execution and are not counted.
    pub fn get_total_time(&self) -> f64 {
        phases::STANDARD
            .iter()
            .filter_map(|phase| self.phase_mean(phase))
            .sum()
    }
}
