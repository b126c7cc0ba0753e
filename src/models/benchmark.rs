//! Benchmark result models

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::benchmark::metrics::TimingMetrics;
use crate::error::ExecutionFailure;
use crate::providers::Execution;

/// Outcome of one (test, run, provider) cell
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub provider: String,
    pub metrics: TimingMetrics,
    pub output: Option<String>,
    /// Set when the cell failed; output may then be partial or absent
    pub error: Option<String>,
}

impl RunResult {
    /// Successful cell
    pub fn success(provider: impl Into<String>, execution: Execution) -> Self {
        Self {
            provider: provider.into(),
            metrics: execution.metrics,
            output: Some(execution.output),
            error: None,
        }
    }

    /// Failed cell; the message is also appended to the metric errors
    pub fn failure(provider: impl Into<String>, failure: ExecutionFailure) -> Self {
        let message = failure.error.to_string();
        let mut metrics = failure.metrics;
        metrics.add_error(message.clone());

        Self {
            provider: provider.into(),
            metrics,
            output: failure.output,
            error: Some(message),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Identity of a cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub test_id: u32,
    pub run: u32,
    pub provider: String,
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            test_key(self.test_id),
            run_label(self.run),
            self.provider
        )
    }
}

/// Label of a 1-based run number
pub fn run_label(run: u32) -> String {
    format!("run_{}", run)
}

/// Key of a test in reports and history
pub fn test_key(test_id: u32) -> String {
    format!("test_{}", test_id)
}

type ProviderResults = BTreeMap<String, RunResult>;

/// `test_id -> run -> provider -> RunResult`, the output of one invocation
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultTable {
    tests: BTreeMap<u32, BTreeMap<u32, ProviderResults>>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a cell result; keyed by identity, so arrival order does not matter
    pub fn insert(&mut self, test_id: u32, run: u32, result: RunResult) -> Option<RunResult> {
        self.tests
            .entry(test_id)
            .or_default()
            .entry(run)
            .or_default()
            .insert(result.provider.clone(), result)
    }

    pub fn get(&self, test_id: u32, run: u32, provider: &str) -> Option<&RunResult> {
        self.tests.get(&test_id)?.get(&run)?.get(provider)
    }

    /// All runs recorded for a test
    pub fn runs(&self, test_id: u32) -> Option<&BTreeMap<u32, ProviderResults>> {
        self.tests.get(&test_id)
    }

    /// Every result for one (test, provider), ordered by run
    pub fn results_for<'a>(
        &'a self,
        test_id: u32,
        provider: &'a str,
    ) -> impl Iterator<Item = (u32, &'a RunResult)> + 'a {
        self.tests
            .get(&test_id)
            .into_iter()
            .flat_map(|runs| runs.iter())
            .filter_map(move |(run, results)| results.get(provider).map(|r| (*run, r)))
    }

    pub fn test_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.tests.keys().copied()
    }

    /// Iterate every cell as (test_id, run, result)
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, &RunResult)> + '_ {
        self.tests.iter().flat_map(|(test_id, runs)| {
            runs.iter().flat_map(move |(run, results)| {
                results.values().map(move |result| (*test_id, *run, result))
            })
        })
    }

    /// Number of failed cells for one (test, provider)
    pub fn failure_count(&self, test_id: u32, provider: &str) -> usize {
        self.results_for(test_id, provider)
            .filter(|(_, r)| r.is_failure())
            .count()
    }

    /// Number of cells stored
    pub fn len(&self) -> usize {
        self.tests
            .values()
            .flat_map(|runs| runs.values())
            .map(|results| results.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::phases;
    use crate::error::AdapterError;

    fn success(provider: &str, exec_secs: f64) -> RunResult {
        let mut metrics = TimingMetrics::new();
        metrics.add_metric(phases::CODE_EXECUTION, exec_secs);
        RunResult::success(
            provider,
            Execution {
                output: "ok".to_string(),
                metrics,
            },
        )
    }

    #[test]
    fn test_failure_records_error_in_metrics() {
        let result = RunResult::failure(
            "cloud",
            ExecutionFailure::from(AdapterError::Unavailable("down".to_string())),
        );
        assert!(result.is_failure());
        assert_eq!(result.error.as_deref(), Some("Provider unavailable: down"));
        assert_eq!(result.metrics.errors(), &["Provider unavailable: down"]);
        assert!(result.output.is_none());
    }

    #[test]
    fn test_table_keyed_by_identity() {
        let mut table = ResultTable::new();
        table.insert(1, 2, success("b", 0.2));
        table.insert(1, 1, success("a", 0.1));
        table.insert(2, 1, success("a", 0.3));

        assert_eq!(table.len(), 3);
        assert!(table.get(1, 1, "a").is_some());
        assert!(table.get(1, 1, "b").is_none());
        assert_eq!(table.test_ids().collect::<Vec<_>>(), vec![1, 2]);

        let runs: Vec<u32> = table.results_for(1, "a").map(|(run, _)| run).collect();
        assert_eq!(runs, vec![1]);
    }

    #[test]
    fn test_failure_count() {
        let mut table = ResultTable::new();
        table.insert(1, 1, success("a", 0.1));
        table.insert(
            1,
            2,
            RunResult::failure("a", AdapterError::LaneClosed.into()),
        );
        assert_eq!(table.failure_count(1, "a"), 1);
        assert_eq!(table.failure_count(1, "missing"), 0);
    }

    #[test]
    fn test_cell_key_display() {
        let key = CellKey {
            test_id: 3,
            run: 2,
            provider: "local".to_string(),
        };
        assert_eq!(key.to_string(), "test_3/run_2/local");
    }
}
