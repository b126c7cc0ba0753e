//! Persisted history records and trend query results

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::benchmark::RunResult;
use super::test_case::TestSummary;
use crate::benchmark::metrics::PhaseStats;

/// One recorded orchestration invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub providers: Vec<String>,
    pub tests: Vec<TestSummary>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A RunResult reduced to what trend queries need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactResult {
    pub total_time: f64,
    pub stats: BTreeMap<String, PhaseStats>,
    pub error: Option<String>,
}

impl From<&RunResult> for CompactResult {
    fn from(result: &RunResult) -> Self {
        Self {
            total_time: result.metrics.get_total_time(),
            stats: result.metrics.get_statistics(),
            error: result.error.clone(),
        }
    }
}

/// Results of one test within one recorded run: `run_key -> provider -> result`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunEntry {
    pub timestamp: DateTime<Utc>,
    pub results: BTreeMap<String, BTreeMap<String, CompactResult>>,
}

/// The whole history document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryData {
    #[serde(default)]
    pub runs: Vec<RunInfo>,
    /// `test_key -> run_id -> entry`
    #[serde(default)]
    pub test_results: BTreeMap<String, BTreeMap<String, TestRunEntry>>,
}

/// Value extracted from each compact result in a trend query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrendMetric {
    TotalTime,
    Phase(String),
}

impl TrendMetric {
    /// `total_time` selects the total; anything else names a phase
    pub fn parse(raw: &str) -> Self {
        match raw {
            "total_time" => Self::TotalTime,
            phase => Self::Phase(phase.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::TotalTime => "total_time",
            Self::Phase(name) => name,
        }
    }

    /// Value for one successful result; errored results yield nothing
    pub fn extract(&self, result: &CompactResult) -> Option<f64> {
        if result.error.is_some() {
            return None;
        }
        match self {
            Self::TotalTime => Some(result.total_time),
            Self::Phase(name) => result.stats.get(name).map(|s| s.mean),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    /// `None` when the run had no usable data for the provider/metric
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub test_id: u32,
    pub provider: String,
    pub metric: String,
    pub data_points: Vec<TrendPoint>,
    /// Oldest to newest valid value; `None` with fewer than two valid points
    pub change_percent: Option<f64>,
    /// Lower time is better
    pub improved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSummary {
    pub avg: f64,
    pub stdev: f64,
    pub cv: f64,
    pub error_rate: f64,
    pub samples: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderComparison {
    pub test_id: u32,
    pub runs_considered: usize,
    pub providers: BTreeMap<String, ProviderSummary>,
    /// Providers with entries in the window but no successful sample
    pub no_data: Vec<String>,
    pub fastest_provider: Option<String>,
    pub most_consistent_provider: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compact(total: f64, error: Option<&str>) -> CompactResult {
        let mut stats = BTreeMap::new();
        stats.insert(
            "Code Execution".to_string(),
            PhaseStats {
                mean: total / 2.0,
                std: 0.0,
                min: total / 2.0,
                max: total / 2.0,
            },
        );
        CompactResult {
            total_time: total,
            stats,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_metric_extract() {
        let ok = compact(100.0, None);
        assert_eq!(TrendMetric::TotalTime.extract(&ok), Some(100.0));
        assert_eq!(TrendMetric::parse("Code Execution").extract(&ok), Some(50.0));
        assert_eq!(TrendMetric::parse("Cleanup").extract(&ok), None);

        let failed = compact(100.0, Some("boom"));
        assert_eq!(TrendMetric::TotalTime.extract(&failed), None);
    }

    #[test]
    fn test_history_document_defaults() {
        let data: HistoryData = serde_json::from_str("{}").unwrap();
        assert!(data.runs.is_empty());
        assert!(data.test_results.is_empty());
    }
}
