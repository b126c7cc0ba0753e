//! Persistent benchmark history
//!
//! Every recorded invocation is appended to a single JSON document with
//! `runs` and `test_results` at the top level. The whole document is
//! rewritten atomically on each append; recorded runs are never modified.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{BenchError, BenchResult};
use crate::models::{
    CompactResult, HistoryData, ProviderComparison, ProviderSummary, ResultTable, RunInfo,
    TestDescriptor, TestRunEntry, TrendMetric, TrendPoint, TrendReport, run_label, test_key,
};
use crate::utils::stats;
use crate::utils::time::now_utc;

/// Append-only store of benchmark runs
#[derive(Debug)]
pub struct BenchmarkHistory {
    path: PathBuf,
    data: HistoryData,
}

impl BenchmarkHistory {
    /// Load the history document, starting empty if it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> BenchResult<Self> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == ErrorKind::NotFound => HistoryData::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            "Loaded {} historical runs from {}",
            data.runs.len(),
            path.display()
        );
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn runs(&self) -> &[RunInfo] {
        &self.data.runs
    }

    pub fn data(&self) -> &HistoryData {
        &self.data
    }

    /// Record one invocation and persist the document.
    ///
    /// A failed write is logged; the run stays in memory either way.
    pub fn add_benchmark_run(
        &mut self,
        results: &ResultTable,
        providers: &[String],
        tests: &[TestDescriptor],
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Uuid {
        let id = self.record_run(results, providers, tests, metadata, now_utc());

        if let Err(e) = self.save() {
            tracing::error!(
                "Failed to save benchmark history to {}: {}",
                self.path.display(),
                e
            );
        }
        id
    }

    fn record_run(
        &mut self,
        results: &ResultTable,
        providers: &[String],
        tests: &[TestDescriptor],
        metadata: serde_json::Map<String, serde_json::Value>,
        timestamp: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let run_id = id.to_string();

        for test in tests {
            let compact: BTreeMap<String, BTreeMap<String, CompactResult>> = results
                .runs(test.id())
                .into_iter()
                .flatten()
                .map(|(run, cells)| {
                    let per_provider = cells
                        .iter()
                        .map(|(provider, result)| (provider.clone(), CompactResult::from(result)))
                        .collect();
                    (run_label(*run), per_provider)
                })
                .collect();

            self.data
                .test_results
                .entry(test_key(test.id()))
                .or_default()
                .insert(
                    run_id.clone(),
                    TestRunEntry {
                        timestamp,
                        results: compact,
                    },
                );
        }

        self.data.runs.push(RunInfo {
            id,
            timestamp,
            providers: providers.to_vec(),
            tests: tests.iter().map(TestDescriptor::summary).collect(),
            metadata,
        });

        tracing::info!(run_id = %id, "Recorded benchmark run");
        id
    }

    /// Rewrite the document through a temp file in the same directory
    pub fn save(&self) -> BenchResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, &self.data)?;
        file.as_file().sync_all()?;
        file.persist(&self.path)
            .map_err(|e| BenchError::History(format!("{}: {}", self.path.display(), e.error)))?;
        Ok(())
    }

    /// Entries for a test, oldest first
    fn test_entries(&self, test_id: u32) -> Vec<&TestRunEntry> {
        let Some(by_run) = self.data.test_results.get(&test_key(test_id)) else {
            return Vec::new();
        };

        let mut entries: Vec<&TestRunEntry> = self
            .data
            .runs
            .iter()
            .filter_map(|run| by_run.get(&run.id.to_string()))
            .collect();
        entries.sort_by_key(|entry| entry.timestamp);
        entries
    }

    /// Trend of one metric for (test, provider) over the `limit` most recent
    /// runs that include the provider
    pub fn get_trend_data(
        &self,
        test_id: u32,
        provider: &str,
        metric: &TrendMetric,
        limit: usize,
    ) -> TrendReport {
        let with_provider: Vec<(DateTime<Utc>, Vec<&CompactResult>)> = self
            .test_entries(test_id)
            .into_iter()
            .filter_map(|entry| {
                let results: Vec<&CompactResult> = entry
                    .results
                    .values()
                    .filter_map(|per_provider| per_provider.get(provider))
                    .collect();
                (!results.is_empty()).then_some((entry.timestamp, results))
            })
            .collect();

        let skip = with_provider.len().saturating_sub(limit);
        let data_points: Vec<TrendPoint> = with_provider[skip..]
            .iter()
            .map(|(timestamp, results)| {
                let values: Vec<f64> = results.iter().filter_map(|r| metric.extract(r)).collect();
                TrendPoint {
                    timestamp: *timestamp,
                    value: stats::mean(&values),
                }
            })
            .collect();

        let valid: Vec<f64> = data_points.iter().filter_map(|p| p.value).collect();
        let change_percent = match valid.as_slice() {
            [first, .., last] => stats::percent_change(*first, *last),
            _ => None,
        };

        TrendReport {
            test_id,
            provider: provider.to_string(),
            metric: metric.label().to_string(),
            data_points,
            change_percent,
            improved: change_percent.is_some_and(|change| change < 0.0),
        }
    }

    /// Compare total times across providers over the `runs` most recent runs.
    ///
    /// Providers without a successful sample are listed in `no_data` and never
    /// picked as fastest or most consistent. Ties go to the provider name that
    /// sorts first.
    pub fn get_provider_comparison(
        &self,
        test_id: u32,
        providers: &[String],
        runs: usize,
    ) -> ProviderComparison {
        let entries = self.test_entries(test_id);
        let window = &entries[entries.len().saturating_sub(runs)..];

        let mut summaries = BTreeMap::new();
        let mut no_data = Vec::new();

        for provider in providers {
            let mut samples = Vec::new();
            let mut errors = 0usize;
            for result in window
                .iter()
                .flat_map(|entry| entry.results.values())
                .filter_map(|per_provider| per_provider.get(provider))
            {
                if result.error.is_some() {
                    errors += 1;
                } else {
                    samples.push(result.total_time);
                }
            }

            let (Some(avg), Some(stdev)) = (stats::mean(&samples), stats::sample_stdev(&samples))
            else {
                no_data.push(provider.clone());
                continue;
            };

            summaries.insert(
                provider.clone(),
                ProviderSummary {
                    avg,
                    stdev,
                    cv: stats::coefficient_of_variation(stdev, avg),
                    error_rate: errors as f64 * 100.0 / (samples.len() + errors) as f64,
                    samples: samples.len(),
                    errors,
                },
            );
        }

        let fastest_provider = summaries
            .iter()
            .min_by(|a, b| a.1.avg.total_cmp(&b.1.avg).then_with(|| a.0.cmp(b.0)))
            .map(|(name, _)| name.clone());
        let most_consistent_provider = summaries
            .iter()
            .min_by(|a, b| a.1.cv.total_cmp(&b.1.cv).then_with(|| a.0.cmp(b.0)))
            .map(|(name, _)| name.clone());

        ProviderComparison {
            test_id,
            runs_considered: window.len(),
            providers: summaries,
            no_data,
            fastest_provider,
            most_consistent_provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::benchmark::metrics::TimingMetrics;
    use crate::constants::phases;
    use crate::error::AdapterError;
    use crate::models::RunResult;
    use crate::providers::Execution;

    fn ok(provider: &str, total_ms: f64) -> RunResult {
        let mut metrics = TimingMetrics::new();
        metrics.add_milliseconds(phases::CODE_EXECUTION, total_ms);
        RunResult::success(
            provider,
            Execution {
                output: String::new(),
                metrics,
            },
        )
    }

    fn failed(provider: &str) -> RunResult {
        RunResult::failure(provider, AdapterError::Unavailable("down".to_string()).into())
    }

    fn table(results: Vec<RunResult>) -> ResultTable {
        let mut table = ResultTable::new();
        for result in results {
            let run = table.results_for(1, &result.provider).count() as u32 + 1;
            table.insert(1, run, result);
        }
        table
    }

    fn history() -> (tempfile::TempDir, BenchmarkHistory) {
        let dir = tempfile::tempdir().unwrap();
        let history = BenchmarkHistory::open(dir.path().join("history.json")).unwrap();
        (dir, history)
    }

    fn record(history: &mut BenchmarkHistory, results: Vec<RunResult>, minutes: i64) {
        let providers: Vec<String> = results.iter().map(|r| r.provider.clone()).collect();
        let tests = [TestDescriptor::new(1, "primes", String::new)];
        let at = Utc::now() - Duration::days(1) + Duration::minutes(minutes);
        history.record_run(&table(results), &providers, &tests, Default::default(), at);
    }

    #[test]
    fn test_trend_improvement() {
        let (_dir, mut history) = history();
        record(&mut history, vec![ok("local", 100.0)], 0);
        record(&mut history, vec![ok("local", 80.0)], 1);

        let trend = history.get_trend_data(1, "local", &TrendMetric::TotalTime, 10);
        assert_eq!(trend.data_points.len(), 2);
        assert_eq!(trend.change_percent, Some(-20.0));
        assert!(trend.improved);
    }

    #[test]
    fn test_trend_orders_by_timestamp_and_limits() {
        let (_dir, mut history) = history();
        record(&mut history, vec![ok("local", 300.0)], 30);
        record(&mut history, vec![ok("local", 100.0)], 10);
        record(&mut history, vec![ok("local", 200.0)], 20);

        let trend = history.get_trend_data(1, "local", &TrendMetric::TotalTime, 2);
        let values: Vec<Option<f64>> = trend.data_points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(200.0), Some(300.0)]);
        assert_eq!(trend.change_percent, Some(50.0));
        assert!(!trend.improved);
    }

    #[test]
    fn test_trend_errored_run_is_null() {
        let (_dir, mut history) = history();
        record(&mut history, vec![ok("local", 100.0)], 0);
        record(&mut history, vec![failed("local")], 1);
        record(&mut history, vec![ok("other", 5.0)], 2);

        let trend = history.get_trend_data(1, "local", &TrendMetric::TotalTime, 10);
        let values: Vec<Option<f64>> = trend.data_points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(100.0), None]);
        assert_eq!(trend.change_percent, None);
        assert!(!trend.improved);
    }

    #[test]
    fn test_trend_by_phase() {
        let (_dir, mut history) = history();
        record(&mut history, vec![ok("local", 40.0)], 0);

        let metric = TrendMetric::parse(phases::CODE_EXECUTION);
        let trend = history.get_trend_data(1, "local", &metric, 10);
        assert_eq!(trend.metric, phases::CODE_EXECUTION);
        assert_eq!(trend.data_points[0].value, Some(40.0));
    }

    #[test]
    fn test_comparison_excludes_providers_without_successes() {
        let (_dir, mut history) = history();
        record(&mut history, vec![ok("a", 100.0), ok("b", 50.0), failed("c")], 0);
        record(&mut history, vec![ok("a", 100.0), ok("b", 70.0), failed("c")], 1);

        let providers = ["a", "b", "c", "d"].map(String::from);
        let comparison = history.get_provider_comparison(1, &providers, 10);

        assert_eq!(comparison.runs_considered, 2);
        assert_eq!(comparison.no_data, vec!["c", "d"]);
        assert_eq!(comparison.fastest_provider.as_deref(), Some("b"));
        assert_eq!(comparison.most_consistent_provider.as_deref(), Some("a"));

        let b = &comparison.providers["b"];
        assert_eq!(b.avg, 60.0);
        assert_eq!(b.samples, 2);
        assert_eq!(b.error_rate, 0.0);
    }

    #[test]
    fn test_comparison_tie_breaks_by_name() {
        let (_dir, mut history) = history();
        record(&mut history, vec![ok("zeta", 10.0), ok("alpha", 10.0)], 0);

        let providers = ["zeta", "alpha"].map(String::from);
        let comparison = history.get_provider_comparison(1, &providers, 5);
        assert_eq!(comparison.fastest_provider.as_deref(), Some("alpha"));
        assert_eq!(comparison.most_consistent_provider.as_deref(), Some("alpha"));
    }

    #[test]
    fn test_comparison_error_rate() {
        let (_dir, mut history) = history();
        record(&mut history, vec![ok("a", 10.0)], 0);
        record(&mut history, vec![failed("a")], 1);

        let comparison = history.get_provider_comparison(1, &["a".to_string()], 5);
        assert_eq!(comparison.providers["a"].error_rate, 50.0);
        assert_eq!(comparison.providers["a"].errors, 1);
    }

    #[test]
    fn test_persisted_document_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let mut history = BenchmarkHistory::open(&path).unwrap();
        assert!(history.runs().is_empty());

        let tests = [TestDescriptor::new(1, "primes", String::new)];
        let mut metadata = serde_json::Map::new();
        metadata.insert("region".to_string(), "eu".into());
        let id = history.add_benchmark_run(
            &table(vec![ok("local", 12.0)]),
            &["local".to_string()],
            &tests,
            metadata,
        );

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["runs"].is_array());
        assert!(raw["test_results"]["test_1"][id.to_string()]["results"]["run_1"]["local"].is_object());

        let reopened = BenchmarkHistory::open(&path).unwrap();
        assert_eq!(reopened.runs().len(), 1);
        assert_eq!(reopened.runs()[0].id, id);
        assert_eq!(reopened.runs()[0].metadata["region"], "eu");
    }

    #[test]
    fn test_save_failure_keeps_run_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");

        let mut history = BenchmarkHistory::open(blocker.join("history.json")).unwrap();
        // The parent directory can no longer be created
        std::fs::write(&blocker, "x").unwrap();

        let tests = [TestDescriptor::new(1, "primes", String::new)];
        history.add_benchmark_run(
            &table(vec![ok("local", 12.0)]),
            &["local".to_string()],
            &tests,
            Default::default(),
        );

        assert_eq!(history.runs().len(), 1);
        assert!(history.save().is_err());
    }
}
