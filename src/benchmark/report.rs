//! Plain-text reports over a result table and the history store

use std::fmt::Write;

use super::history::BenchmarkHistory;
use crate::constants::phases;
use crate::models::{ResultTable, TestDescriptor, TrendMetric};
use crate::utils::stats;
use crate::utils::time::format_milliseconds;

const NOT_AVAILABLE: &str = "N/A";

/// Left-aligned text table with a header row
struct TextTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    fn new(header: Vec<String>) -> Self {
        Self {
            header,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn render(&self) -> String {
        let mut widths: Vec<usize> = self.header.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(width) = widths.get_mut(i) {
                    *width = (*width).max(cell.chars().count());
                }
            }
        }

        let line = |cells: &[String]| -> String {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
                .collect();
            format!("| {} |\n", padded.join(" | "))
        };
        let separator = format!(
            "+{}+\n",
            widths
                .iter()
                .map(|w| "-".repeat(w + 2))
                .collect::<Vec<_>>()
                .join("+")
        );

        let mut out = separator.clone();
        out.push_str(&line(&self.header));
        out.push_str(&separator);
        for row in &self.rows {
            out.push_str(&line(row));
        }
        out.push_str(&separator);
        out
    }
}

/// Renders comparison, failure and trend tables
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultsVisualizer;

impl ResultsVisualizer {
    /// Per-test phase table, provider failure counts, example output and errors
    pub fn render_comparison(
        &self,
        results: &ResultTable,
        tests: &[TestDescriptor],
        providers: &[String],
        measurement_runs: u32,
    ) -> String {
        let mut out = String::new();

        for test in tests {
            let _ = writeln!(
                out,
                "\nPerformance Comparison for Test {}: {}",
                test.id(),
                test.name()
            );

            if let Some((provider, output)) = example_output(results, test.id(), providers) {
                let _ = writeln!(
                    out,
                    "\nExample Output (run_1, {}):\n{}",
                    provider,
                    output.trim_end()
                );
            }

            out.push_str(&Self::metrics_table(results, test.id(), providers).render());
            out.push_str(
                &Self::failure_table(results, test, providers, measurement_runs).render(),
            );

            for provider in providers {
                let errors: Vec<&str> = results
                    .results_for(test.id(), provider)
                    .filter_map(|(_, r)| r.error.as_deref())
                    .collect();
                if errors.is_empty() {
                    continue;
                }
                let _ = writeln!(out, "\n{} errors for test {}:", provider, test.id());
                for error in errors {
                    let _ = writeln!(out, "- {}", error);
                }
            }
        }

        out
    }

    fn metrics_table(results: &ResultTable, test_id: u32, providers: &[String]) -> TextTable {
        let mut header = vec!["Metric".to_string()];
        header.extend(providers.iter().cloned());
        let mut table = TextTable::new(header);

        for phase in phases::REPORTED {
            let mut row = vec![phase.to_string()];
            for provider in providers {
                let means: Vec<f64> = results
                    .results_for(test_id, provider)
                    .filter_map(|(_, r)| r.metrics.get_statistics().get(phase).map(|s| s.mean))
                    .collect();
                row.push(
                    match (stats::mean(&means), stats::population_std(&means)) {
                        (Some(avg), Some(std)) => format!("{:.2}ms (±{:.2})", avg, std),
                        _ => NOT_AVAILABLE.to_string(),
                    },
                );
            }
            table.push(row);
        }

        let totals: Vec<Option<f64>> = providers
            .iter()
            .map(|provider| {
                let totals: Vec<f64> = results
                    .results_for(test_id, provider)
                    .filter(|(_, r)| !r.is_failure())
                    .map(|(_, r)| r.metrics.get_total_time())
                    .collect();
                stats::mean(&totals)
            })
            .collect();

        let mut row = vec!["Total Time".to_string()];
        row.extend(totals.iter().map(|total| match total {
            Some(total) => format_milliseconds(*total),
            None => NOT_AVAILABLE.to_string(),
        }));
        table.push(row);

        // Relative to the first provider's total
        if let Some(reference) = providers.first() {
            let base = totals.first().copied().flatten();
            let mut row = vec![format!("vs {} %", reference)];
            row.extend(totals.iter().enumerate().map(|(i, total)| {
                match (i, base, total) {
                    (0, _, _) => "0%".to_string(),
                    (_, Some(base), Some(total)) => match stats::percent_change(base, *total) {
                        Some(change) => format!("{:+.1}%", change),
                        None => NOT_AVAILABLE.to_string(),
                    },
                    _ => NOT_AVAILABLE.to_string(),
                }
            }));
            table.push(row);
        }

        table
    }

    /// One row per provider, including providers that never succeeded
    fn failure_table(
        results: &ResultTable,
        test: &TestDescriptor,
        providers: &[String],
        measurement_runs: u32,
    ) -> TextTable {
        let total = test.run_count(measurement_runs);
        let mut table = TextTable::new(vec!["Provider".to_string(), "Failed Runs".to_string()]);
        for provider in providers {
            let recorded = results.results_for(test.id(), provider).count() as u32;
            // Cells that never produced a result count as failed
            let failed = results.failure_count(test.id(), provider) as u32
                + total.saturating_sub(recorded);
            table.push(vec![provider.clone(), format!("{}/{}", failed, total)]);
        }
        table
    }

    /// Total-time trend and provider comparison per test
    pub fn render_trends(
        &self,
        history: &BenchmarkHistory,
        tests: &[TestDescriptor],
        providers: &[String],
        limit: usize,
    ) -> String {
        let mut out = String::new();

        for test in tests {
            let _ = writeln!(
                out,
                "\nHistorical Trends for Test {}: {} (last {} runs)",
                test.id(),
                test.name(),
                limit
            );

            let mut table = TextTable::new(
                ["Provider", "Oldest", "Latest", "Change", "Trend"]
                    .map(String::from)
                    .to_vec(),
            );
            for provider in providers {
                let trend =
                    history.get_trend_data(test.id(), provider, &TrendMetric::TotalTime, limit);
                let valid: Vec<f64> = trend.data_points.iter().filter_map(|p| p.value).collect();
                let (Some(oldest), Some(latest)) = (valid.first(), valid.last()) else {
                    table.push(vec![
                        provider.clone(),
                        NOT_AVAILABLE.to_string(),
                        NOT_AVAILABLE.to_string(),
                        NOT_AVAILABLE.to_string(),
                        "no data".to_string(),
                    ]);
                    continue;
                };

                let (change, direction) = match trend.change_percent {
                    Some(change) if trend.improved => (format!("{:+.1}%", change), "improved"),
                    Some(change) if change > 0.0 => (format!("{:+.1}%", change), "regressed"),
                    Some(change) => (format!("{:+.1}%", change), "unchanged"),
                    None => (NOT_AVAILABLE.to_string(), "single run"),
                };
                table.push(vec![
                    provider.clone(),
                    format_milliseconds(*oldest),
                    format_milliseconds(*latest),
                    change,
                    direction.to_string(),
                ]);
            }
            out.push_str(&table.render());

            let comparison = history.get_provider_comparison(test.id(), providers, limit);
            if let Some(fastest) = &comparison.fastest_provider {
                let _ = writeln!(out, "Fastest provider: {}", fastest);
            }
            if let Some(consistent) = &comparison.most_consistent_provider {
                let _ = writeln!(out, "Most consistent provider: {}", consistent);
            }
            for (name, summary) in &comparison.providers {
                let _ = writeln!(
                    out,
                    "  {}: avg {} (stdev {:.2}ms, CV {:.1}%, errors {:.0}% of {} runs)",
                    name,
                    format_milliseconds(summary.avg),
                    summary.stdev,
                    summary.cv,
                    summary.error_rate,
                    summary.samples + summary.errors
                );
            }
            if !comparison.no_data.is_empty() {
                let _ = writeln!(out, "No successful runs: {}", comparison.no_data.join(", "));
            }
        }

        out
    }
}

/// First run's output from the first provider that has one
fn example_output<'a>(
    results: &'a ResultTable,
    test_id: u32,
    providers: &'a [String],
) -> Option<(&'a str, &'a str)> {
    providers.iter().find_map(|provider| {
        let result = results.get(test_id, 1, provider)?;
        if result.is_failure() {
            return None;
        }
        result
            .output
            .as_deref()
            .map(|output| (provider.as_str(), output))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::metrics::TimingMetrics;
    use crate::error::AdapterError;
    use crate::models::RunResult;
    use crate::providers::Execution;

    fn ok(provider: &str, exec_ms: f64) -> RunResult {
        let mut metrics = TimingMetrics::new();
        metrics.add_milliseconds(phases::WORKSPACE_CREATION, 10.0);
        metrics.add_milliseconds(phases::CODE_EXECUTION, exec_ms);
        RunResult::success(
            provider,
            Execution {
                output: format!("hello from {}", provider),
                metrics,
            },
        )
    }

    fn fixture() -> (ResultTable, Vec<TestDescriptor>, Vec<String>) {
        let mut table = ResultTable::new();
        table.insert(1, 1, ok("fast", 90.0));
        table.insert(1, 2, ok("fast", 90.0));
        table.insert(
            1,
            1,
            RunResult::failure("broken", AdapterError::Unavailable("quota".into()).into()),
        );
        table.insert(1, 1, ok("slow", 190.0));
        table.insert(1, 2, ok("slow", 190.0));

        let tests = vec![TestDescriptor::new(1, "primes", String::new)];
        let providers = ["fast", "slow", "broken"].map(String::from).to_vec();
        (table, tests, providers)
    }

    #[test]
    fn test_comparison_report() {
        let (table, tests, providers) = fixture();
        let report = ResultsVisualizer.render_comparison(&table, &tests, &providers, 2);

        assert!(report.contains("Performance Comparison for Test 1: primes"));
        assert!(report.contains("Example Output (run_1, fast):\nhello from fast"));
        assert!(report.contains("90.00ms (±0.00)"));
        assert!(report.contains("100.00ms"));
        assert!(report.contains("+100.0%"));
        assert!(report.contains("- Provider unavailable: quota"));
    }

    #[test]
    fn test_failed_provider_still_has_row() {
        let (table, tests, providers) = fixture();
        let report = ResultsVisualizer.render_comparison(&table, &tests, &providers, 2);

        assert!(report.contains("| broken   | 2/2         |"));
        assert!(report.contains("| fast     | 0/2         |"));
    }

    #[test]
    fn test_single_run_total_is_one() {
        let mut table = ResultTable::new();
        table.insert(1, 1, ok("fast", 1.0));
        let tests = vec![TestDescriptor::new(1, "info", String::new).single_run()];
        let report =
            ResultsVisualizer.render_comparison(&table, &tests, &["fast".to_string()], 10);
        assert!(report.contains("0/1"));
    }

    #[test]
    fn test_trend_report_from_history() {
        let (table, tests, providers) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let mut history = BenchmarkHistory::open(dir.path().join("history.json")).unwrap();
        history.add_benchmark_run(&table, &providers, &tests, serde_json::Map::new());

        let report = ResultsVisualizer.render_trends(&history, &tests, &providers, 5);

        assert!(report.contains("Historical Trends for Test 1: primes (last 5 runs)"));
        assert!(report.contains("single run"));
        assert!(report.contains("Fastest provider: fast"));
        assert!(report.contains("Most consistent provider: fast"));
        assert!(report.contains("No successful runs: broken"));
    }

    #[test]
    fn test_text_table_alignment() {
        let mut table = TextTable::new(vec!["a".to_string(), "bb".to_string()]);
        table.push(vec!["ccc".to_string(), "d".to_string()]);
        assert_eq!(
            table.render(),
            "+-----+----+\n| a   | bb |\n+-----+----+\n| ccc | d  |\n+-----+----+\n"
        );
    }
}
