//! Program-reported timings
//!
//! Test programs may print a JSON object between the timing block markers.
//! The `internal_execution_time_ms` field becomes the diagnostic
//! Internal Execution phase.

use std::sync::LazyLock;

use regex::Regex;

use crate::benchmark::metrics::TimingMetrics;
use crate::constants::{phases, timing_block};

static TIMING_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?s){}\s*(.*?)\s*{}",
        regex::escape(timing_block::START),
        regex::escape(timing_block::END)
    );
    Regex::new(&pattern).expect("timing block pattern is valid")
});

/// Parse the last timing block in `output`, if any
pub fn parse_timing_block(output: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let captures = TIMING_BLOCK.captures_iter(output).last()?;
    let body = captures.get(1)?.as_str();
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("Ignoring malformed timing block: {}", e);
            None
        }
    }
}

/// Record the program's own execution time, returning it when present
pub fn record_internal_timing(output: &str, metrics: &mut TimingMetrics) -> Option<f64> {
    let ms = parse_timing_block(output)?
        .get(timing_block::INTERNAL_EXECUTION_KEY)?
        .as_f64()?;
    metrics.add_milliseconds(phases::INTERNAL_EXECUTION, ms);
    Some(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_internal_execution() {
        let output = "Primes: [2, 3]\n\n\n--- BENCHMARK TIMING DATA ---\n{\"internal_execution_time_ms\": 12.5}\n--- END BENCHMARK TIMING DATA ---\n";
        let mut metrics = TimingMetrics::new();

        assert_eq!(record_internal_timing(output, &mut metrics), Some(12.5));
        assert_eq!(metrics.samples(phases::INTERNAL_EXECUTION), &[12.5]);
        assert_eq!(metrics.get_total_time(), 0.0);
    }

    #[test]
    fn test_missing_or_malformed_block() {
        let mut metrics = TimingMetrics::new();
        assert_eq!(record_internal_timing("plain output", &mut metrics), None);

        let malformed = "--- BENCHMARK TIMING DATA ---\nnot json\n--- END BENCHMARK TIMING DATA ---";
        assert_eq!(record_internal_timing(malformed, &mut metrics), None);
        assert!(metrics.samples(phases::INTERNAL_EXECUTION).is_empty());
    }

    #[test]
    fn test_extra_fields_kept() {
        let output = "--- BENCHMARK TIMING DATA ---\n{\"internal_execution_time_ms\": 3, \"rows\": 10}\n--- END BENCHMARK TIMING DATA ---";
        let block = parse_timing_block(output).unwrap();
        assert_eq!(block["rows"], 10);
    }
}
