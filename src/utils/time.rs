//! Time utilities

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Get current UTC time
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds elapsed since `start`, as recorded by adapters
pub fn elapsed_secs(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

/// Format milliseconds as a human-readable string
pub fn format_milliseconds(ms: f64) -> String {
    if ms < 1000.0 {
        format!("{:.2}ms", ms)
    } else if ms < 60000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        let seconds = (ms / 1000.0) as u64;
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;
        format!("{}m {}s", minutes, remaining_seconds)
    }
}

/// Format a wall-clock duration for log lines
pub fn format_duration(duration: Duration) -> String {
    format_milliseconds(duration.as_secs_f64() * 1000.0)
}
