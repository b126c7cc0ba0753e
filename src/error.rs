//! Custom error types and handling
//!
//! `BenchError` covers failures that stop an invocation (bad configuration,
//! unknown tests or providers, history I/O). `AdapterError` covers failures of
//! a single cell; those are recorded in the result table and never abort a batch.

use std::time::Duration;

use crate::benchmark::metrics::TimingMetrics;
use crate::utils::time::format_milliseconds;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing required environment variables for provider '{provider}': {}", vars.join(", "))]
    MissingEnvironment { provider: String, vars: Vec<String> },

    // Selection errors
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown test id: {0}")]
    UnknownTest(u32),

    #[error("Test id already registered: {0}")]
    DuplicateTest(u32),

    #[error("No providers selected")]
    NoProviders,

    // History errors
    #[error("History error: {0}")]
    History(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BenchError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::MissingEnvironment { .. } => "MISSING_ENVIRONMENT",
            Self::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            Self::UnknownTest(_) => "UNKNOWN_TEST",
            Self::DuplicateTest(_) => "DUPLICATE_TEST",
            Self::NoProviders => "NO_PROVIDERS",
            Self::History(_) => "HISTORY_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

impl From<crate::config::ConfigError> for BenchError {
    fn from(err: crate::config::ConfigError) -> Self {
        BenchError::Configuration(err.to_string())
    }
}

/// Failure of a single adapter call
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    #[error("Execution timed out after {}", format_milliseconds(.0.as_secs_f64() * 1000.0))]
    Timeout(Duration),

    #[error("Docker error: {0}")]
    Docker(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Execution failed with exit code {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i64, stderr: String },

    #[error("Package installation failed: {0}")]
    Installation(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Execution panicked: {0}")]
    Panicked(String),

    #[error("Execution lane closed before the call completed")]
    LaneClosed,
}

impl From<bollard::errors::Error> for AdapterError {
    fn from(err: bollard::errors::Error) -> Self {
        AdapterError::Docker(err.to_string())
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        AdapterError::Process(err.to_string())
    }
}

/// An adapter failure together with whatever was measured before it happened.
///
/// Cleanup still runs on failure, so the metrics usually carry a Cleanup
/// sample and any cleanup error strings.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    pub error: AdapterError,
    pub metrics: TimingMetrics,
    pub output: Option<String>,
}

impl ExecutionFailure {
    /// Attach the partial metrics gathered so far
    pub fn new(error: AdapterError, metrics: TimingMetrics) -> Self {
        Self {
            error,
            metrics,
            output: None,
        }
    }

    /// Attach partial output
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

impl From<AdapterError> for ExecutionFailure {
    fn from(error: AdapterError) -> Self {
        Self::new(error, TimingMetrics::new())
    }
}

/// Result type alias using BenchError
pub type BenchResult<T> = Result<T, BenchError>;

/// Result type for adapter calls
pub type AdapterResult<T> = Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BenchError::UnknownTest(3).error_code(), "UNKNOWN_TEST");
        assert_eq!(BenchError::NoProviders.error_code(), "NO_PROVIDERS");
        assert_eq!(
            BenchError::UnknownProvider("x".into()).error_code(),
            "UNKNOWN_PROVIDER"
        );
    }

    #[test]
    fn test_missing_environment_message() {
        let err = BenchError::MissingEnvironment {
            provider: "cloud".to_string(),
            vars: vec!["API_KEY".to_string(), "SERVER_URL".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Missing required environment variables for provider 'cloud': API_KEY, SERVER_URL"
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = AdapterError::Timeout(Duration::from_secs(90));
        assert_eq!(err.to_string(), "Execution timed out after 1m 30s");

        // Sub-second timeouts keep their unit instead of rounding to zero
        let err = AdapterError::Timeout(Duration::from_millis(50));
        assert_eq!(err.to_string(), "Execution timed out after 50.00ms");
    }
}
