//! Application configuration management
//!
//! This module handles loading and validating configuration from environment variables.
//! All configuration is loaded at startup and validated before any benchmark runs.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_API_PACING_MS, DEFAULT_CELL_TIMEOUT_SECS, DEFAULT_CLEANUP_GRACE_SECS,
    DEFAULT_DOCKER_IMAGE,
    DEFAULT_DOCKER_MEMORY_LIMIT_MB, DEFAULT_DOCKER_SOCKET, DEFAULT_HISTORY_PATH,
    DEFAULT_LOCAL_INTERPRETER, DEFAULT_LOG_FILTER, DEFAULT_MEASUREMENT_RUNS,
    DEFAULT_PARALLELISM, DEFAULT_PROVIDER_CONCURRENCY, DEFAULT_PROVIDERS,
    DEFAULT_RATE_LIMITED_PROVIDERS, DEFAULT_TARGET_REGION, DEFAULT_TREND_LIMIT,
    DEFAULT_WARMUP_RUNS,
};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub benchmark: BenchmarkConfig,
    pub history: HistoryConfig,
    pub docker: DockerConfig,
    pub local: LocalConfig,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub rust_log: String,
    pub json: bool,
}

/// Which registered tests to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestSelection {
    All,
    Ids(Vec<u32>),
}

/// Benchmark orchestration configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub tests: TestSelection,
    pub providers: Vec<String>,
    /// Measurement runs for multi-run tests
    pub measurement_runs: u32,
    /// Warmup passes whose results are discarded
    pub warmup_runs: u32,
    /// Passed through to adapters untouched
    pub target_region: String,
    /// Worker-pool share per provider
    pub parallelism: usize,
    /// Semaphore weight per standard provider
    pub provider_concurrency: usize,
    pub cell_timeout: Duration,
    /// Extra time a timed-out cell gets to finish its cleanup phase
    pub cleanup_grace: Duration,
    pub rate_limited_providers: Vec<String>,
    /// Sleep after each call on the rate-limited lane
    pub api_pacing: Duration,
}

/// History store configuration
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub path: PathBuf,
    pub enabled: bool,
    pub trend_limit: usize,
}

/// Docker provider configuration
#[derive(Debug, Clone)]
pub struct DockerConfig {
    pub socket_path: String,
    /// Region -> socket overrides
    pub region_sockets: HashMap<String, String>,
    pub image: String,
    pub memory_limit_mb: u64,
}

/// Local subprocess provider configuration
#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub interpreter: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            logging: LoggingConfig::from_env(),
            benchmark: BenchmarkConfig::from_env()?,
            history: HistoryConfig::from_env()?,
            docker: DockerConfig::from_env()?,
            local: LocalConfig::from_env(),
        })
    }
}

impl LoggingConfig {
    fn from_env() -> Self {
        Self {
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

impl BenchmarkConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let tests = env::var("BENCH_TESTS").unwrap_or_else(|_| "all".to_string());

        Ok(Self {
            tests: TestSelection::parse(&tests)
                .ok_or_else(|| ConfigError::InvalidValue("BENCH_TESTS".to_string()))?,
            providers: split_list(
                &env::var("BENCH_PROVIDERS").unwrap_or_else(|_| DEFAULT_PROVIDERS.to_string()),
            ),
            measurement_runs: parse_var("BENCH_RUNS", DEFAULT_MEASUREMENT_RUNS)?,
            warmup_runs: parse_var("BENCH_WARMUP_RUNS", DEFAULT_WARMUP_RUNS)?,
            target_region: env::var("BENCH_TARGET_REGION")
                .unwrap_or_else(|_| DEFAULT_TARGET_REGION.to_string()),
            parallelism: parse_var("BENCH_PARALLELISM", DEFAULT_PARALLELISM)?,
            provider_concurrency: parse_var(
                "BENCH_PROVIDER_CONCURRENCY",
                DEFAULT_PROVIDER_CONCURRENCY,
            )?,
            cell_timeout: Duration::from_secs(parse_var(
                "BENCH_CELL_TIMEOUT_SECS",
                DEFAULT_CELL_TIMEOUT_SECS,
            )?),
            cleanup_grace: Duration::from_secs(parse_var(
                "BENCH_CLEANUP_GRACE_SECS",
                DEFAULT_CLEANUP_GRACE_SECS,
            )?),
            rate_limited_providers: split_list(
                &env::var("BENCH_RATE_LIMITED_PROVIDERS")
                    .unwrap_or_else(|_| DEFAULT_RATE_LIMITED_PROVIDERS.to_string()),
            ),
            api_pacing: Duration::from_millis(parse_var(
                "BENCH_API_PACING_MS",
                DEFAULT_API_PACING_MS,
            )?),
        }
        .validated()?)
    }

    /// Reject values the orchestrator cannot schedule with
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.measurement_runs == 0 {
            return Err(ConfigError::InvalidValue("BENCH_RUNS".to_string()));
        }
        if self.parallelism == 0 {
            return Err(ConfigError::InvalidValue("BENCH_PARALLELISM".to_string()));
        }
        if self.provider_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "BENCH_PROVIDER_CONCURRENCY".to_string(),
            ));
        }
        // A zero timeout would fail every cell before the adapter starts
        if self.cell_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "BENCH_CELL_TIMEOUT_SECS".to_string(),
            ));
        }
        Ok(self)
    }

    /// Whether the named provider must go through the serialized lane
    pub fn is_rate_limited(&self, provider: &str) -> bool {
        self.rate_limited_providers.iter().any(|p| p == provider)
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            tests: TestSelection::All,
            providers: split_list(DEFAULT_PROVIDERS),
            measurement_runs: DEFAULT_MEASUREMENT_RUNS,
            warmup_runs: DEFAULT_WARMUP_RUNS,
            target_region: DEFAULT_TARGET_REGION.to_string(),
            parallelism: DEFAULT_PARALLELISM,
            provider_concurrency: DEFAULT_PROVIDER_CONCURRENCY,
            cell_timeout: Duration::from_secs(DEFAULT_CELL_TIMEOUT_SECS),
            cleanup_grace: Duration::from_secs(DEFAULT_CLEANUP_GRACE_SECS),
            rate_limited_providers: split_list(DEFAULT_RATE_LIMITED_PROVIDERS),
            api_pacing: Duration::from_millis(DEFAULT_API_PACING_MS),
        }
    }
}

impl HistoryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            path: PathBuf::from(
                env::var("HISTORY_PATH").unwrap_or_else(|_| DEFAULT_HISTORY_PATH.to_string()),
            ),
            enabled: parse_var("HISTORY_ENABLED", true)?,
            trend_limit: parse_var("HISTORY_TREND_LIMIT", DEFAULT_TREND_LIMIT)?,
        })
    }
}

impl DockerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let region_sockets = match env::var("DOCKER_REGION_SOCKETS") {
            Ok(raw) => parse_pairs(&raw)
                .ok_or_else(|| ConfigError::InvalidValue("DOCKER_REGION_SOCKETS".to_string()))?,
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            socket_path: env::var("DOCKER_SOCKET")
                .unwrap_or_else(|_| DEFAULT_DOCKER_SOCKET.to_string()),
            region_sockets,
            image: env::var("DOCKER_IMAGE").unwrap_or_else(|_| DEFAULT_DOCKER_IMAGE.to_string()),
            memory_limit_mb: parse_var("DOCKER_MEMORY_LIMIT_MB", DEFAULT_DOCKER_MEMORY_LIMIT_MB)?,
        })
    }

    /// Socket serving the given region
    pub fn socket_for(&self, region: &str) -> &str {
        self.region_sockets
            .get(region)
            .map(String::as_str)
            .unwrap_or(&self.socket_path)
    }
}

impl LocalConfig {
    fn from_env() -> Self {
        Self {
            interpreter: env::var("LOCAL_INTERPRETER")
                .unwrap_or_else(|_| DEFAULT_LOCAL_INTERPRETER.to_string()),
        }
    }
}

impl TestSelection {
    /// Parse `all` or a comma-separated list of ids
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            return Some(Self::All);
        }

        raw.split(',')
            .map(|id| id.trim().parse::<u32>().ok())
            .collect::<Option<Vec<_>>>()
            .map(Self::Ids)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_pairs(raw: &str) -> Option<HashMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.measurement_runs, 1);
        assert_eq!(config.warmup_runs, 0);
        assert_eq!(config.provider_concurrency, 2);
        assert_eq!(config.api_pacing, Duration::from_millis(200));
        assert!(config.is_rate_limited("docker"));
        assert!(!config.is_rate_limited("local"));
    }

    #[test]
    fn test_parse_test_selection() {
        assert_eq!(TestSelection::parse("all"), Some(TestSelection::All));
        assert_eq!(TestSelection::parse(""), Some(TestSelection::All));
        assert_eq!(
            TestSelection::parse("1, 3,7"),
            Some(TestSelection::Ids(vec![1, 3, 7]))
        );
        assert_eq!(TestSelection::parse("1,x"), None);
    }

    #[test]
    fn test_split_list_skips_blanks() {
        assert_eq!(split_list("local, ,docker,"), vec!["local", "docker"]);
    }

    #[test]
    fn test_region_sockets() {
        let pairs = parse_pairs("eu=/run/eu.sock, us=/run/us.sock").unwrap();
        let docker = DockerConfig {
            socket_path: DEFAULT_DOCKER_SOCKET.to_string(),
            region_sockets: pairs,
            image: DEFAULT_DOCKER_IMAGE.to_string(),
            memory_limit_mb: DEFAULT_DOCKER_MEMORY_LIMIT_MB,
        };
        assert_eq!(docker.socket_for("us"), "/run/us.sock");
        assert_eq!(docker.socket_for("asia"), DEFAULT_DOCKER_SOCKET);
        assert!(parse_pairs("eu").is_none());
    }

    #[test]
    fn test_zero_runs_rejected() {
        let config = BenchmarkConfig {
            measurement_runs: 0,
            ..BenchmarkConfig::default()
        };
        assert!(matches!(
            config.validated(),
            Err(ConfigError::InvalidValue(var)) if var == "BENCH_RUNS"
        ));
    }

    #[test]
    fn test_zero_cell_timeout_rejected() {
        let config = BenchmarkConfig {
            cell_timeout: Duration::ZERO,
            ..BenchmarkConfig::default()
        };
        assert!(matches!(
            config.validated(),
            Err(ConfigError::InvalidValue(var)) if var == "BENCH_CELL_TIMEOUT_SECS"
        ));

        let config = BenchmarkConfig {
            cell_timeout: Duration::from_millis(50),
            ..BenchmarkConfig::default()
        };
        assert!(config.validated().is_ok());
    }
}
