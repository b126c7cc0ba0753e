//! Application-wide constants
//!
//! This module contains all constant values used throughout the application.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// RUN DEFAULTS
// =============================================================================

/// Default number of measurement runs per (test, provider)
pub const DEFAULT_MEASUREMENT_RUNS: u32 = 1;

/// Default number of warmup runs (results discarded)
pub const DEFAULT_WARMUP_RUNS: u32 = 0;

/// Default opaque target region handed to adapters
pub const DEFAULT_TARGET_REGION: &str = "eu";

/// Default providers when none are selected
pub const DEFAULT_PROVIDERS: &str = "local";

// =============================================================================
// CONCURRENCY DEFAULTS
// =============================================================================

/// Worker-pool share per selected provider
pub const DEFAULT_PARALLELISM: usize = 4;

/// Concurrent cells allowed per standard provider
pub const DEFAULT_PROVIDER_CONCURRENCY: usize = 2;

/// Per-cell timeout in seconds
pub const DEFAULT_CELL_TIMEOUT_SECS: u64 = 600;

/// How long a timed-out cell may keep running to clean up, in seconds
pub const DEFAULT_CLEANUP_GRACE_SECS: u64 = 60;

/// Providers routed through the serialized lane
pub const DEFAULT_RATE_LIMITED_PROVIDERS: &str = "docker";

/// Delay after every rate-limited call, in milliseconds
pub const DEFAULT_API_PACING_MS: u64 = 200;

// =============================================================================
// HISTORY DEFAULTS
// =============================================================================

/// Default history document location
pub const DEFAULT_HISTORY_PATH: &str = "benchmark_history.json";

/// Number of runs shown in trend reports
pub const DEFAULT_TREND_LIMIT: usize = 10;

// =============================================================================
// PROVIDER DEFAULTS
// =============================================================================

/// Default Docker daemon socket
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Default sandbox image
pub const DEFAULT_DOCKER_IMAGE: &str = "python:3.12-slim";

/// Default container memory limit in megabytes
pub const DEFAULT_DOCKER_MEMORY_LIMIT_MB: u64 = 512;

/// Default interpreter for the local provider
pub const DEFAULT_LOCAL_INTERPRETER: &str = "python3";

/// Default log filter
pub const DEFAULT_LOG_FILTER: &str = "sandbench=info";

// =============================================================================
// PHASES
// =============================================================================

/// Lifecycle phase names recorded in timing metrics
pub mod phases {
    pub const WORKSPACE_CREATION: &str = "Workspace Creation";
    pub const DEPENDENCY_INSTALLATION: &str = "Dependency Installation";
    pub const ENVIRONMENT_SETUP: &str = "Environment Setup";
    pub const CODE_EXECUTION: &str = "Code Execution";
    pub const CLEANUP: &str = "Cleanup";

    /// Diagnostic: time measured by the program itself, nested in Code Execution
    pub const INTERNAL_EXECUTION: &str = "Internal Execution";

    /// Phases summed into the total time
    pub const STANDARD: [&str; 5] = [
        WORKSPACE_CREATION,
        DEPENDENCY_INSTALLATION,
        ENVIRONMENT_SETUP,
        CODE_EXECUTION,
        CLEANUP,
    ];

    /// Phases shown in every report table
    pub const REPORTED: [&str; 3] = [WORKSPACE_CREATION, CODE_EXECUTION, CLEANUP];
}

// =============================================================================
// PROVIDERS
// =============================================================================

/// Built-in provider identifiers
pub mod providers {
    pub const LOCAL: &str = "local";
    pub const DOCKER: &str = "docker";
}

// =============================================================================
// TIMING DATA BLOCK
// =============================================================================

/// Markers a program prints around its self-reported timings
pub mod timing_block {
    pub const START: &str = "--- BENCHMARK TIMING DATA ---";
    pub const END: &str = "--- END BENCHMARK TIMING DATA ---";
    pub const INTERNAL_EXECUTION_KEY: &str = "internal_execution_time_ms";
}
