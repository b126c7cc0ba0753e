//! Benchmark test model

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Produces the program source for a test
pub type CodeProducer = Arc<dyn Fn() -> String + Send + Sync>;

/// Per-test execution settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Names of environment variables forwarded to the sandbox
    pub env_vars: Vec<String>,
    /// Run exactly once per provider regardless of the measurement run count
    pub single_run: bool,
    /// Packages the program expects to be installed
    pub packages: Vec<String>,
    /// Informational test (reports the environment rather than measuring performance)
    pub is_info_test: bool,
}

/// A registered benchmark test.
///
/// Identity is the numeric id; the descriptor is immutable once it has been
/// added to a [`crate::registry::TestRegistry`].
#[derive(Clone)]
pub struct TestDescriptor {
    id: u32,
    name: String,
    config: TestConfig,
    producer: CodeProducer,
}

/// Source and settings produced by a test for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestProgram {
    pub code: String,
    pub config: TestConfig,
}

/// Id and name of a test, as stored in history records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub id: u32,
    pub name: String,
}

impl TestDescriptor {
    /// Create a descriptor with the default configuration
    pub fn new<F>(id: u32, name: impl Into<String>, producer: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            id,
            name: name.into(),
            config: TestConfig::default(),
            producer: Arc::new(producer),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: TestConfig) -> Self {
        self.config = config;
        self
    }

    /// Mark the test as single-run
    pub fn single_run(mut self) -> Self {
        self.config.single_run = true;
        self
    }

    /// Mark the test as informational
    pub fn info_test(mut self) -> Self {
        self.config.is_info_test = true;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn is_single_run(&self) -> bool {
        self.config.single_run
    }

    /// Number of measurement runs this test gets
    pub fn run_count(&self, measurement_runs: u32) -> u32 {
        if self.config.single_run {
            1
        } else {
            measurement_runs
        }
    }

    /// Generate the program for this invocation
    pub fn produce(&self) -> TestProgram {
        TestProgram {
            code: (self.producer)(),
            config: self.config.clone(),
        }
    }

    pub fn summary(&self) -> TestSummary {
        TestSummary {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

impl fmt::Debug for TestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TestProgram {
    /// Get a preview of the code (truncated)
    pub fn code_preview(&self, max_len: usize) -> String {
        if self.code.chars().count() <= max_len {
            self.code.clone()
        } else {
            let head: String = self.code.chars().take(max_len).collect();
            format!("{}...", head)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let test = TestDescriptor::new(1, "hello", || "print('hi')".to_string());
        assert_eq!(test.config(), &TestConfig::default());
        assert_eq!(test.run_count(5), 5);

        let program = test.produce();
        assert_eq!(program.code, "print('hi')");
        assert!(!program.config.single_run);
    }

    #[test]
    fn test_attribute_builders() {
        let test = TestDescriptor::new(2, "soak", String::new)
            .single_run()
            .info_test();
        assert!(test.is_single_run());
        assert!(test.config().is_info_test);
        assert_eq!(test.run_count(20), 1);
    }

    #[test]
    fn test_code_preview() {
        let program = TestProgram {
            code: "héllo world".to_string(),
            config: TestConfig::default(),
        };
        assert_eq!(program.code_preview(5), "héllo...");
        assert_eq!(program.code_preview(50), "héllo world");
    }
}
