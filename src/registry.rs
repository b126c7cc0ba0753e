//! Explicit test registry.
//!
//! Tests are registered by id at startup; selection resolves a
//! [`TestSelection`] against the registered set.

use std::collections::BTreeMap;

use crate::config::TestSelection;
use crate::error::{BenchError, BenchResult};
use crate::models::TestDescriptor;

/// Registry of benchmark tests keyed by id.
///
/// # Example
///
/// ```ignore
/// let mut registry = TestRegistry::new();
/// registry.register(TestDescriptor::new(1, "primes", || "print(2)".to_string()))?;
/// let selected = registry.select(&TestSelection::Ids(vec![1]))?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct TestRegistry {
    tests: BTreeMap<u32, TestDescriptor>,
}

impl TestRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a test under its own id.
    ///
    /// Ids are unique; registering the same id twice is an error.
    pub fn register(&mut self, test: TestDescriptor) -> BenchResult<()> {
        let id = test.id();
        if self.tests.contains_key(&id) {
            return Err(BenchError::DuplicateTest(id));
        }
        self.tests.insert(id, test);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<&TestDescriptor> {
        self.tests.get(&id)
    }

    /// All registered tests ordered by id.
    pub fn list(&self) -> Vec<&TestDescriptor> {
        self.tests.values().collect()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Resolve a selection; any unknown id fails the whole selection.
    pub fn select(&self, selection: &TestSelection) -> BenchResult<Vec<TestDescriptor>> {
        match selection {
            TestSelection::All => Ok(self.tests.values().cloned().collect()),
            TestSelection::Ids(ids) => {
                let mut selected: Vec<TestDescriptor> = Vec::with_capacity(ids.len());
                for id in ids {
                    let test = self.get(*id).ok_or(BenchError::UnknownTest(*id))?;
                    if !selected.iter().any(|t| t.id() == *id) {
                        selected.push(test.clone());
                    }
                }
                Ok(selected)
            }
        }
    }
}
