//! Built-in benchmark tests
//!
//! Each test module exposes a `test()` constructor; [`default_registry`]
//! registers them under fixed ids.

pub mod directory;
pub mod file_io;
pub mod package_installation;
pub mod primes;
pub mod system_info;

use crate::constants::timing_block;
use crate::error::BenchResult;
use crate::registry::TestRegistry;

/// Build the registry of built-in tests
pub fn default_registry() -> BenchResult<TestRegistry> {
    let mut registry = TestRegistry::new();
    registry.register(primes::test())?;
    registry.register(directory::test())?;
    registry.register(system_info::test())?;
    registry.register(package_installation::test())?;
    registry.register(file_io::test())?;
    Ok(registry)
}

/// Wrap a Python body with the timing helpers.
///
/// The body gets a `benchmark_timer` decorator and a `print_benchmark_results`
/// function that prints the result followed by the timing data block.
pub(crate) fn with_timing(body: &str) -> String {
    format!(
        r#"import json
import time

def benchmark_timer(func):
    def wrapper(*args, **kwargs):
        start = time.perf_counter()
        result = func(*args, **kwargs)
        return {{"result": result, "execution_time_ms": (time.perf_counter() - start) * 1000}}
    return wrapper

def print_benchmark_results(test_result):
    print(test_result["result"])
    print("\n\n{start}")
    print(json.dumps({{"{key}": test_result["execution_time_ms"]}}))
    print("{end}")

{body}"#,
        start = timing_block::START,
        end = timing_block::END,
        key = timing_block::INTERNAL_EXECUTION_KEY,
        body = body.trim_start(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.len(), 5);

        let info = registry.get(3).unwrap();
        assert!(info.is_single_run());
        assert!(info.config().is_info_test);
        assert!(!registry.get(1).unwrap().is_single_run());

        let packages = registry.get(package_installation::ID).unwrap();
        assert!(packages.is_single_run());
        assert!(packages.config().packages.contains(&"requests".to_string()));
        assert!(registry.get(file_io::ID).unwrap().config().packages.is_empty());
    }

    #[test]
    fn test_with_timing_emits_block_markers() {
        let code = with_timing("print_benchmark_results({'result': 1, 'execution_time_ms': 2})");
        assert!(code.contains(timing_block::START));
        assert!(code.contains(timing_block::END));
        assert!(code.contains("\"internal_execution_time_ms\""));
        assert!(code.ends_with("'execution_time_ms': 2})"));
    }
}
