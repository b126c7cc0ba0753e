//! Directory listing test

use crate::models::TestDescriptor;

pub const ID: u32 = 2;

pub fn test() -> TestDescriptor {
    TestDescriptor::new(ID, "list_directory", || {
        super::with_timing(
            r#"
import subprocess

@benchmark_timer
def run_test():
    result = subprocess.run(["ls", "-la", "/home"], capture_output=True, text=True)
    return result.stdout

print_benchmark_results(run_test())
"#,
        )
    })
}
