//! Package installation and import timing
//!
//! The adapter installs the packages during Dependency Installation; the
//! program then times importing each one. Single run, since a second run
//! would only measure the pip cache.

use crate::models::{TestConfig, TestDescriptor};

pub const ID: u32 = 4;

/// (pip name, import name); the last three pull in compiled dependencies
const PACKAGES: [(&str, &str); 6] = [
    ("requests", "requests"),
    ("pyyaml", "yaml"),
    ("python-dateutil", "dateutil"),
    ("matplotlib", "matplotlib"),
    ("pandas", "pandas"),
    ("scikit-learn", "sklearn"),
];

pub fn test() -> TestDescriptor {
    TestDescriptor::new(ID, "package_installation", || {
        let imports = PACKAGES
            .iter()
            .map(|(package, module)| format!("    ({:?}, {:?}),", package, module))
            .collect::<Vec<_>>()
            .join("\n");

        super::with_timing(&format!(
            r#"
import importlib

PACKAGES = [
{imports}
]

@benchmark_timer
def run_test():
    lines = [f"{{'Package':<20}} {{'Import time':<15}} {{'Status':<10}}", "-" * 45]
    for package, module in PACKAGES:
        start = time.perf_counter()
        try:
            importlib.import_module(module)
            status = "ok"
        except ImportError as exc:
            status = f"failed: {{exc}}"
        elapsed = time.perf_counter() - start
        lines.append(f"{{package:<20}} {{elapsed:<15.4f}} {{status:<10}}")
    return "\n".join(lines)

print_benchmark_results(run_test())
"#
        ))
    })
    .with_config(TestConfig {
        single_run: true,
        packages: PACKAGES
            .iter()
            .map(|(package, _)| package.to_string())
            .collect(),
        ..TestConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packages_match_imports() {
        let test = test();
        assert!(test.is_single_run());
        assert_eq!(test.config().packages.len(), PACKAGES.len());

        let code = test.produce().code;
        assert!(code.contains(r#"("python-dateutil", "dateutil"),"#));
        assert!(code.contains("importlib.import_module(module)"));
        assert!(code.contains("{package:<20}"));
    }
}
