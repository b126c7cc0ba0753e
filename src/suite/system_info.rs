//! System information report
//!
//! Informational only, and run once per provider.

use crate::models::TestDescriptor;

pub const ID: u32 = 3;

pub fn test() -> TestDescriptor {
    TestDescriptor::new(ID, "system_info", || {
        r#"import json
import os
import platform
import shutil
import sys

info = {
    "platform": platform.platform(),
    "machine": platform.machine(),
    "python": sys.version.split()[0],
    "implementation": platform.python_implementation(),
    "cpu_count": os.cpu_count(),
}

try:
    usage = shutil.disk_usage("/")
    info["disk_total_gb"] = round(usage.total / 1024 ** 3, 2)
    info["disk_free_gb"] = round(usage.free / 1024 ** 3, 2)
except OSError as exc:
    info["disk_error"] = str(exc)

if os.path.exists("/proc/meminfo"):
    with open("/proc/meminfo") as fh:
        for line in fh:
            if line.startswith("MemTotal:"):
                info["mem_total_kb"] = int(line.split()[1])
                break

print(json.dumps(info, indent=2))
"#
        .to_string()
    })
    .single_run()
    .info_test()
}
