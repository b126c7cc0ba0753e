//! File I/O throughput: binary, JSON and CSV reads and writes, plus
//! concurrent binary reads

use crate::models::TestDescriptor;

pub const ID: u32 = 5;

pub fn test() -> TestDescriptor {
    TestDescriptor::new(ID, "file_io_performance", || {
        super::with_timing(
            r#"
import csv
import os
import random
import tempfile
from concurrent.futures import ThreadPoolExecutor

BINARY_SIZES_MB = [1, 10, 100]
RECORD_COUNTS = [1000, 10000, 100000]
FILES_PER_SIZE = 5
WORKERS = 3

def timed(func, *args):
    start = time.perf_counter()
    value = func(*args)
    return time.perf_counter() - start, value

def write_bytes(path, data):
    with open(path, "wb") as fh:
        fh.write(data)

def read_bytes(path):
    with open(path, "rb") as fh:
        return len(fh.read())

def write_json(path, count):
    records = [
        {"id": i, "name": f"Item {i}", "value": random.random() * 1000,
         "tags": [f"tag{j}" for j in range(random.randint(1, 5))]}
        for i in range(count)
    ]
    with open(path, "w") as fh:
        json.dump(records, fh)

def read_json(path):
    with open(path) as fh:
        return len(json.load(fh))

def write_csv(path, count):
    with open(path, "w", newline="") as fh:
        writer = csv.writer(fh)
        writer.writerow(["id", "name", "value", "category"])
        for i in range(count):
            writer.writerow([i, f"Product {i}", round(random.random() * 1000, 2), random.choice("ABCD")])

def read_csv(path):
    with open(path, newline="") as fh:
        return sum(1 for _ in csv.reader(fh)) - 1

@benchmark_timer
def run_test():
    lines = []
    with tempfile.TemporaryDirectory() as root:
        for size in BINARY_SIZES_MB:
            paths = [os.path.join(root, f"binary_{size}mb_{i}.bin") for i in range(FILES_PER_SIZE)]
            writes = [timed(write_bytes, p, os.urandom(size * 1024 * 1024))[0] for p in paths]
            reads = [timed(read_bytes, p)[0] for p in paths]
            lines.append(f"binary {size}MB: write {sum(writes) / len(writes):.4f}s, read {sum(reads) / len(reads):.4f}s")

            with ThreadPoolExecutor(max_workers=WORKERS) as pool:
                elapsed, _ = timed(lambda: list(pool.map(read_bytes, paths)))
            lines.append(f"concurrent read {size}MB x{FILES_PER_SIZE}: {elapsed:.4f}s")

        for count in RECORD_COUNTS:
            path = os.path.join(root, f"records_{count}.json")
            write_time, _ = timed(write_json, path, count)
            read_time, _ = timed(read_json, path)
            lines.append(f"json {count} records: write {write_time:.4f}s, read {read_time:.4f}s")

            path = os.path.join(root, f"records_{count}.csv")
            write_time, _ = timed(write_csv, path, count)
            read_time, _ = timed(read_csv, path)
            lines.append(f"csv {count} records: write {write_time:.4f}s, read {read_time:.4f}s")
    return "\n".join(lines)

print_benchmark_results(run_test())
"#,
        )
    })
    .single_run()
}
