//! Prime calculation test

use crate::models::TestDescriptor;

pub const ID: u32 = 1;

/// First ten primes by trial division
pub fn test() -> TestDescriptor {
    TestDescriptor::new(ID, "calculate_primes", || {
        super::with_timing(
            r#"
@benchmark_timer
def calculate_primes():
    primes = []
    num = 2
    while len(primes) < 10:
        if all(num % i for i in range(2, int(num ** 0.5) + 1)):
            primes.append(num)
        num += 1
    prime_sum = sum(primes)
    return f"Primes: {primes}\nSum: {prime_sum}\nAverage: {prime_sum / len(primes)}"

print_benchmark_results(calculate_primes())
"#,
        )
    })
}
