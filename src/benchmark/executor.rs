//! Benchmark orchestration
//!
//! [`SandboxExecutor`] runs every selected (test, run, provider) cell:
//!
//! 1. Warmup passes over the multi-run tests; results are discarded.
//! 2. Each rate-limited provider runs its whole measurement batch through its
//!    serial lane and the global API gate, one provider after another.
//! 3. All remaining cells are spawned at once, each gated by its provider's
//!    semaphore and the shared worker pool, and awaited together.
//!
//! A failing, panicking or timed-out cell becomes a failed [`RunResult`];
//! it never aborts the batch. Every adapter call runs on its own task, so a
//! timed-out cell stops being waited on without cancelling the adapter
//! mid-cleanup; it gets a grace period to finish and release what it holds.
//! The call's worker slot moves into that task and is released when the
//! call ends.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use super::lane::{ApiGate, SerialLane};
use super::metrics::TimingMetrics;
use super::observer::{ProgressObserver, RunPhase};
use super::pool::{WorkerPool, join_error, spawn_blocking_with};
use crate::config::BenchmarkConfig;
use crate::error::{AdapterError, AdapterResult, BenchError, BenchResult, ExecutionFailure};
use crate::models::{CellKey, ResultTable, RunResult, TestDescriptor};
use crate::providers::{Adapter, Execution, Provider, ProviderPolicy};
use crate::utils::time::format_duration;

type CellOutcome = Result<Execution, ExecutionFailure>;

/// A test's program and environment, produced once per invocation
#[derive(Debug)]
struct PreparedTest {
    id: u32,
    single_run: bool,
    code: String,
    env: HashMap<String, String>,
    packages: Vec<String>,
}

impl PreparedTest {
    fn new(test: &TestDescriptor) -> Self {
        let program = test.produce();

        let mut env = HashMap::new();
        for name in &program.config.env_vars {
            match std::env::var(name) {
                Ok(value) => {
                    env.insert(name.clone(), value);
                }
                Err(_) => tracing::warn!(
                    test = test.id(),
                    "Environment variable {} not set, skipping",
                    name
                ),
            }
        }

        Self {
            id: test.id(),
            single_run: program.config.single_run,
            code: program.code,
            env,
            packages: program.config.packages,
        }
    }
}

/// Time a cell may take, and how long a timed-out call may keep cleaning up
#[derive(Debug, Clone, Copy)]
struct CellLimits {
    timeout: Duration,
    cleanup_grace: Duration,
}

#[derive(Clone)]
struct Cell {
    key: CellKey,
    provider: Provider,
    test: Arc<PreparedTest>,
}

/// Orchestrates warmup and measurement runs across providers
pub struct SandboxExecutor {
    providers: Vec<Provider>,
    measurement_runs: u32,
    warmup_runs: u32,
    target_region: String,
    limits: CellLimits,
    provider_limits: HashMap<String, Arc<Semaphore>>,
    pool: WorkerPool,
    gate: ApiGate,
}

impl SandboxExecutor {
    /// Validate the configuration and the providers' environment.
    ///
    /// Fails before anything runs when a provider's required environment
    /// variables are missing. Providers listed as rate-limited in the
    /// configuration are switched to [`ProviderPolicy::RateLimited`].
    pub fn new(config: &BenchmarkConfig, providers: Vec<Provider>) -> BenchResult<Self> {
        let config = config.clone().validated()?;

        if providers.is_empty() {
            return Err(BenchError::NoProviders);
        }

        for provider in &providers {
            let missing = provider.missing_env();
            if !missing.is_empty() {
                return Err(BenchError::MissingEnvironment {
                    provider: provider.name().to_string(),
                    vars: missing,
                });
            }
        }

        let providers: Vec<Provider> = providers
            .into_iter()
            .map(|provider| {
                if config.is_rate_limited(provider.name()) {
                    provider.with_policy(ProviderPolicy::RateLimited)
                } else {
                    provider
                }
            })
            .collect();

        let provider_limits = providers
            .iter()
            .filter(|p| !p.is_rate_limited())
            .map(|p| {
                (
                    p.name().to_string(),
                    Arc::new(Semaphore::new(config.provider_concurrency)),
                )
            })
            .collect();

        let pool = WorkerPool::for_providers(providers.len(), config.parallelism);

        tracing::info!(
            providers = providers.len(),
            runs = config.measurement_runs,
            warmup = config.warmup_runs,
            capacity = pool.capacity(),
            "Executor ready"
        );

        Ok(Self {
            providers,
            measurement_runs: config.measurement_runs,
            warmup_runs: config.warmup_runs,
            target_region: config.target_region,
            limits: CellLimits {
                timeout: config.cell_timeout,
                cleanup_grace: config.cleanup_grace,
            },
            provider_limits,
            pool,
            gate: ApiGate::new(config.api_pacing),
        })
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn measurement_runs(&self) -> u32 {
        self.measurement_runs
    }

    pub fn warmup_runs(&self) -> u32 {
        self.warmup_runs
    }

    pub fn target_region(&self) -> &str {
        &self.target_region
    }

    /// Run warmup and measurement passes and collect every measurement cell
    pub async fn run(
        &self,
        tests: &[TestDescriptor],
        observer: Arc<dyn ProgressObserver>,
    ) -> ResultTable {
        let started = Instant::now();
        let prepared: Vec<Arc<PreparedTest>> = tests
            .iter()
            .map(|test| Arc::new(PreparedTest::new(test)))
            .collect();

        let lanes: HashMap<String, SerialLane> = self
            .providers
            .iter()
            .filter(|p| p.is_rate_limited())
            .map(|p| (p.name().to_string(), SerialLane::spawn(p.name())))
            .collect();

        for iteration in 1..=self.warmup_runs {
            self.run_warmup(iteration, &prepared, &lanes, &observer)
                .await;
        }

        let mut table = ResultTable::new();
        let cells = self.measurement_cells(&prepared);
        observer.phase_started(RunPhase::Measurement, cells.len());

        let (serial, standard): (Vec<Cell>, Vec<Cell>) = cells
            .into_iter()
            .partition(|cell| cell.provider.is_rate_limited());

        for provider in self.providers.iter().filter(|p| p.is_rate_limited()) {
            let batch: Vec<Cell> = serial
                .iter()
                .filter(|cell| cell.provider.name() == provider.name())
                .cloned()
                .collect();
            if let Some(lane) = lanes.get(provider.name()) {
                self.run_serial_batch(provider, lane, batch, &observer, &mut table)
                    .await;
            }
        }

        self.run_standard_batch(standard, &observer, &mut table)
            .await;
        observer.phase_finished(RunPhase::Measurement);

        for lane in lanes.into_values() {
            lane.close().await;
        }

        tracing::info!(
            "Benchmark finished: {} results in {}",
            table.len(),
            format_duration(started.elapsed())
        );
        table
    }

    /// Single-run tests get run 1 only; the rest get every measurement run
    fn measurement_cells(&self, tests: &[Arc<PreparedTest>]) -> Vec<Cell> {
        let mut cells = Vec::new();
        for test in tests {
            let runs = if test.single_run {
                1
            } else {
                self.measurement_runs
            };
            for run in 1..=runs {
                for provider in &self.providers {
                    cells.push(Cell {
                        key: CellKey {
                            test_id: test.id,
                            run,
                            provider: provider.name().to_string(),
                        },
                        provider: provider.clone(),
                        test: Arc::clone(test),
                    });
                }
            }
        }
        cells
    }

    async fn run_warmup(
        &self,
        iteration: u32,
        tests: &[Arc<PreparedTest>],
        lanes: &HashMap<String, SerialLane>,
        observer: &Arc<dyn ProgressObserver>,
    ) {
        let phase = RunPhase::Warmup {
            iteration,
            of: self.warmup_runs,
        };

        let mut pending: Vec<(CellKey, BoxFuture<'static, AdapterResult<CellOutcome>>)> =
            Vec::new();
        for test in tests.iter().filter(|t| !t.single_run) {
            for provider in &self.providers {
                let cell = Cell {
                    key: CellKey {
                        test_id: test.id,
                        run: iteration,
                        provider: provider.name().to_string(),
                    },
                    provider: provider.clone(),
                    test: Arc::clone(test),
                };
                let key = cell.key.clone();

                let waiter = match lanes.get(provider.name()) {
                    Some(lane) => self.submit_serial(lane, cell, None),
                    None => {
                        let handle = self.spawn_cell(cell, None, None);
                        join_cell(handle).boxed()
                    }
                };
                pending.push((key, waiter));
            }
        }

        observer.phase_started(phase, pending.len());

        let outcomes = join_all(
            pending
                .into_iter()
                .map(|(key, waiter)| async move { (key, waiter.await) }),
        )
        .await;

        let failed = outcomes
            .iter()
            .filter(|(key, outcome)| match outcome {
                Ok(Ok(_)) => false,
                Ok(Err(failure)) => {
                    tracing::debug!(cell = %key, "Warmup execution failed: {}", failure);
                    true
                }
                Err(e) => {
                    tracing::debug!(cell = %key, "Warmup execution failed: {}", e);
                    true
                }
            })
            .count();
        if failed > 0 {
            tracing::warn!("{} of {} warmup executions failed", failed, outcomes.len());
        }

        observer.phase_finished(phase);
    }

    /// Run one rate-limited provider's batch to completion, in submission order
    async fn run_serial_batch(
        &self,
        provider: &Provider,
        lane: &SerialLane,
        cells: Vec<Cell>,
        observer: &Arc<dyn ProgressObserver>,
        table: &mut ResultTable,
    ) {
        if cells.is_empty() {
            return;
        }

        let started = Instant::now();
        match self.gate.call(warm_pool(provider, self.limits.timeout)).await {
            Ok(Ok(found)) => tracing::info!(
                provider = %provider.name(),
                "Pool warmed ({} existing resources) in {}",
                found,
                format_duration(started.elapsed())
            ),
            Ok(Err(e)) | Err(e) => {
                tracing::warn!(provider = %provider.name(), "Pool warm-up failed: {}", e)
            }
        }

        tracing::info!(
            provider = %provider.name(),
            "Running {} executions serially",
            cells.len()
        );
        let started = Instant::now();

        let pending: Vec<_> = cells
            .into_iter()
            .map(|cell| {
                let key = cell.key.clone();
                (key, self.submit_serial(lane, cell, Some(Arc::clone(observer))))
            })
            .collect();

        for (key, waiter) in pending {
            let result = into_run_result(&key.provider, waiter.await);
            observer.cell_finished(&key, &result);
            table.insert(key.test_id, key.run, result);
        }

        tracing::info!(
            provider = %provider.name(),
            "Serial batch finished in {}",
            format_duration(started.elapsed())
        );
    }

    /// Spawn every cell at once and wait for all of them
    async fn run_standard_batch(
        &self,
        cells: Vec<Cell>,
        observer: &Arc<dyn ProgressObserver>,
        table: &mut ResultTable,
    ) {
        if cells.is_empty() {
            return;
        }

        let handles: Vec<_> = cells
            .into_iter()
            .map(|cell| {
                let key = cell.key.clone();
                let limit = self.provider_limits.get(&key.provider).cloned();
                let handle = self.spawn_cell(cell, limit, Some(Arc::clone(observer)));
                (key, handle)
            })
            .collect();

        let outcomes = join_all(
            handles
                .into_iter()
                .map(|(key, handle)| async move { (key, join_cell(handle).await) }),
        )
        .await;

        for (key, outcome) in outcomes {
            let result = into_run_result(&key.provider, outcome);
            observer.cell_finished(&key, &result);
            table.insert(key.test_id, key.run, result);
        }
    }

    /// Spawn a cell on the runtime, holding the provider limit (if any) and a pool slot
    fn spawn_cell(
        &self,
        cell: Cell,
        limit: Option<Arc<Semaphore>>,
        observer: Option<Arc<dyn ProgressObserver>>,
    ) -> JoinHandle<AdapterResult<CellOutcome>> {
        let pool = self.pool.clone();
        let limits = self.limits;

        tokio::spawn(async move {
            let _permit = match &limit {
                Some(limit) => Some(
                    limit
                        .acquire()
                        .await
                        .map_err(|_| AdapterError::LaneClosed)?,
                ),
                None => None,
            };
            let slot = pool.acquire().await?;

            if let Some(observer) = &observer {
                observer.cell_started(&cell.key);
            }
            Ok(execute_cell(&cell.provider, &cell.test, limits, Some(slot)).await)
        })
    }

    /// Queue a cell on a provider's lane behind the API gate
    fn submit_serial(
        &self,
        lane: &SerialLane,
        cell: Cell,
        observer: Option<Arc<dyn ProgressObserver>>,
    ) -> BoxFuture<'static, AdapterResult<CellOutcome>> {
        let gate = self.gate.clone();
        let limits = self.limits;

        let queued = lane.enqueue(async move {
            if let Some(observer) = &observer {
                observer.cell_started(&cell.key);
            }
            gate.call(execute_cell(&cell.provider, &cell.test, limits, None))
                .await
        });

        async move {
            let rx = queued?;
            rx.await.map_err(|_| AdapterError::LaneClosed)?.and_then(|outcome| outcome)
        }
        .boxed()
    }
}

/// Start the adapter call on its own task; `slot` is released when the call ends
fn spawn_call(
    provider: &Provider,
    test: &Arc<PreparedTest>,
    slot: Option<OwnedSemaphorePermit>,
) -> JoinHandle<CellOutcome> {
    let test = Arc::clone(test);
    match provider.adapter() {
        Adapter::Async(adapter) => {
            let adapter = Arc::clone(adapter);
            tokio::spawn(async move {
                let _slot = slot;
                adapter.execute(&test.code, &test.env, &test.packages).await
            })
        }
        Adapter::Blocking(adapter) => {
            let adapter = Arc::clone(adapter);
            spawn_blocking_with(
                move || adapter.execute(&test.code, &test.env, &test.packages),
                slot,
            )
        }
    }
}

fn joined_outcome(joined: Result<CellOutcome, tokio::task::JoinError>) -> CellOutcome {
    joined.unwrap_or_else(|e| Err(join_error(e).into()))
}

/// Call the adapter under the cell timeout, turning panics into failures.
///
/// A call that outlives the timeout is left running for the cleanup grace
/// period. If it finishes in time, the failed cell keeps the metrics it
/// recorded (Cleanup included); otherwise the task is aborted.
async fn execute_cell(
    provider: &Provider,
    test: &Arc<PreparedTest>,
    limits: CellLimits,
    slot: Option<OwnedSemaphorePermit>,
) -> CellOutcome {
    let mut call = spawn_call(provider, test, slot);

    if let Ok(joined) = tokio::time::timeout(limits.timeout, &mut call).await {
        return joined_outcome(joined);
    }

    tracing::warn!(
        provider = %provider.name(),
        "Execution timed out after {}, allowing {} for cleanup",
        format_duration(limits.timeout),
        format_duration(limits.cleanup_grace)
    );

    let metrics = match tokio::time::timeout(limits.cleanup_grace, &mut call).await {
        Ok(joined) => {
            tracing::info!(provider = %provider.name(), "Timed-out execution finished cleanup");
            match joined_outcome(joined) {
                Ok(execution) => execution.metrics,
                Err(failure) => failure.metrics,
            }
        }
        Err(_) => {
            // Blocking calls cannot be aborted; their thread runs on holding its slot
            call.abort();
            tracing::warn!(
                provider = %provider.name(),
                "Execution still running after the cleanup grace period, abandoned"
            );
            TimingMetrics::new()
        }
    };

    Err(ExecutionFailure::new(
        AdapterError::Timeout(limits.timeout),
        metrics,
    ))
}

async fn warm_pool(provider: &Provider, timeout: Duration) -> AdapterResult<usize> {
    let mut call = match provider.adapter() {
        Adapter::Async(adapter) => {
            let adapter = Arc::clone(adapter);
            tokio::spawn(async move { adapter.warm_pool().await })
        }
        Adapter::Blocking(adapter) => {
            let adapter = Arc::clone(adapter);
            spawn_blocking_with(move || adapter.warm_pool(), None)
        }
    };

    match tokio::time::timeout(timeout, &mut call).await {
        Ok(joined) => joined.map_err(join_error).and_then(|found| found),
        Err(_) => {
            call.abort();
            Err(AdapterError::Timeout(timeout))
        }
    }
}

async fn join_cell(handle: JoinHandle<AdapterResult<CellOutcome>>) -> AdapterResult<CellOutcome> {
    handle.await.map_err(join_error).and_then(|outcome| outcome)
}

fn into_run_result(provider: &str, outcome: AdapterResult<CellOutcome>) -> RunResult {
    match outcome {
        Ok(Ok(execution)) => RunResult::success(provider, execution),
        Ok(Err(failure)) => RunResult::failure(provider, failure),
        Err(error) => RunResult::failure(provider, error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::observer::NoopObserver;
    use crate::constants::phases;
    use crate::providers::MockExecutionAdapter;

    fn config(runs: u32, warmup: u32) -> BenchmarkConfig {
        BenchmarkConfig {
            measurement_runs: runs,
            warmup_runs: warmup,
            api_pacing: Duration::ZERO,
            rate_limited_providers: vec!["serial".to_string()],
            ..Default::default()
        }
    }

    fn execution() -> Execution {
        let mut metrics = TimingMetrics::new();
        metrics.add_milliseconds(phases::CODE_EXECUTION, 5.0);
        Execution {
            output: "ok".to_string(),
            metrics,
        }
    }

    fn test_case(id: u32) -> TestDescriptor {
        TestDescriptor::new(id, format!("test-{}", id), || "print(1)".to_string())
    }

    #[tokio::test]
    async fn test_adapter_called_once_per_measurement_run() {
        let mut adapter = MockExecutionAdapter::new();
        adapter
            .expect_execute()
            .times(3)
            .returning(|_, _, _| Ok(execution()));

        let executor = SandboxExecutor::new(
            &config(3, 0),
            vec![Provider::new("mock", Arc::new(adapter))],
        )
        .unwrap();
        let table = executor.run(&[test_case(1)], Arc::new(NoopObserver)).await;

        assert_eq!(table.len(), 3);
        for run in 1..=3 {
            assert!(table.get(1, run, "mock").is_some());
        }
    }

    #[tokio::test]
    async fn test_warmup_calls_are_discarded() {
        let mut adapter = MockExecutionAdapter::new();
        adapter
            .expect_execute()
            .times(3)
            .returning(|_, _, _| Ok(execution()));

        let executor = SandboxExecutor::new(
            &config(1, 2),
            vec![Provider::new("mock", Arc::new(adapter))],
        )
        .unwrap();
        let table = executor.run(&[test_case(1)], Arc::new(NoopObserver)).await;

        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_provider_warms_pool_once() {
        let mut adapter = MockExecutionAdapter::new();
        adapter.expect_warm_pool().times(1).returning(|| Ok(4));
        adapter
            .expect_execute()
            .times(4)
            .returning(|_, _, _| Ok(execution()));

        let executor = SandboxExecutor::new(
            &config(2, 0),
            vec![Provider::new("serial", Arc::new(adapter))],
        )
        .unwrap();
        assert!(executor.providers()[0].is_rate_limited());

        let table = executor
            .run(&[test_case(1), test_case(2)], Arc::new(NoopObserver))
            .await;
        assert_eq!(table.len(), 4);
        assert_eq!(table.failure_count(1, "serial"), 0);
    }

    struct PanickingAdapter;

    #[async_trait::async_trait]
    impl crate::providers::ExecutionAdapter for PanickingAdapter {
        async fn execute(
            &self,
            _code: &str,
            _env_vars: &HashMap<String, String>,
            _packages: &[String],
        ) -> CellOutcome {
            panic!("sdk blew up")
        }
    }

    #[tokio::test]
    async fn test_adapter_panic_becomes_failure() {
        let executor = SandboxExecutor::new(
            &config(1, 0),
            vec![Provider::new("mock", Arc::new(PanickingAdapter))],
        )
        .unwrap();
        let table = executor.run(&[test_case(1)], Arc::new(NoopObserver)).await;

        let result = table.get(1, 1, "mock").unwrap();
        assert_eq!(result.error.as_deref(), Some("Execution panicked: sdk blew up"));
    }

    struct StuckBlockingAdapter;

    impl crate::providers::BlockingExecutionAdapter for StuckBlockingAdapter {
        fn execute(
            &self,
            _code: &str,
            _env_vars: &HashMap<String, String>,
            _packages: &[String],
        ) -> CellOutcome {
            std::thread::sleep(Duration::from_millis(400));
            Ok(execution())
        }
    }

    #[tokio::test]
    async fn test_timed_out_blocking_call_keeps_worker_slot() {
        let config = BenchmarkConfig {
            parallelism: 1,
            cell_timeout: Duration::from_millis(50),
            cleanup_grace: Duration::from_millis(10),
            ..config(1, 0)
        };
        let executor = SandboxExecutor::new(
            &config,
            vec![Provider::blocking("sync", Arc::new(StuckBlockingAdapter))],
        )
        .unwrap();
        assert_eq!(executor.pool.capacity(), 1);

        let table = executor.run(&[test_case(1)], Arc::new(NoopObserver)).await;
        let result = table.get(1, 1, "sync").unwrap();
        assert!(result.error.as_deref().unwrap().contains("timed out"));

        // The abandoned thread is still sleeping and still owns the slot
        assert_eq!(executor.pool.available(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(executor.pool.available(), 1);
    }

    #[test]
    fn test_prepared_test_carries_packages() {
        let test = TestDescriptor::new(4, "packages", String::new).with_config(crate::models::TestConfig {
            packages: vec!["requests".to_string()],
            ..Default::default()
        });

        assert_eq!(PreparedTest::new(&test).packages, vec!["requests"]);
    }

    #[test]
    fn test_missing_environment_is_fatal() {
        let provider = Provider::new("cloud", Arc::new(MockExecutionAdapter::new()))
            .requires_env(["SANDBENCH_TEST_SURELY_UNSET_TOKEN"]);

        let err = SandboxExecutor::new(&config(1, 0), vec![provider])
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "MISSING_ENVIRONMENT");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let provider = Provider::new("mock", Arc::new(MockExecutionAdapter::new()));
        let err = SandboxExecutor::new(&config(0, 0), vec![provider])
            .err()
            .unwrap();
        assert!(matches!(err, BenchError::Configuration(_)));

        let err = SandboxExecutor::new(&config(1, 0), Vec::new()).err().unwrap();
        assert!(matches!(err, BenchError::NoProviders));
    }

    #[test]
    fn test_prepared_test_forwards_present_env_vars() {
        let test = TestDescriptor::new(9, "env", String::new).with_config(crate::models::TestConfig {
            env_vars: vec!["PATH".to_string(), "SANDBENCH_TEST_SURELY_UNSET_TOKEN".to_string()],
            ..Default::default()
        });

        let prepared = PreparedTest::new(&test);
        assert!(prepared.env.contains_key("PATH"));
        assert!(!prepared.env.contains_key("SANDBENCH_TEST_SURELY_UNSET_TOKEN"));
    }
}
