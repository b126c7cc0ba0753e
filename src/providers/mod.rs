//! Execution providers
//!
//! A provider is a name bound to one execution adapter plus the policy the
//! orchestrator applies to it. Adapters only ever see code, environment and
//! the packages to install; scheduling, pacing and failure isolation live in
//! [`crate::benchmark`].

pub mod docker;
pub mod local;
pub mod pool;
pub mod timing;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bollard::Docker;

use crate::benchmark::metrics::TimingMetrics;
use crate::config::Config;
use crate::constants::{phases, providers};
use crate::error::{AdapterError, AdapterResult, BenchError, BenchResult, ExecutionFailure};
use crate::utils::time::elapsed_secs;

pub use docker::DockerAdapter;
pub use local::LocalAdapter;
pub use pool::ClientPool;

/// Output and phase timings of a successful execution
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub output: String,
    pub metrics: TimingMetrics,
}

/// Asynchronous execution adapter.
///
/// Implementations must attempt cleanup of whatever they allocated even when
/// execution fails, and record a Cleanup sample whenever cleanup was attempted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Install `packages`, then run `code` with the given environment
    async fn execute(
        &self,
        code: &str,
        env_vars: &HashMap<String, String>,
        packages: &[String],
    ) -> Result<Execution, ExecutionFailure>;

    /// Best-effort priming of provider-side resources; returns how many were found
    async fn warm_pool(&self) -> AdapterResult<usize> {
        Ok(0)
    }
}

/// Adapter backed by a synchronous SDK; calls run on the blocking pool
pub trait BlockingExecutionAdapter: Send + Sync {
    fn execute(
        &self,
        code: &str,
        env_vars: &HashMap<String, String>,
        packages: &[String],
    ) -> Result<Execution, ExecutionFailure>;

    fn warm_pool(&self) -> AdapterResult<usize> {
        Ok(0)
    }
}

/// Failure of a run step, with whatever output was captured
pub(crate) type StepFailure = (AdapterError, Option<String>);

/// Run `cleanup` and turn the outcome of the run steps into the adapter result.
///
/// A Cleanup sample is recorded whether or not cleanup succeeds. A cleanup
/// error becomes a metric error string and never replaces the run's own error.
pub(crate) async fn finish_with_cleanup<C>(
    provider: &str,
    result: Result<String, StepFailure>,
    cleanup: C,
    mut metrics: TimingMetrics,
) -> Result<Execution, ExecutionFailure>
where
    C: Future<Output = AdapterResult<()>>,
{
    let start = Instant::now();
    if let Err(e) = cleanup.await {
        tracing::warn!(provider = %provider, "Cleanup failed: {}", e);
        metrics.add_error(format!("Cleanup error: {}", e));
    }
    metrics.add_metric(phases::CLEANUP, elapsed_secs(start));

    match result {
        Ok(output) => {
            timing::record_internal_timing(&output, &mut metrics);
            Ok(Execution { output, metrics })
        }
        Err((error, output)) => {
            let failure = ExecutionFailure::new(error, metrics);
            Err(match output {
                Some(output) => failure.with_output(output),
                None => failure,
            })
        }
    }
}

#[derive(Clone)]
pub enum Adapter {
    Async(Arc<dyn ExecutionAdapter>),
    Blocking(Arc<dyn BlockingExecutionAdapter>),
}

/// How the orchestrator schedules a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderPolicy {
    /// Parallel, bounded by a per-provider semaphore
    #[default]
    Standard,
    /// Serialized lane, global API gate and pacing; batch runs before standard providers
    RateLimited,
}

/// A named adapter and its scheduling policy
#[derive(Clone)]
pub struct Provider {
    name: String,
    adapter: Adapter,
    policy: ProviderPolicy,
    required_env: Vec<String>,
}

impl Provider {
    pub fn new(name: impl Into<String>, adapter: Arc<dyn ExecutionAdapter>) -> Self {
        Self {
            name: name.into(),
            adapter: Adapter::Async(adapter),
            policy: ProviderPolicy::Standard,
            required_env: Vec::new(),
        }
    }

    pub fn blocking(name: impl Into<String>, adapter: Arc<dyn BlockingExecutionAdapter>) -> Self {
        Self {
            name: name.into(),
            adapter: Adapter::Blocking(adapter),
            policy: ProviderPolicy::Standard,
            required_env: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Environment variables that must be set for this provider to run
    pub fn requires_env<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_env.extend(vars.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn policy(&self) -> ProviderPolicy {
        self.policy
    }

    pub fn is_rate_limited(&self) -> bool {
        self.policy == ProviderPolicy::RateLimited
    }

    pub fn required_env(&self) -> &[String] {
        &self.required_env
    }

    /// Required variables that are unset or empty in the process environment
    pub fn missing_env(&self) -> Vec<String> {
        self.required_env
            .iter()
            .filter(|var| std::env::var(var).map_or(true, |v| v.is_empty()))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.adapter {
            Adapter::Async(_) => "async",
            Adapter::Blocking(_) => "blocking",
        };
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("adapter", &kind)
            .field("policy", &self.policy)
            .field("required_env", &self.required_env)
            .finish()
    }
}

/// Providers available to an invocation, keyed by name
#[derive(Debug, Default, Clone)]
pub struct ProviderSet {
    providers: BTreeMap<String, Provider>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The local and Docker providers, with Docker clients shared through `docker_clients`
    pub fn builtin(config: &Config, docker_clients: Arc<ClientPool<Docker>>) -> Self {
        let mut set = Self::new();
        set.register(Provider::new(
            providers::LOCAL,
            Arc::new(LocalAdapter::new(&config.local)),
        ));
        set.register(Provider::new(
            providers::DOCKER,
            Arc::new(DockerAdapter::new(
                &config.docker,
                &config.benchmark.target_region,
                docker_clients,
            )),
        ));
        set
    }

    /// Add a provider, replacing any previous one with the same name
    pub fn register(&mut self, provider: Provider) {
        self.providers.insert(provider.name.clone(), provider);
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Resolve provider names, preserving the requested order
    pub fn select(&self, names: &[String]) -> BenchResult<Vec<Provider>> {
        if names.is_empty() {
            return Err(BenchError::NoProviders);
        }

        let mut selected: Vec<Provider> = Vec::with_capacity(names.len());
        for name in names {
            let provider = self
                .providers
                .get(name)
                .ok_or_else(|| BenchError::UnknownProvider(name.clone()))?;
            if !selected.iter().any(|p| p.name == *name) {
                selected.push(provider.clone());
            }
        }
        Ok(selected)
    }
}
