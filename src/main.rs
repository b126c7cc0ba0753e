//! Sandbench - Application Entry Point
//!
//! Runs the configured benchmark tests across the selected providers, prints
//! the comparison report and records the invocation in the history store.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sandbench::{
    benchmark::{BenchmarkHistory, LoggingObserver, ResultsVisualizer, SandboxExecutor},
    config::{Config, LoggingConfig},
    providers::{ClientPool, ProviderSet},
    suite,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.logging);

    tracing::info!("Starting sandbench...");

    // Resolve tests and providers; any unknown name is fatal
    let registry = suite::default_registry()?;
    let tests = registry.select(&config.benchmark.tests)?;

    let docker_clients = Arc::new(ClientPool::open());
    let provider_set = ProviderSet::builtin(&config, docker_clients.clone());
    let providers = provider_set.select(&config.benchmark.providers)?;

    let executor = SandboxExecutor::new(&config.benchmark, providers)?;
    let provider_names = executor.provider_names();

    tracing::info!(
        "Running {} tests on [{}] in region {} ({} runs, {} warmup)",
        tests.len(),
        provider_names.join(", "),
        executor.target_region(),
        executor.measurement_runs(),
        executor.warmup_runs()
    );

    let results = executor.run(&tests, Arc::new(LoggingObserver)).await;

    let visualizer = ResultsVisualizer;
    println!(
        "{}",
        visualizer.render_comparison(
            &results,
            &tests,
            &provider_names,
            executor.measurement_runs()
        )
    );

    if config.history.enabled {
        match BenchmarkHistory::open(&config.history.path) {
            Ok(mut history) => {
                let mut metadata = Map::new();
                metadata.insert(
                    "target_region".to_string(),
                    Value::from(executor.target_region()),
                );
                metadata.insert(
                    "measurement_runs".to_string(),
                    Value::from(executor.measurement_runs()),
                );
                metadata.insert(
                    "warmup_runs".to_string(),
                    Value::from(executor.warmup_runs()),
                );

                let run_id =
                    history.add_benchmark_run(&results, &provider_names, &tests, metadata);
                tracing::info!(
                    "Recorded run {} in {}",
                    run_id,
                    history.path().display()
                );

                println!(
                    "{}",
                    visualizer.render_trends(
                        &history,
                        &tests,
                        &provider_names,
                        config.history.trend_limit
                    )
                );
            }
            Err(e) => {
                tracing::error!(
                    "Failed to load benchmark history from {}: {}",
                    config.history.path.display(),
                    e
                );
            }
        }
    }

    let closed = docker_clients.close().await;
    tracing::debug!("Closed {} Docker clients", closed);

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.rust_log.clone().into());

    tracing_subscriber::registry()
        .with(filter)
        .with(logging.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!logging.json).then(tracing_subscriber::fmt::layer))
        .init();
}
