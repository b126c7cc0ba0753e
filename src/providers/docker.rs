//! Docker container provider
//!
//! Each execution gets a fresh, resource-limited container: created and
//! started (Workspace Creation), test packages pip-installed (Dependency
//! Installation), the program written into it (Environment Setup), run (Code
//! Execution), then force-removed (Cleanup). Containers only get a network
//! when there are packages to install.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use bollard::{
    Docker,
    container::LogOutput,
    exec::{CreateExecOptions, StartExecResults},
    models::{ContainerCreateBody, HostConfig},
    query_parameters::{CreateContainerOptionsBuilder, RemoveContainerOptionsBuilder},
};
use futures::StreamExt;
use uuid::Uuid;

use super::{ClientPool, Execution, ExecutionAdapter, StepFailure, finish_with_cleanup};
use crate::benchmark::metrics::TimingMetrics;
use crate::config::DockerConfig;
use crate::constants::{phases, providers};
use crate::error::{AdapterError, AdapterResult, ExecutionFailure};
use crate::utils::time::elapsed_secs;

const WORKSPACE_DIR: &str = "/workspace";
const PROGRAM_PATH: &str = "/workspace/main.py";
const CONTAINER_LABEL: &str = "sandbench.run";
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Captured output of one exec call
#[derive(Debug)]
struct CommandOutput {
    stdout: String,
    stderr: String,
    exit_code: i64,
}

/// Runs programs in throwaway Docker containers
pub struct DockerAdapter {
    pool: Arc<ClientPool<Docker>>,
    endpoint: String,
    image: String,
    memory_limit_mb: u64,
}

impl DockerAdapter {
    /// Adapter for the daemon serving `region`; clients are shared through `pool`
    pub fn new(config: &DockerConfig, region: &str, pool: Arc<ClientPool<Docker>>) -> Self {
        Self {
            pool,
            endpoint: config.socket_for(region).to_string(),
            image: config.image.clone(),
            memory_limit_mb: config.memory_limit_mb,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn client(&self) -> AdapterResult<Docker> {
        let endpoint = self.endpoint.as_str();
        self.pool
            .get_or_connect(endpoint, || {
                Docker::connect_with_socket(
                    endpoint,
                    CONNECT_TIMEOUT_SECS,
                    bollard::API_DEFAULT_VERSION,
                )
                .map_err(AdapterError::from)
            })
            .await
    }

    /// Create and start a sandbox container
    async fn create_container(&self, docker: &Docker, networked: bool) -> AdapterResult<String> {
        let name = format!("sandbench-{}", Uuid::new_v4());
        let options = CreateContainerOptionsBuilder::default().name(&name).build();

        let memory_bytes = (self.memory_limit_mb * 1024 * 1024) as i64;
        let host_config = HostConfig {
            memory: Some(memory_bytes),
            memory_swap: Some(memory_bytes),
            network_mode: Some(if networked { "bridge" } else { "none" }.to_string()),
            pids_limit: Some(64),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(self.image.clone()),
            // Keep the container alive between exec calls
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            tty: Some(true),
            host_config: Some(host_config),
            working_dir: Some(WORKSPACE_DIR.to_string()),
            env: Some(vec!["LANG=C.UTF-8".to_string()]),
            labels: Some(HashMap::from([(CONTAINER_LABEL.to_string(), name.clone())])),
            ..Default::default()
        };

        let container = docker.create_container(Some(options), body).await?;

        if let Err(e) = docker
            .start_container(
                &container.id,
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
        {
            if let Err(cleanup) = self.remove_container(docker, &container.id).await {
                tracing::warn!(
                    provider = providers::DOCKER,
                    "Failed to remove unstarted container {}: {}",
                    container.id,
                    cleanup
                );
            }
            return Err(e.into());
        }

        Ok(container.id)
    }

    async fn remove_container(&self, docker: &Docker, container_id: &str) -> AdapterResult<()> {
        let options = RemoveContainerOptionsBuilder::default().force(true).build();
        docker.remove_container(container_id, Some(options)).await?;
        Ok(())
    }

    /// Write a file into the container through base64 so any content survives the shell
    async fn write_file(
        &self,
        docker: &Docker,
        container_id: &str,
        path: &str,
        content: &str,
    ) -> AdapterResult<()> {
        let result = exec_command(docker, container_id, &write_command(path, content), &[]).await?;
        if result.exit_code != 0 {
            return Err(AdapterError::Docker(format!(
                "Failed to write {}: {}",
                path,
                result.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn install_packages(
        &self,
        docker: &Docker,
        container_id: &str,
        packages: &[String],
    ) -> AdapterResult<()> {
        tracing::debug!(
            provider = providers::DOCKER,
            container = %container_id,
            "Installing {}",
            packages.join(" ")
        );

        let result = exec_command(docker, container_id, &install_command(packages), &[])
            .await
            .map_err(|e| AdapterError::Installation(e.to_string()))?;
        if result.exit_code != 0 {
            return Err(AdapterError::Installation(result.stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn run_program(
        &self,
        docker: &Docker,
        container_id: &str,
        code: &str,
        env_vars: &HashMap<String, String>,
        packages: &[String],
        metrics: &mut TimingMetrics,
    ) -> Result<String, StepFailure> {
        if !packages.is_empty() {
            let start = Instant::now();
            let installed = self.install_packages(docker, container_id, packages).await;
            metrics.add_metric(phases::DEPENDENCY_INSTALLATION, elapsed_secs(start));
            installed.map_err(|e| (e, None))?;
        }

        let start = Instant::now();
        self.write_file(docker, container_id, PROGRAM_PATH, code)
            .await
            .map_err(|e| (e, None))?;
        metrics.add_metric(phases::ENVIRONMENT_SETUP, elapsed_secs(start));

        let start = Instant::now();
        let env = env_pairs(env_vars);
        let result = exec_command(
            docker,
            container_id,
            &format!("python3 {}", PROGRAM_PATH),
            &env,
        )
        .await
        .map_err(|e| (e, None))?;
        metrics.add_metric(phases::CODE_EXECUTION, elapsed_secs(start));

        if result.exit_code != 0 {
            tracing::warn!(
                provider = providers::DOCKER,
                "Execution failed with exit code {}",
                result.exit_code
            );
            let output = format!("STDOUT:\n{}\n\nSTDERR:\n{}", result.stdout, result.stderr);
            return Err((
                AdapterError::NonZeroExit {
                    exit_code: result.exit_code,
                    stderr: result.stderr.trim().to_string(),
                },
                Some(output),
            ));
        }

        Ok(result.stdout)
    }
}

#[async_trait]
impl ExecutionAdapter for DockerAdapter {
    async fn execute(
        &self,
        code: &str,
        env_vars: &HashMap<String, String>,
        packages: &[String],
    ) -> Result<Execution, ExecutionFailure> {
        let mut metrics = TimingMetrics::new();

        let docker = self.client().await?;

        let start = Instant::now();
        let container_id = match self.create_container(&docker, !packages.is_empty()).await {
            Ok(id) => id,
            Err(e) => return Err(ExecutionFailure::new(e, metrics)),
        };
        metrics.add_metric(phases::WORKSPACE_CREATION, elapsed_secs(start));
        tracing::debug!(provider = providers::DOCKER, container = %container_id, "Container started");

        let result = self
            .run_program(&docker, &container_id, code, env_vars, packages, &mut metrics)
            .await;

        let cleanup = self.remove_container(&docker, &container_id);
        finish_with_cleanup(providers::DOCKER, result, cleanup, metrics).await
    }

    /// Touch the daemon once so the client and its connection exist before the batch
    async fn warm_pool(&self) -> AdapterResult<usize> {
        let docker = self.client().await?;
        let containers = docker
            .list_containers(None::<bollard::query_parameters::ListContainersOptions>)
            .await?;
        Ok(containers.len())
    }
}

/// Execute a shell command in the container
async fn exec_command(
    docker: &Docker,
    container_id: &str,
    cmd: &str,
    env: &[String],
) -> AdapterResult<CommandOutput> {
    let exec = docker
        .create_exec(
            container_id,
            CreateExecOptions {
                cmd: Some(vec!["/bin/sh", "-c", cmd]),
                env: Some(env.iter().map(String::as_str).collect()),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            },
        )
        .await?;

    let mut stdout = String::new();
    let mut stderr = String::new();

    if let StartExecResults::Attached { mut output, .. } = docker.start_exec(&exec.id, None).await? {
        while let Some(msg) = output.next().await {
            match msg? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdErr { message } => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                _ => {}
            }
        }
    }

    let inspect = docker.inspect_exec(&exec.id).await?;

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code: inspect.exit_code.unwrap_or(-1),
    })
}

fn write_command(path: &str, content: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(content);
    format!("echo '{}' | base64 -d > {}", encoded, path)
}

fn install_command(packages: &[String]) -> String {
    let quoted: Vec<String> = packages.iter().map(|p| shell_quote(p)).collect();
    format!(
        "python3 -m pip install --quiet --disable-pip-version-check {}",
        quoted.join(" ")
    )
}

/// Single-quote for `/bin/sh`, so version specifiers like `pandas>=2` stay one word
fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', "'\\''"))
}

/// `KEY=value` pairs in a stable order
fn env_pairs(env_vars: &HashMap<String, String>) -> Vec<String> {
    let mut pairs: Vec<String> = env_vars
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    pairs.sort();
    pairs
}
