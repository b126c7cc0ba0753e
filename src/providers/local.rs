//! Local subprocess provider
//!
//! Writes the program to a temporary file and runs it with the configured
//! interpreter. Test packages are pip-installed into a temporary target
//! directory that is put on `PYTHONPATH` for the run. Used as the
//! always-available fallback and in tests.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use super::{Execution, ExecutionAdapter, StepFailure, finish_with_cleanup};
use crate::benchmark::metrics::TimingMetrics;
use crate::config::LocalConfig;
use crate::constants::{phases, providers};
use crate::error::{AdapterError, ExecutionFailure};
use crate::utils::time::elapsed_secs;

const PYTHONPATH: &str = "PYTHONPATH";

/// Runs programs as local child processes
#[derive(Debug, Clone)]
pub struct LocalAdapter {
    interpreter: String,
    /// Install command; the target directory and the packages are appended
    installer: Vec<String>,
}

impl LocalAdapter {
    pub fn new(config: &LocalConfig) -> Self {
        Self::with_interpreter(&config.interpreter)
    }

    pub fn with_interpreter(interpreter: impl Into<String>) -> Self {
        let interpreter = interpreter.into();
        let installer = [
            interpreter.as_str(),
            "-m",
            "pip",
            "install",
            "--quiet",
            "--disable-pip-version-check",
            "--target",
        ]
        .map(String::from)
        .to_vec();

        Self {
            interpreter,
            installer,
        }
    }

    /// Replace the pip invocation used for package installation
    pub fn with_installer<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.installer = command.into_iter().map(Into::into).collect();
        self
    }

    async fn write_script(code: &str) -> Result<tempfile::NamedTempFile, AdapterError> {
        let script = tempfile::Builder::new()
            .prefix("sandbench-")
            .suffix(".py")
            .tempfile()?;
        tokio::fs::write(script.path(), code).await?;
        Ok(script)
    }

    async fn install_packages(&self, target: &Path, packages: &[String]) -> Result<(), AdapterError> {
        let (program, args) = self
            .installer
            .split_first()
            .ok_or_else(|| AdapterError::Installation("no installer command".to_string()))?;

        tracing::debug!(
            provider = providers::LOCAL,
            "Installing {} into {}",
            packages.join(" "),
            target.display()
        );

        let output = Command::new(program)
            .args(args)
            .arg(target)
            .args(packages)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AdapterError::Installation(e.to_string()))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(AdapterError::Installation(if stderr.is_empty() {
            format!("installer exited with {}", output.status)
        } else {
            stderr
        }))
    }

    /// Dependency Installation (when there is a target directory), then Code Execution
    async fn run_steps(
        &self,
        script: &Path,
        deps: Option<&Path>,
        packages: &[String],
        env_vars: &HashMap<String, String>,
        metrics: &mut TimingMetrics,
    ) -> Result<String, StepFailure> {
        let python_path = match deps {
            Some(target) => {
                let start = Instant::now();
                let installed = self.install_packages(target, packages).await;
                metrics.add_metric(phases::DEPENDENCY_INSTALLATION, elapsed_secs(start));
                installed.map_err(|e| (e, None))?;
                Some(python_path(target, env_vars))
            }
            None => None,
        };

        self.run_script(script, env_vars, python_path, metrics).await
    }

    async fn run_script(
        &self,
        path: &Path,
        env_vars: &HashMap<String, String>,
        python_path: Option<OsString>,
        metrics: &mut TimingMetrics,
    ) -> Result<String, StepFailure> {
        tracing::debug!(provider = providers::LOCAL, "Executing {}", path.display());

        let mut command = Command::new(&self.interpreter);
        command
            .arg(path)
            .envs(env_vars)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(python_path) = python_path {
            command.env(PYTHONPATH, python_path);
        }

        let start = Instant::now();
        let output = command
            .output()
            .await
            .map_err(|e| (AdapterError::from(e), None))?;
        metrics.add_metric(phases::CODE_EXECUTION, elapsed_secs(start));

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            return Ok(stdout);
        }

        // Killed by a signal has no exit code
        let exit_code = output.status.code().map_or(-1, i64::from);
        tracing::warn!(
            provider = providers::LOCAL,
            "Execution failed with return code {}",
            exit_code
        );
        Err((
            AdapterError::NonZeroExit {
                exit_code,
                stderr: stderr.trim().to_string(),
            },
            Some(format!("STDOUT:\n{}\n\nSTDERR:\n{}", stdout, stderr)),
        ))
    }
}

/// Install target first, then whatever the test or the parent process already had
fn python_path(target: &Path, env_vars: &HashMap<String, String>) -> OsString {
    let existing = env_vars
        .get(PYTHONPATH)
        .map(OsString::from)
        .or_else(|| std::env::var_os(PYTHONPATH));

    let mut paths = vec![target.to_path_buf()];
    if let Some(existing) = existing {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).unwrap_or_else(|_| target.as_os_str().to_owned())
}

#[async_trait]
impl ExecutionAdapter for LocalAdapter {
    async fn execute(
        &self,
        code: &str,
        env_vars: &HashMap<String, String>,
        packages: &[String],
    ) -> Result<Execution, ExecutionFailure> {
        let mut metrics = TimingMetrics::new();

        let deps = if packages.is_empty() {
            None
        } else {
            match tempfile::Builder::new().prefix("sandbench-deps-").tempdir() {
                Ok(dir) => Some(dir),
                Err(e) => {
                    return Err(ExecutionFailure::new(
                        AdapterError::Installation(e.to_string()),
                        metrics,
                    ));
                }
            }
        };

        let start = Instant::now();
        let script = match Self::write_script(code).await {
            Ok(script) => script,
            Err(e) => return Err(ExecutionFailure::new(e, metrics)),
        };
        metrics.add_metric(phases::ENVIRONMENT_SETUP, elapsed_secs(start));

        let result = self
            .run_steps(
                script.path(),
                deps.as_ref().map(TempDir::path),
                packages,
                env_vars,
                &mut metrics,
            )
            .await;

        let cleanup = async move {
            let script_removed = script.close();
            let deps_removed = deps.map_or(Ok(()), TempDir::close);
            script_removed.and(deps_removed).map_err(AdapterError::from)
        };
        finish_with_cleanup(providers::LOCAL, result, cleanup, metrics).await
    }
}
