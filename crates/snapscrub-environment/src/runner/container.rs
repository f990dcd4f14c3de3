// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container runner.
//!
//! Runs the database client (`mysql` or `psql`) in a throwaway container and
//! feeds the sanitize script to it on stdin. The password travels only in the
//! container CLI's environment and is forwarded with `-e NAME`, never as an
//! argument.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use snapscrub_core::EngineFamily;
use snapscrub_core::runner::{Result, RunnerError, ScriptOutcome, ScriptRequest, ScriptRunner};

use crate::config::optional_var;

/// Seconds the client waits for the database to accept a connection.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Container runner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRunnerConfig {
    /// Container CLI executable.
    pub program: String,
    /// Arguments placed before `run` (e.g. `--remote`).
    pub args: Vec<String>,
    /// Image providing the `mysql` client.
    pub mysql_image: String,
    /// Image providing the `psql` client.
    pub postgres_image: String,
    /// Network the client container joins.
    pub network: Option<String>,
}

impl Default for ContainerRunnerConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            args: Vec::new(),
            mysql_image: "mysql:8.0".to_string(),
            postgres_image: "postgres:16".to_string(),
            network: None,
        }
    }
}

impl ContainerRunnerConfig {
    /// Create configuration from environment variables.
    ///
    /// - `SNAPSCRUB_CONTAINER_CLI`: container CLI command line (default: `docker`)
    /// - `SNAPSCRUB_MYSQL_IMAGE` (default: `mysql:8.0`)
    /// - `SNAPSCRUB_POSTGRES_IMAGE` (default: `postgres:16`)
    /// - `SNAPSCRUB_NETWORK`: container network
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let (program, args) = match optional_var("SNAPSCRUB_CONTAINER_CLI") {
            Some(command) => {
                let mut parts = command.split_whitespace().map(str::to_string);
                match parts.next() {
                    Some(program) => (program, parts.collect()),
                    None => (defaults.program.clone(), Vec::new()),
                }
            }
            None => (defaults.program.clone(), Vec::new()),
        };

        Self {
            program,
            args,
            mysql_image: optional_var("SNAPSCRUB_MYSQL_IMAGE").unwrap_or(defaults.mysql_image),
            postgres_image: optional_var("SNAPSCRUB_POSTGRES_IMAGE")
                .unwrap_or(defaults.postgres_image),
            network: optional_var("SNAPSCRUB_NETWORK"),
        }
    }
}

/// Sanitize script runner using a container CLI.
pub struct ContainerRunner {
    config: ContainerRunnerConfig,
}

impl ContainerRunner {
    pub fn new(config: ContainerRunnerConfig) -> Self {
        Self { config }
    }

    fn image(&self, family: EngineFamily) -> &str {
        match family {
            EngineFamily::Mysql => &self.config.mysql_image,
            EngineFamily::Postgres => &self.config.postgres_image,
        }
    }

    /// Arguments of `docker run` for `request`.
    pub(crate) fn run_args(&self, request: &ScriptRequest, container_name: &str) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.extend(["run", "--rm", "-i", "--name", container_name].map(str::to_string));
        if let Some(network) = &self.config.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        for (name, _) in client_env(request) {
            args.push("-e".to_string());
            args.push(name.to_string());
        }
        args.push(self.image(request.family).to_string());
        args.extend(client_args(request));
        args
    }

    /// Best-effort kill of a container left behind by a timed out run.
    async fn kill_container(&self, container_name: &str) {
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            Command::new(&self.config.program)
                .args(&self.config.args)
                .args(["kill", container_name])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await;
        if !matches!(result, Ok(Ok(ref output)) if output.status.success()) {
            warn!(container = %container_name, "Failed to kill client container");
        }
    }
}

/// Client invocation inside the container.
fn client_args(request: &ScriptRequest) -> Vec<String> {
    match request.family {
        EngineFamily::Mysql => vec![
            "mysql".to_string(),
            format!("--user={}", request.user),
            format!("--connect-timeout={CONNECT_TIMEOUT_SECS}"),
            format!("--database={}", request.database),
        ],
        EngineFamily::Postgres => vec![
            "psql".to_string(),
            "--no-psqlrc".to_string(),
            "--set=ON_ERROR_STOP=1".to_string(),
            "--file=-".to_string(),
        ],
    }
}

/// Connection variables set on the container CLI process and forwarded
/// into the container.
fn client_env(request: &ScriptRequest) -> Vec<(&'static str, String)> {
    match request.family {
        EngineFamily::Mysql => vec![
            ("MYSQL_HOST", request.endpoint.clone()),
            ("MYSQL_TCP_PORT", request.port.to_string()),
            ("MYSQL_PWD", request.password.clone()),
        ],
        EngineFamily::Postgres => vec![
            ("PGHOST", request.endpoint.clone()),
            ("PGPORT", request.port.to_string()),
            ("PGUSER", request.user.clone()),
            ("PGPASSWORD", request.password.clone()),
            ("PGDATABASE", request.database.clone()),
            ("PGCONNECT_TIMEOUT", CONNECT_TIMEOUT_SECS.to_string()),
        ],
    }
}

#[async_trait]
impl ScriptRunner for ContainerRunner {
    fn runner_type(&self) -> &'static str {
        "container"
    }

    async fn run(&self, request: &ScriptRequest) -> Result<ScriptOutcome> {
        let start = Instant::now();
        let container_name = format!("snapscrub-{}", Uuid::new_v4().simple());

        debug!(
            container = %container_name,
            image = self.image(request.family),
            family = %request.family,
            "Starting client container"
        );

        let mut child = Command::new(&self.config.program)
            .args(self.run_args(request, &container_name))
            .envs(client_env(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => RunnerError::ClientNotFound(self.config.program.clone()),
                _ => RunnerError::StartFailed(e.to_string()),
            })?;

        // Feed stdin while draining output, all under the script timeout.
        let stdin = child.stdin.take();
        let script = request.script.as_bytes();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(script).await {
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            Ok(())
        };
        let exchange = async { tokio::join!(feed, child.wait_with_output()) };

        let (fed, output) = match tokio::time::timeout(request.timeout, exchange).await {
            Ok((fed, output)) => (fed, output?),
            Err(_) => {
                warn!(container = %container_name, "Sanitize script timed out, killing container");
                self.kill_container(&container_name).await;
                return Err(RunnerError::Timeout);
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            error!(container = %container_name, exit_code, stderr = %stderr, "Sanitize script failed");
            return Err(RunnerError::ExitCode { exit_code, stderr });
        }
        fed?;

        info!(container = %container_name, duration_ms, "Client container completed successfully");
        Ok(ScriptOutcome {
            success: true,
            exit_code: output.status.code(),
            stderr: (!stderr.is_empty()).then_some(stderr),
            duration_ms,
        })
    }
}
