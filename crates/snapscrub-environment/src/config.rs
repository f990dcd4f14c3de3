// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the snapscrub binary.

use std::path::PathBuf;
use std::time::Duration;

use snapscrub_core::config::WorkflowConfig;
use snapscrub_core::{ExecutionInput, Topology};

use crate::engine::AwsCliConfig;
use crate::error::{Error, Result};
use crate::runner::ContainerRunnerConfig;

/// Where the sanitize script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Script given directly in `SNAPSCRUB_SCRIPT`.
    Inline(String),
    /// Path given in `SNAPSCRUB_SCRIPT_FILE`.
    File(PathBuf),
}

impl ScriptSource {
    /// Read the script text; blank scripts are rejected.
    pub async fn load(&self) -> Result<String> {
        let script = match self {
            Self::Inline(script) => script.clone(),
            Self::File(path) => tokio::fs::read_to_string(path).await?,
        };
        if script.trim().is_empty() {
            return Err(ConfigError::Invalid("SNAPSCRUB_SCRIPT", "script is empty").into());
        }
        Ok(script)
    }
}

/// Snapscrub configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Source cluster or instance identifier.
    pub database_id: String,
    pub topology: Topology,
    /// Expected encryption key of the source.
    pub database_key: Option<String>,
    /// Key the temporary snapshot is re-encrypted under.
    pub snapshot_key: Option<String>,
    pub snapshot_prefix: Option<String>,
    pub temp_prefix: Option<String>,
    /// Sanitized snapshots to keep; unset or zero disables pruning.
    pub history_limit: Option<usize>,
    /// Required by `run` and `schedule` only.
    pub script: Option<ScriptSource>,
    /// Interval of the `schedule` command.
    pub schedule_interval: Option<Duration>,
    pub workflow: WorkflowConfig,
    pub aws: AwsCliConfig,
    pub container: ContainerRunnerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `SNAPSCRUB_DATABASE_ID`: source cluster or instance identifier
    ///
    /// Optional:
    /// - `SNAPSCRUB_IS_CLUSTER`: `true` for a cluster source (default: false)
    /// - `SNAPSCRUB_DATABASE_KEY`, `SNAPSCRUB_SNAPSHOT_KEY`
    /// - `SNAPSCRUB_SNAPSHOT_PREFIX` (default: source id), `SNAPSCRUB_TEMP_PREFIX` (default: sanitize)
    /// - `SNAPSCRUB_HISTORY_LIMIT`: sanitized snapshots to keep
    /// - `SNAPSCRUB_SCRIPT` or `SNAPSCRUB_SCRIPT_FILE`: sanitize script
    /// - `SNAPSCRUB_SCHEDULE_SECS`: interval between scheduled executions
    ///
    /// Wait, cleanup, placement, aws CLI and container settings are read by
    /// [`WorkflowConfig::from_env`], [`AwsCliConfig::from_env`] and
    /// [`ContainerRunnerConfig::from_env`].
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let database_id =
            optional_var("SNAPSCRUB_DATABASE_ID").ok_or(ConfigError::Missing("SNAPSCRUB_DATABASE_ID"))?;
        let topology = Topology::from_is_cluster(parse_env_bool("SNAPSCRUB_IS_CLUSTER", false));

        let history_limit = optional_var("SNAPSCRUB_HISTORY_LIMIT")
            .map(|v| {
                v.parse::<usize>().map_err(|_| {
                    ConfigError::Invalid("SNAPSCRUB_HISTORY_LIMIT", "must be a non-negative integer")
                })
            })
            .transpose()?;

        let script = match (
            optional_var("SNAPSCRUB_SCRIPT"),
            optional_var("SNAPSCRUB_SCRIPT_FILE"),
        ) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(
                    "SNAPSCRUB_SCRIPT",
                    "conflicts with SNAPSCRUB_SCRIPT_FILE",
                ));
            }
            (Some(script), None) => Some(ScriptSource::Inline(script)),
            (None, Some(path)) => Some(ScriptSource::File(PathBuf::from(path))),
            (None, None) => None,
        };

        let schedule_interval = optional_var("SNAPSCRUB_SCHEDULE_SECS")
            .map(|v| match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
                _ => Err(ConfigError::Invalid(
                    "SNAPSCRUB_SCHEDULE_SECS",
                    "must be a positive integer",
                )),
            })
            .transpose()?;

        Ok(Self {
            database_id,
            topology,
            database_key: optional_var("SNAPSCRUB_DATABASE_KEY"),
            snapshot_key: optional_var("SNAPSCRUB_SNAPSHOT_KEY"),
            snapshot_prefix: optional_var("SNAPSCRUB_SNAPSHOT_PREFIX"),
            temp_prefix: optional_var("SNAPSCRUB_TEMP_PREFIX"),
            history_limit,
            script,
            schedule_interval,
            workflow: WorkflowConfig::from_env()?,
            aws: AwsCliConfig::from_env(),
            container: ContainerRunnerConfig::from_env(),
        })
    }

    /// Load the sanitize script.
    pub async fn load_script(&self) -> Result<String> {
        match &self.script {
            Some(source) => source.load().await,
            None => Err(Error::Config(ConfigError::Missing(
                "SNAPSCRUB_SCRIPT or SNAPSCRUB_SCRIPT_FILE",
            ))),
        }
    }

    /// Execution input for this configuration and `script`.
    pub fn execution_input(&self, script: impl Into<String>) -> ExecutionInput {
        let mut input = ExecutionInput::new(self.database_id.clone(), self.topology, script);
        input.database_key = self.database_key.clone();
        input.snapshot_key = self.snapshot_key.clone();
        input.snapshot_prefix = self.snapshot_prefix.clone();
        input.temp_prefix = self.temp_prefix.clone();
        input.history_limit = self.history_limit;
        input
    }
}

/// Non-empty, trimmed value of an environment variable.
pub(crate) fn optional_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an env var into a bool with a sensible default.
pub(crate) fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),

    /// Wait, cleanup or placement settings are invalid.
    #[error(transparent)]
    Workflow(#[from] snapscrub_core::config::ConfigError),
}
