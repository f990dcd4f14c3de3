// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runner trait definitions.
//!
//! Defines the abstract interface for sanitize script runners.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::context::EngineFamily;

/// Errors from runner operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerError {
    /// Client binary or image was not found.
    #[error("Client not found: {0}")]
    ClientNotFound(String),

    /// Execution timed out.
    #[error("Execution timeout")]
    Timeout,

    /// Container/process failed to start.
    #[error("Container start failed: {0}")]
    StartFailed(String),

    /// Process exited with non-zero code.
    #[error("Exit code {exit_code}: {stderr}")]
    ExitCode {
        /// Exit code from the process.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Connection and script for one sanitize run.
#[derive(Clone)]
pub struct ScriptRequest {
    /// Selects the client (mysql or psql).
    pub family: EngineFamily,
    /// Address of the temporary database.
    pub endpoint: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// SQL to execute.
    pub script: String,
    /// Execution timeout
    pub timeout: Duration,
}

impl fmt::Debug for ScriptRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRequest")
            .field("family", &self.family)
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("script_len", &self.script.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Result of a sanitize run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptOutcome {
    /// Whether the script exited successfully.
    pub success: bool,
    /// Process exit code, if the process exited normally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Raw stderr output from the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Execution duration in milliseconds.
    pub duration_ms: u64,
}

/// Trait for sanitize script runners.
///
/// A runner connects to the temporary database with the client matching the
/// request's engine family, executes the script and blocks until it exits.
/// Runners never talk to the database engine's control plane.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Runner type identifier (e.g., "container", "mock")
    fn runner_type(&self) -> &'static str;

    /// Run the script synchronously, waiting for completion.
    async fn run(&self, request: &ScriptRequest) -> Result<ScriptOutcome>;
}
