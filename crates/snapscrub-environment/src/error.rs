// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for snapscrub-environment.

use thiserror::Error;

/// Environment errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Pipeline wiring failed.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] snapscrub_core::config::ConfigError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Script runner failed.
    #[error("Runner error: {0}")]
    Runner(#[from] snapscrub_core::runner::RunnerError),

    /// Engine call failed.
    #[error("Engine error: {0}")]
    Engine(#[from] snapscrub_core::engine::EngineError),

    /// Workflow operation failed.
    #[error("Workflow error: {0}")]
    Workflow(#[from] snapscrub_core::WorkflowError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using Environment Error.
pub type Result<T> = std::result::Result<T, Error>;
