// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for snapscrub.
//!
//! [`SnapscrubRuntime`] wires a pipeline to its collaborators and offers the
//! operations of the `snapscrub` binary to applications that embed it.
//!
//! ```rust,ignore
//! use snapscrub_environment::config::Config;
//! use snapscrub_environment::runtime::SnapscrubRuntime;
//! use snapscrub_environment::schedule_worker::ScheduleWorkerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let runtime = SnapscrubRuntime::from_config(&config)?;
//!     let input = config.execution_input(config.load_script().await?);
//!
//!     let schedule = runtime.start_schedule(input, ScheduleWorkerConfig::default());
//!
//!     // ... run your application ...
//!
//!     schedule.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use snapscrub_core::config::WorkflowConfig;
use snapscrub_core::engine::{DatabaseEngine, TagIndex};
use snapscrub_core::finder::{discard_target_snapshot, find_latest_snapshot};
use snapscrub_core::runner::ScriptRunner;
use snapscrub_core::{ExecutionInput, ExecutionOutput, ExecutionReport, Pipeline, Topology};

use crate::config::Config;
use crate::engine::AwsCliEngine;
use crate::error::{Error, Result};
use crate::runner::ContainerRunner;
use crate::schedule_worker::{ScheduleWorker, ScheduleWorkerConfig};

/// Builder for creating a [`SnapscrubRuntime`].
#[derive(Default)]
pub struct SnapscrubRuntimeBuilder {
    engine: Option<Arc<dyn DatabaseEngine>>,
    tag_index: Option<Arc<dyn TagIndex>>,
    runner: Option<Arc<dyn ScriptRunner>>,
    workflow: WorkflowConfig,
}

impl SnapscrubRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database engine (required).
    pub fn engine(mut self, engine: Arc<dyn DatabaseEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the tag index (required).
    pub fn tag_index(mut self, tag_index: Arc<dyn TagIndex>) -> Self {
        self.tag_index = Some(tag_index);
        self
    }

    /// Set the sanitize script runner (required).
    pub fn runner(mut self, runner: Arc<dyn ScriptRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Set wait, cleanup and placement settings.
    pub fn workflow_config(mut self, config: WorkflowConfig) -> Self {
        self.workflow = config;
        self
    }

    /// Build the runtime.
    pub fn build(self) -> Result<SnapscrubRuntime> {
        let engine = self
            .engine
            .ok_or(snapscrub_core::config::ConfigError::Missing("engine"))?;
        let mut builder = Pipeline::builder()
            .engine(engine.clone())
            .config(self.workflow);
        if let Some(tag_index) = self.tag_index {
            builder = builder.tag_index(tag_index);
        }
        if let Some(runner) = self.runner {
            builder = builder.runner(runner);
        }

        Ok(SnapscrubRuntime {
            pipeline: Arc::new(builder.build()?),
            engine,
        })
    }
}

/// Pipeline plus its collaborators.
pub struct SnapscrubRuntime {
    pipeline: Arc<Pipeline>,
    engine: Arc<dyn DatabaseEngine>,
}

impl SnapscrubRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> SnapscrubRuntimeBuilder {
        SnapscrubRuntimeBuilder::new()
    }

    /// Runtime backed by the aws CLI and the container runner.
    pub fn from_config(config: &Config) -> Result<Self> {
        let engine = Arc::new(AwsCliEngine::new(config.aws.clone()));
        Self::builder()
            .engine(engine.clone())
            .tag_index(engine)
            .runner(Arc::new(ContainerRunner::new(config.container.clone())))
            .workflow_config(config.workflow.clone())
            .build()
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Run one execution to completion.
    pub async fn run_once(&self, input: &ExecutionInput) -> ExecutionReport {
        self.pipeline.execute(input).await
    }

    /// Identifier of the newest snapshot of `database_id`.
    pub async fn latest_snapshot(&self, topology: Topology, database_id: &str) -> Result<String> {
        Ok(find_latest_snapshot(self.engine.as_ref(), topology, database_id).await?)
    }

    /// Delete the target snapshot of a finished execution.
    pub async fn discard(&self, output: &ExecutionOutput) -> Result<()> {
        Ok(discard_target_snapshot(self.engine.as_ref(), output).await?)
    }

    /// Spawn a [`ScheduleWorker`] running `input`.
    pub fn start_schedule(&self, input: ExecutionInput, config: ScheduleWorkerConfig) -> ScheduleHandle {
        let worker = ScheduleWorker::new(self.pipeline.clone(), input, config);
        let shutdown = worker.shutdown_handle();
        let handle = tokio::spawn(async move { worker.run().await });
        info!("Schedule started");
        ScheduleHandle { handle, shutdown }
    }
}

/// A running schedule.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination; an execution
/// in progress finishes first.
pub struct ScheduleHandle {
    handle: JoinHandle<u64>,
    shutdown: Arc<Notify>,
}

impl ScheduleHandle {
    /// Check if the schedule is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the schedule and return the number of executions it ran.
    pub async fn shutdown(self) -> Result<u64> {
        self.shutdown.notify_one();
        match self.handle.await {
            Ok(runs) => Ok(runs),
            Err(e) => {
                error!("Schedule worker task panicked: {}", e);
                Err(Error::Other(format!("schedule worker task panicked: {e}")))
            }
        }
    }
}
