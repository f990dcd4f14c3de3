// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker running the pipeline on a fixed interval.
//!
//! Executions never overlap: the next interval starts after the previous
//! execution, including its cleanup, has finished. A failed execution is
//! logged and the schedule continues.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info, warn};

use snapscrub_core::{ExecutionInput, Pipeline};

/// Configuration for the schedule worker.
#[derive(Debug, Clone)]
pub struct ScheduleWorkerConfig {
    /// Delay between the end of one execution and the start of the next.
    pub interval: Duration,
    /// Run once before the first interval elapses.
    pub run_immediately: bool,
}

impl Default for ScheduleWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 3600),
            run_immediately: false,
        }
    }
}

/// Background worker that triggers executions.
pub struct ScheduleWorker {
    pipeline: Arc<Pipeline>,
    input: ExecutionInput,
    config: ScheduleWorkerConfig,
    shutdown: Arc<Notify>,
}

impl ScheduleWorker {
    pub fn new(pipeline: Arc<Pipeline>, input: ExecutionInput, config: ScheduleWorkerConfig) -> Self {
        Self {
            pipeline,
            input,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the worker loop until shutdown; returns the number of executions.
    pub async fn run(&self) -> u64 {
        info!(
            database_id = %self.input.database_identifier,
            interval_secs = self.config.interval.as_secs(),
            run_immediately = self.config.run_immediately,
            "Schedule worker started"
        );

        let mut runs = 0u64;
        if self.config.run_immediately {
            self.execute_once().await;
            runs += 1;
        }

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Schedule worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.interval) => {
                    self.execute_once().await;
                    runs += 1;
                }
            }
        }

        info!(runs, "Schedule worker stopped");
        runs
    }

    async fn execute_once(&self) {
        let report = self.pipeline.execute(&self.input).await;
        let output = report.output();
        match &report.error {
            None => info!(
                execution_id = %output.execution_id,
                target_snapshot_id = %output.target_snapshot_id,
                "Scheduled execution succeeded"
            ),
            Some(e) => error!(
                execution_id = %output.execution_id,
                code = e.error_code(),
                error = %e,
                "Scheduled execution failed"
            ),
        }
        if !output.cleanup_failures.is_empty() {
            warn!(
                execution_id = %output.execution_id,
                leftovers = ?output.cleanup_failures,
                "Temporary resources left behind"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapscrub_core::Topology;
    use snapscrub_core::engine::MemoryEngine;
    use snapscrub_core::runner::MockRunner;

    fn worker(config: ScheduleWorkerConfig) -> (ScheduleWorker, Arc<MockRunner>) {
        let engine = Arc::new(MemoryEngine::new());
        let runner = Arc::new(MockRunner::new());
        let pipeline = Pipeline::builder()
            .engine(engine.clone())
            .tag_index(engine)
            .runner(runner.clone())
            .build()
            .unwrap();
        let input = ExecutionInput::new("missing", Topology::Instance, "select 1");
        (ScheduleWorker::new(Arc::new(pipeline), input, config), runner)
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_first_interval() {
        let (worker, runner) = worker(ScheduleWorkerConfig::default());
        let shutdown = worker.shutdown_handle();
        let handle = tokio::spawn(async move { worker.run().await });

        tokio::time::sleep(Duration::from_secs(60)).await;
        shutdown.notify_one();

        assert_eq!(handle.await.unwrap(), 0);
        assert!(runner.requests().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_executions_keep_schedule_running() {
        // The source does not exist, so every execution fails at resolution.
        let (worker, _) = worker(ScheduleWorkerConfig {
            interval: Duration::from_secs(3600),
            run_immediately: true,
        });
        let shutdown = worker.shutdown_handle();
        let handle = tokio::spawn(async move { worker.run().await });

        tokio::time::sleep(Duration::from_secs(3600 * 2 + 1800)).await;
        shutdown.notify_one();

        assert_eq!(handle.await.unwrap(), 3);
    }
}
