// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Snapscrub - Sanitized Database Snapshots
//!
//! Commands:
//! - `run`: one execution; prints the execution output as JSON
//! - `schedule`: one execution per `SNAPSCRUB_SCHEDULE_SECS` until Ctrl-C
//! - `latest`: identifier of the newest snapshot of the source
//! - `discard <output.json>`: delete the target snapshot of a finished execution

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{info, warn};

use snapscrub_core::ExecutionOutput;
use snapscrub_environment::cli::{Cli, Command};
use snapscrub_environment::config::Config;
use snapscrub_environment::runtime::SnapscrubRuntime;
use snapscrub_environment::schedule_worker::ScheduleWorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapscrub_environment=info,snapscrub_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;
    let runtime = SnapscrubRuntime::from_config(&config)?;

    info!(
        command = cli.command.name(),
        database_id = %config.database_id,
        topology = %config.topology,
        "Starting snapscrub"
    );

    match cli.command {
        Command::Run => {
            let input = config.execution_input(config.load_script().await?);
            let report = runtime.run_once(&input).await;
            let output = report.output();
            println!("{}", serde_json::to_string_pretty(&output)?);
            if let Some(e) = &report.error {
                bail!("execution {} failed: {}", output.execution_id, e);
            }
        }
        Command::Schedule => {
            let interval = config
                .schedule_interval
                .context("SNAPSCRUB_SCHEDULE_SECS is required for schedule")?;
            let input = config.execution_input(config.load_script().await?);
            let schedule = runtime.start_schedule(
                input,
                ScheduleWorkerConfig {
                    interval,
                    run_immediately: true,
                },
            );

            // Wait for shutdown signal
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received");

            let runs = schedule.shutdown().await?;
            info!(runs, "Schedule stopped");
        }
        Command::Latest => {
            let snapshot_id = runtime
                .latest_snapshot(config.topology, &config.database_id)
                .await?;
            println!("{snapshot_id}");
        }
        Command::Discard { output: path } => {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let output: ExecutionOutput = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            runtime.discard(&output).await?;
            info!(target_snapshot_id = %output.target_snapshot_id, "Target snapshot discarded");
        }
    }

    Ok(())
}
