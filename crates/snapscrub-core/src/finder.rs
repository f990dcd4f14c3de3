// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Snapshot lookup helpers outside the pipeline.

use tracing::{debug, info, instrument};

use crate::context::{ExecutionOutput, Topology};
use crate::engine::DatabaseEngine;
use crate::error::{Result, WorkflowError};

/// Identifier of the newest snapshot of `database_id`.
///
/// Pages through the full listing; snapshots without a creation time are
/// ignored.
#[instrument(skip(engine))]
pub async fn find_latest_snapshot(
    engine: &dyn DatabaseEngine,
    topology: Topology,
    database_id: &str,
) -> Result<String> {
    let mut latest: Option<(chrono::DateTime<chrono::Utc>, String)> = None;
    let mut marker: Option<String> = None;
    let mut pages = 0u32;

    loop {
        let page = engine
            .list_snapshots(topology, database_id, marker.as_deref())
            .await?;
        pages += 1;
        for snapshot in page.snapshots {
            let Some(created_at) = snapshot.created_at else {
                continue;
            };
            if latest.as_ref().is_none_or(|(newest, _)| created_at > *newest) {
                latest = Some((created_at, snapshot.identifier));
            }
        }
        match page.marker {
            Some(next) => marker = Some(next),
            None => break,
        }
    }

    debug!(pages, "Listed snapshots");
    latest
        .map(|(_, id)| id)
        .ok_or_else(|| WorkflowError::not_found("No snapshots found"))
}

/// Delete the target snapshot of a finished execution.
///
/// The snapshot must exist exactly once.
#[instrument(skip(engine, output), fields(target_snapshot_id = %output.target_snapshot_id))]
pub async fn discard_target_snapshot(
    engine: &dyn DatabaseEngine,
    output: &ExecutionOutput,
) -> Result<()> {
    let topology = output.topology();
    let found = engine
        .describe_snapshots(topology, None, &output.target_snapshot_id)
        .await?;
    if found.len() != 1 {
        return Err(WorkflowError::not_found(format!(
            "{} snapshot {}",
            topology, output.target_snapshot_id
        )));
    }
    engine
        .delete_snapshot(topology, &output.target_snapshot_id)
        .await?;
    info!("Discarded target snapshot");
    Ok(())
}
