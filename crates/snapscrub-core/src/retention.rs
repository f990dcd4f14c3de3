// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retention of sanitized snapshots.
//!
//! Snapshot identifiers end in a `YYYYMMDDhhmm` timestamp, so ascending
//! lexical order is chronological order for a fixed prefix.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::context::Topology;
use crate::engine::{DatabaseEngine, Tag, TagIndex};
use crate::error::{Result, WorkflowError};

/// Identifier of a resource ARN: its last `:`-separated segment.
pub fn snapshot_id_from_arn(arn: &str) -> Option<&str> {
    arn.rsplit(':').next().filter(|id| !id.is_empty() && *id != arn)
}

/// Split sorted-ascending identifiers into (delete, keep).
///
/// The last `keep` identifiers are kept; everything before them is deleted.
pub fn select_for_deletion(mut ids: Vec<String>, keep: usize) -> (Vec<String>, Vec<String>) {
    ids.sort();
    let split = ids.len().saturating_sub(keep);
    let kept = ids.split_off(split);
    (ids, kept)
}

/// Outcome of one prune pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Identifiers that survived.
    pub kept: Vec<String>,
    /// Identifiers deleted.
    pub deleted: Vec<String>,
    /// Identifiers whose deletion failed, with the error.
    pub failed: Vec<(String, String)>,
    /// ARNs without an identifier segment.
    pub skipped: Vec<String>,
}

/// Deletes sanitized snapshots beyond a retention count.
#[derive(Clone)]
pub struct RetentionPruner {
    engine: Arc<dyn DatabaseEngine>,
    tag_index: Arc<dyn TagIndex>,
}

impl RetentionPruner {
    pub fn new(engine: Arc<dyn DatabaseEngine>, tag_index: Arc<dyn TagIndex>) -> Self {
        Self { engine, tag_index }
    }

    /// Keep the newest `keep` snapshots carrying `tags`, delete the rest.
    ///
    /// Deletions are sequential and best-effort; individual failures land in
    /// the report. An empty listing is an error.
    #[instrument(skip(self, tags))]
    pub async fn prune(&self, tags: &[Tag], topology: Topology, keep: usize) -> Result<PruneReport> {
        let resource_type = topology.snapshot_resource_type();
        let arns = self.tag_index.list_resources(tags, resource_type).await?;
        if arns.is_empty() {
            return Err(WorkflowError::NoMatches {
                resource_type: resource_type.to_string(),
            });
        }

        let mut report = PruneReport::default();
        let mut ids = Vec::with_capacity(arns.len());
        for arn in arns {
            match snapshot_id_from_arn(&arn) {
                Some(id) => ids.push(id.to_string()),
                None => {
                    warn!(arn = %arn, "Skipping ARN without identifier");
                    report.skipped.push(arn);
                }
            }
        }

        let (to_delete, kept) = select_for_deletion(ids, keep);
        report.kept = kept;

        for id in to_delete {
            match self.engine.delete_snapshot(topology, &id).await {
                Ok(()) => {
                    info!(snapshot_id = %id, "Deleted old sanitized snapshot");
                    report.deleted.push(id);
                }
                Err(e) => {
                    warn!(snapshot_id = %id, error = %e, "Failed to delete old sanitized snapshot");
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
