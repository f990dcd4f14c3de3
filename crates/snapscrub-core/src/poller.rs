// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Readiness polling for asynchronous engine operations.
//!
//! A poll is exactly one status read with a three-valued answer. Waiting is
//! a bounded, fixed-interval loop around it in which only
//! [`PollOutcome::NotReady`] is retried.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::context::Topology;
use crate::engine::DatabaseEngine;
use crate::error::{Result, WorkflowError};

/// Status substrings that mark a resource as irrecoverably failed.
pub const FATAL_STATUS_MARKERS: [&str; 6] = [
    "stop",
    "delet",
    "fail",
    "incompatible",
    "inaccessible",
    "error",
];

/// Status reported by a resource that finished its operation.
pub const READY_STATUS: &str = "available";

/// Whether `status` contains one of [`FATAL_STATUS_MARKERS`], ignoring case.
pub fn is_fatal_status(status: &str) -> bool {
    let status = status.to_ascii_lowercase();
    FATAL_STATUS_MARKERS
        .iter()
        .any(|marker| status.contains(marker))
}

/// Kind of resource being polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Snapshot,
    /// Cluster or instance, depending on topology.
    Database,
    /// Instance inside a cluster.
    DatabaseInstance,
}

/// Resource to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub topology: Topology,
    /// Database identifier; the snapshot's parent for snapshots.
    pub parent_id: String,
    pub snapshot_id: Option<String>,
}

impl ResourceRef {
    pub fn snapshot(topology: Topology, parent_id: &str, snapshot_id: &str) -> Self {
        Self {
            kind: ResourceKind::Snapshot,
            topology,
            parent_id: parent_id.to_string(),
            snapshot_id: Some(snapshot_id.to_string()),
        }
    }

    pub fn database(topology: Topology, database_id: &str) -> Self {
        Self {
            kind: ResourceKind::Database,
            topology,
            parent_id: database_id.to_string(),
            snapshot_id: None,
        }
    }

    pub fn instance(instance_id: &str) -> Self {
        Self {
            kind: ResourceKind::DatabaseInstance,
            topology: Topology::Instance,
            parent_id: instance_id.to_string(),
            snapshot_id: None,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResourceKind::Snapshot => write!(
                f,
                "{} snapshot {}",
                self.topology,
                self.snapshot_id.as_deref().unwrap_or("<unnamed>")
            ),
            ResourceKind::Database => write!(f, "{} {}", self.topology, self.parent_id),
            ResourceKind::DatabaseInstance => write!(f, "instance {}", self.parent_id),
        }
    }
}

/// Answer of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    /// Still transitioning; worth polling again.
    NotReady,
    /// Terminal failure with the reported status or reason.
    Failed(String),
}

/// Bounded fixed-interval wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Delay between polls.
    pub interval: Duration,
    /// Maximum number of polls.
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_attempts: 300,
        }
    }
}

impl WaitPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }
}

/// Single-read status checker over a [`DatabaseEngine`].
#[derive(Clone)]
pub struct ReadinessPoller {
    engine: Arc<dyn DatabaseEngine>,
}

impl ReadinessPoller {
    pub fn new(engine: Arc<dyn DatabaseEngine>) -> Self {
        Self { engine }
    }

    /// Read the status of `resource` once.
    ///
    /// Engine transport errors are returned as errors, never as
    /// [`PollOutcome::NotReady`].
    pub async fn poll(&self, resource: &ResourceRef) -> Result<PollOutcome> {
        match resource.kind {
            ResourceKind::Snapshot => {
                let Some(snapshot_id) = resource.snapshot_id.as_deref() else {
                    return Ok(PollOutcome::Failed("missing snapshot identifier".into()));
                };
                let found = self
                    .engine
                    .describe_snapshots(resource.topology, Some(&resource.parent_id), snapshot_id)
                    .await?;
                let [snapshot] = found.as_slice() else {
                    return Ok(PollOutcome::Failed("not found".into()));
                };
                Ok(classify(&snapshot.status, false))
            }
            ResourceKind::Database | ResourceKind::DatabaseInstance => {
                let found = self
                    .engine
                    .describe_databases(resource.topology, &resource.parent_id)
                    .await?;
                let [database] = found.as_slice() else {
                    return Ok(PollOutcome::Failed("not found".into()));
                };
                Ok(classify(&database.status, database.pending_modifications))
            }
        }
    }

    /// Poll until ready, failed or out of attempts.
    ///
    /// Returns the number of polls it took.
    #[instrument(skip(self, resource, policy), fields(resource = %resource))]
    pub async fn wait_until_ready(&self, resource: &ResourceRef, policy: WaitPolicy) -> Result<u32> {
        let max_attempts = policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.poll(resource).await? {
                PollOutcome::Ready => {
                    debug!(attempt, "Resource ready");
                    return Ok(attempt);
                }
                PollOutcome::Failed(status) => {
                    warn!(attempt, status = %status, "Resource failed");
                    return Err(WorkflowError::OperationFailed {
                        resource: resource.to_string(),
                        status,
                    });
                }
                PollOutcome::NotReady => {
                    debug!(attempt, max_attempts, "Resource not ready");
                    if attempt < max_attempts {
                        tokio::time::sleep(policy.interval).await;
                    }
                }
            }
        }
        warn!(attempts = max_attempts, "Gave up waiting for resource");
        Err(WorkflowError::WaitTimeout {
            resource: resource.to_string(),
            attempts: max_attempts,
        })
    }
}

fn classify(status: &str, pending_modifications: bool) -> PollOutcome {
    if status == READY_STATUS && !pending_modifications {
        PollOutcome::Ready
    } else if is_fatal_status(status) {
        PollOutcome::Failed(status.to_string())
    } else {
        PollOutcome::NotReady
    }
}
