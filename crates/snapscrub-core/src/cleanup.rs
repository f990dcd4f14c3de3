// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Teardown of temporary resources.
//!
//! Runs once per execution after success or failure. Branches are
//! independent: each retries on its own schedule and an exhausted branch
//! never stops its siblings.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::context::{Topology, WorkflowContext};
use crate::engine::{DatabaseEngine, EngineResult};

/// Fixed-interval retry bound for one cleanup branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(10),
        }
    }
}

impl CleanupPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }
}

/// Temporary resource removed by a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTarget {
    TempSnapshot,
    EncryptedSnapshot,
    TempInstance,
    TempCluster,
}

impl CleanupTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TempSnapshot => "temp_snapshot",
            Self::EncryptedSnapshot => "encrypted_snapshot",
            Self::TempInstance => "temp_instance",
            Self::TempCluster => "temp_cluster",
        }
    }
}

impl fmt::Display for CleanupTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One teardown action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupBranch {
    pub target: CleanupTarget,
    pub resource_id: String,
}

/// Branches applicable to an execution, in a stable order.
pub fn branches_for(ctx: &WorkflowContext) -> Vec<CleanupBranch> {
    let mut branches = vec![CleanupBranch {
        target: CleanupTarget::TempSnapshot,
        resource_id: ctx.temp_snapshot_id.clone(),
    }];
    if ctx.reencrypts() {
        branches.push(CleanupBranch {
            target: CleanupTarget::EncryptedSnapshot,
            resource_id: ctx.temp_enc_snapshot_id.clone(),
        });
    }
    branches.push(CleanupBranch {
        target: CleanupTarget::TempInstance,
        resource_id: ctx.temp_instance_to_delete().to_string(),
    });
    if ctx.topology.is_cluster() {
        branches.push(CleanupBranch {
            target: CleanupTarget::TempCluster,
            resource_id: ctx.temp_db_id.clone(),
        });
    }
    branches
}

/// Final state of a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum BranchOutcome {
    Deleted,
    /// The resource did not exist (it was never created).
    Absent,
    /// Retries exhausted; carries the last error.
    Failed(String),
}

/// Attempts and outcome of one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchReport {
    pub target: CleanupTarget,
    pub resource_id: String,
    pub attempts: u32,
    pub outcome: BranchOutcome,
}

/// Result of the cleanup fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub branches: Vec<BranchReport>,
}

impl CleanupReport {
    /// Branches that exhausted their retries.
    pub fn failures(&self) -> impl Iterator<Item = &BranchReport> {
        self.branches
            .iter()
            .filter(|b| matches!(b.outcome, BranchOutcome::Failed(_)))
    }

    /// True when no branch failed.
    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn branch(&self, target: CleanupTarget) -> Option<&BranchReport> {
        self.branches.iter().find(|b| b.target == target)
    }
}

/// Runs the teardown branches of an execution.
#[derive(Clone)]
pub struct CleanupCoordinator {
    engine: Arc<dyn DatabaseEngine>,
    policy: CleanupPolicy,
}

impl CleanupCoordinator {
    pub fn new(engine: Arc<dyn DatabaseEngine>, policy: CleanupPolicy) -> Self {
        Self { engine, policy }
    }

    /// Run every applicable branch concurrently and report each outcome.
    #[instrument(skip(self, ctx), fields(execution_id = %ctx.execution_id))]
    pub async fn run(&self, ctx: &WorkflowContext) -> CleanupReport {
        let branches = branches_for(ctx);
        let topology = ctx.topology;
        let reports = join_all(
            branches
                .iter()
                .map(|branch| self.run_branch(topology, branch)),
        )
        .await;
        let report = CleanupReport { branches: reports };

        if report.is_complete() {
            info!(branches = report.branches.len(), "Cleanup complete");
        } else {
            let failed: Vec<&str> = report.failures().map(|b| b.resource_id.as_str()).collect();
            warn!(failed = ?failed, "Cleanup partially failed");
        }
        report
    }

    async fn run_branch(&self, topology: Topology, branch: &CleanupBranch) -> BranchReport {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.delete(topology, branch).await {
                Ok(()) => {
                    debug!(branch = %branch.target, resource_id = %branch.resource_id, attempt, "Deleted");
                    return BranchReport {
                        target: branch.target,
                        resource_id: branch.resource_id.clone(),
                        attempts: attempt,
                        outcome: BranchOutcome::Deleted,
                    };
                }
                Err(e) if e.is_not_found() => {
                    debug!(branch = %branch.target, resource_id = %branch.resource_id, "Already absent");
                    return BranchReport {
                        target: branch.target,
                        resource_id: branch.resource_id.clone(),
                        attempts: attempt,
                        outcome: BranchOutcome::Absent,
                    };
                }
                Err(e) => {
                    warn!(
                        branch = %branch.target,
                        resource_id = %branch.resource_id,
                        attempt,
                        error = %e,
                        "Cleanup attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.interval).await;
                    }
                }
            }
        }

        BranchReport {
            target: branch.target,
            resource_id: branch.resource_id.clone(),
            attempts: max_attempts,
            outcome: BranchOutcome::Failed(last_error),
        }
    }

    async fn delete(&self, topology: Topology, branch: &CleanupBranch) -> EngineResult<()> {
        match branch.target {
            CleanupTarget::TempSnapshot | CleanupTarget::EncryptedSnapshot => {
                self.engine
                    .delete_snapshot(topology, &branch.resource_id)
                    .await
            }
            CleanupTarget::TempInstance => {
                self.engine
                    .delete_database(Topology::Instance, &branch.resource_id, true)
                    .await
            }
            CleanupTarget::TempCluster => {
                self.engine
                    .delete_database(Topology::Cluster, &branch.resource_id, true)
                    .await
            }
        }
    }
}
