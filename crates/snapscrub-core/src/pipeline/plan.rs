// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pipeline states and the plan derived from an execution's shape.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::{ExecutionInput, Topology};

/// One state of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Resolve,
    CreateSourceSnapshot,
    WaitSnapshot,
    ReencryptSnapshot,
    WaitReencrypt,
    RestoreDatabase,
    WaitDatabase,
    SetTempPassword,
    WaitPasswordApplied,
    CreateTempInstance,
    WaitInstance,
    FetchClusterEndpoint,
    FetchInstanceEndpoint,
    Sanitize,
    CreateFinalSnapshot,
    WaitFinalSnapshot,
    PruneOld,
    Cleanup,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::CreateSourceSnapshot => "create_source_snapshot",
            Self::WaitSnapshot => "wait_snapshot",
            Self::ReencryptSnapshot => "reencrypt_snapshot",
            Self::WaitReencrypt => "wait_reencrypt",
            Self::RestoreDatabase => "restore_database",
            Self::WaitDatabase => "wait_database",
            Self::SetTempPassword => "set_temp_password",
            Self::WaitPasswordApplied => "wait_password_applied",
            Self::CreateTempInstance => "create_temp_instance",
            Self::WaitInstance => "wait_instance",
            Self::FetchClusterEndpoint => "fetch_cluster_endpoint",
            Self::FetchInstanceEndpoint => "fetch_instance_endpoint",
            Self::Sanitize => "sanitize",
            Self::CreateFinalSnapshot => "create_final_snapshot",
            Self::WaitFinalSnapshot => "wait_final_snapshot",
            Self::PruneOld => "prune_old",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether the state issues a mutating engine call.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::CreateSourceSnapshot
                | Self::ReencryptSnapshot
                | Self::RestoreDatabase
                | Self::SetTempPassword
                | Self::CreateTempInstance
                | Self::CreateFinalSnapshot
        )
    }

    /// Whether the state is a readiness wait.
    pub fn is_wait(&self) -> bool {
        matches!(
            self,
            Self::WaitSnapshot
                | Self::WaitReencrypt
                | Self::WaitDatabase
                | Self::WaitPasswordApplied
                | Self::WaitInstance
                | Self::WaitFinalSnapshot
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered states of a successful execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    states: Vec<PipelineState>,
}

impl PipelinePlan {
    pub fn new(topology: Topology, reencrypt: bool, retention: bool) -> Self {
        use PipelineState::*;

        let mut states = vec![Resolve, CreateSourceSnapshot, WaitSnapshot];
        if reencrypt {
            states.extend([ReencryptSnapshot, WaitReencrypt]);
        }
        states.extend([
            RestoreDatabase,
            WaitDatabase,
            SetTempPassword,
            WaitPasswordApplied,
        ]);
        match topology {
            Topology::Cluster => {
                states.extend([CreateTempInstance, WaitInstance, FetchClusterEndpoint])
            }
            Topology::Instance => states.push(FetchInstanceEndpoint),
        }
        states.extend([Sanitize, CreateFinalSnapshot, WaitFinalSnapshot]);
        if retention {
            states.push(PruneOld);
        }
        states.extend([Cleanup, Done]);
        Self { states }
    }

    /// Plan for an input; re-encryption and retention follow its options.
    pub fn for_input(input: &ExecutionInput) -> Self {
        Self::new(
            input.topology(),
            input.reencrypt_key().is_some(),
            retention_limit(input).is_some(),
        )
    }

    /// Every state, `Resolve` through `Done`.
    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    /// States between `Resolve` and `Cleanup`, exclusive.
    pub fn work_states(&self) -> &[PipelineState] {
        let end = self
            .states
            .iter()
            .position(|s| *s == PipelineState::Cleanup)
            .unwrap_or(self.states.len());
        self.states.get(1..end).unwrap_or_default()
    }

    pub fn contains(&self, state: PipelineState) -> bool {
        self.states.contains(&state)
    }
}

/// Retention limit of an input; zero disables pruning.
pub fn retention_limit(input: &ExecutionInput) -> Option<usize> {
    input.history_limit.filter(|limit| *limit > 0)
}
