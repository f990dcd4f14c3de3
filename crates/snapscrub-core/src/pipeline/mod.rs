// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pipeline sequencing.
//!
//! An execution walks the states of its [`PipelinePlan`] strictly in order.
//! Mutating steps are issued once; only the readiness waits that follow them
//! retry. Whatever happens after resolution, cleanup runs exactly once and
//! never replaces the execution's own verdict.

mod builder;
mod plan;

pub use builder::PipelineBuilder;
pub use plan::{PipelinePlan, PipelineState, retention_limit};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::cleanup::{CleanupCoordinator, CleanupReport};
use crate::config::WorkflowConfig;
use crate::context::{
    EngineFamily, ErrorSummary, ExecutionInput, ExecutionOutput, ExecutionStatus, Topology,
    WorkflowContext,
};
use crate::engine::{
    CopySnapshotRequest, CreateInstanceRequest, DatabaseEngine, ModifyRequest, RestoreRequest,
    final_tags, general_tags,
};
use crate::error::{Result, WorkflowError};
use crate::poller::{ReadinessPoller, ResourceKind, ResourceRef};
use crate::resolver::ParameterResolver;
use crate::retention::{PruneReport, RetentionPruner};
use crate::runner::{RunnerError, ScriptRequest, ScriptRunner};

/// Temporary or final resource created by a mutating step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResource {
    pub state: PipelineState,
    pub kind: ResourceKind,
    pub identifier: String,
}

/// Everything known about one finished execution.
#[derive(Debug)]
pub struct ExecutionReport {
    pub execution_id: Uuid,
    pub topology: Topology,
    /// Engine family, once resolved.
    pub family: Option<EngineFamily>,
    /// Target snapshot identifier, once resolved.
    pub target_snapshot_id: Option<String>,
    /// States entered, in order, ending in `Done` or `Failed`.
    pub visited: Vec<PipelineState>,
    /// Resources created by mutating steps.
    pub created: Vec<CreatedResource>,
    /// State whose failure ended the execution.
    pub failed_at: Option<PipelineState>,
    pub error: Option<WorkflowError>,
    /// Absent only when resolution failed.
    pub cleanup: Option<CleanupReport>,
    /// Present when pruning ran.
    pub prune: Option<Result<PruneReport>>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self) -> ExecutionStatus {
        if self.is_success() {
            ExecutionStatus::Succeeded
        } else {
            ExecutionStatus::Failed
        }
    }

    /// Trigger-facing summary of this execution.
    pub fn output(&self) -> ExecutionOutput {
        ExecutionOutput {
            execution_id: self.execution_id,
            target_snapshot_id: self.target_snapshot_id.clone().unwrap_or_default(),
            is_cluster: self.topology.is_cluster(),
            status: self.status(),
            error: self.error.as_ref().map(ErrorSummary::from),
            cleanup_failures: self
                .cleanup
                .iter()
                .flat_map(|report| report.failures().map(|b| b.resource_id.clone()))
                .collect(),
        }
    }
}

/// Sequencer of one sanitized snapshot execution.
pub struct Pipeline {
    pub(crate) engine: Arc<dyn DatabaseEngine>,
    pub(crate) runner: Arc<dyn ScriptRunner>,
    pub(crate) config: WorkflowConfig,
    pub(crate) resolver: ParameterResolver,
    pub(crate) poller: ReadinessPoller,
    pub(crate) cleanup: CleanupCoordinator,
    pub(crate) pruner: RetentionPruner,
}

impl Pipeline {
    /// Create a new builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run one execution to completion.
    #[instrument(skip(self, input), fields(database_id = %input.database_identifier))]
    pub async fn execute(&self, input: &ExecutionInput) -> ExecutionReport {
        let execution_id = Uuid::new_v4();
        info!(execution_id = %execution_id, topology = %input.topology(), "Starting execution");

        let mut visited = vec![PipelineState::Resolve];
        let mut ctx = match self.resolver.resolve(input, execution_id).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(execution_id = %execution_id, error = %e, "Resolution failed");
                visited.push(PipelineState::Failed);
                return ExecutionReport {
                    execution_id,
                    topology: input.topology(),
                    family: None,
                    target_snapshot_id: None,
                    visited,
                    created: Vec::new(),
                    failed_at: Some(PipelineState::Resolve),
                    error: Some(e),
                    cleanup: None,
                    prune: None,
                };
            }
        };

        let plan = PipelinePlan::new(
            ctx.topology,
            ctx.reencrypts(),
            retention_limit(input).is_some(),
        );
        let mut created = Vec::new();
        let mut failure: Option<(PipelineState, WorkflowError)> = None;
        let mut prune = None;

        for &state in plan.work_states() {
            visited.push(state);
            info!(execution_id = %execution_id, state = %state, "Entering state");

            if state == PipelineState::PruneOld {
                let keep = retention_limit(input).unwrap_or_default();
                prune = Some(self.prune_old(&ctx, keep).await);
                continue;
            }

            if let Err(e) = self.step(state, &mut ctx, input, &mut created).await {
                error!(
                    execution_id = %execution_id,
                    state = %state,
                    code = e.error_code(),
                    error = %e,
                    "State failed"
                );
                failure = Some((state, e));
                break;
            }
        }

        visited.push(PipelineState::Cleanup);
        let cleanup = self.cleanup.run(&ctx).await;

        let (failed_at, error) = match failure {
            Some((state, e)) => (Some(state), Some(e)),
            None => (None, None),
        };
        visited.push(if error.is_none() {
            PipelineState::Done
        } else {
            PipelineState::Failed
        });

        info!(
            execution_id = %execution_id,
            success = error.is_none(),
            target_snapshot_id = %ctx.target_snapshot_id,
            cleanup_complete = cleanup.is_complete(),
            "Execution finished"
        );

        ExecutionReport {
            execution_id,
            topology: ctx.topology,
            family: Some(ctx.family),
            target_snapshot_id: Some(ctx.target_snapshot_id.clone()),
            visited,
            created,
            failed_at,
            error,
            cleanup: Some(cleanup),
            prune,
        }
    }

    async fn step(
        &self,
        state: PipelineState,
        ctx: &mut WorkflowContext,
        input: &ExecutionInput,
        created: &mut Vec<CreatedResource>,
    ) -> Result<()> {
        let topology = ctx.topology;
        let wait = self.config.wait;

        match state {
            PipelineState::CreateSourceSnapshot => {
                self.engine
                    .create_snapshot(
                        topology,
                        &ctx.database_identifier,
                        &ctx.temp_snapshot_id,
                        &general_tags(&ctx.database_identifier),
                    )
                    .await?;
                record(created, state, ResourceKind::Snapshot, &ctx.temp_snapshot_id);
            }
            PipelineState::WaitSnapshot => {
                let resource =
                    ResourceRef::snapshot(topology, &ctx.database_identifier, &ctx.temp_snapshot_id);
                self.poller.wait_until_ready(&resource, wait).await?;
            }
            PipelineState::ReencryptSnapshot => {
                let kms_key_id = ctx
                    .reencrypt_key
                    .clone()
                    .ok_or_else(|| WorkflowError::not_found("re-encryption key"))?;
                self.engine
                    .copy_snapshot(
                        topology,
                        &CopySnapshotRequest {
                            source_snapshot_id: ctx.temp_snapshot_id.clone(),
                            target_snapshot_id: ctx.temp_enc_snapshot_id.clone(),
                            kms_key_id,
                            copy_tags: false,
                            tags: general_tags(&ctx.database_identifier),
                        },
                    )
                    .await?;
                record(created, state, ResourceKind::Snapshot, &ctx.temp_enc_snapshot_id);
            }
            PipelineState::WaitReencrypt => {
                let resource = ResourceRef::snapshot(
                    topology,
                    &ctx.database_identifier,
                    &ctx.temp_enc_snapshot_id,
                );
                self.poller.wait_until_ready(&resource, wait).await?;
            }
            PipelineState::RestoreDatabase => {
                let network = &self.config.network;
                self.engine
                    .restore_from_snapshot(
                        topology,
                        &RestoreRequest {
                            database_id: ctx.temp_db_id.clone(),
                            snapshot_id: ctx.restore_snapshot_id().to_string(),
                            engine: ctx.engine.clone(),
                            instance_class: match topology {
                                Topology::Instance => Some(ctx.temp_db_instance_class.clone()),
                                Topology::Cluster => None,
                            },
                            subnet_group: network.subnet_group.clone(),
                            security_groups: network.security_groups.clone(),
                            publicly_accessible: false,
                            tags: general_tags(&ctx.database_identifier),
                        },
                    )
                    .await?;
                record(created, state, ResourceKind::Database, &ctx.temp_db_id);
            }
            PipelineState::WaitDatabase | PipelineState::WaitPasswordApplied => {
                let resource = ResourceRef::database(topology, &ctx.temp_db_id);
                self.poller.wait_until_ready(&resource, wait).await?;
            }
            PipelineState::SetTempPassword => {
                self.engine
                    .modify_database(
                        topology,
                        &ModifyRequest {
                            database_id: ctx.temp_db_id.clone(),
                            master_password: ctx.credentials.password.clone(),
                            apply_immediately: true,
                            backup_retention_days: match topology {
                                Topology::Instance => Some(0),
                                Topology::Cluster => None,
                            },
                        },
                    )
                    .await?;
            }
            PipelineState::CreateTempInstance => {
                self.engine
                    .create_database_instance(&CreateInstanceRequest {
                        cluster_id: ctx.temp_db_id.clone(),
                        instance_id: ctx.temp_db_instance_id.clone(),
                        instance_class: ctx.temp_db_instance_class.clone(),
                        engine: ctx.engine.clone(),
                        publicly_accessible: false,
                    })
                    .await?;
                record(
                    created,
                    state,
                    ResourceKind::DatabaseInstance,
                    &ctx.temp_db_instance_id,
                );
            }
            PipelineState::WaitInstance => {
                let resource = ResourceRef::instance(&ctx.temp_db_instance_id);
                self.poller.wait_until_ready(&resource, wait).await?;
            }
            PipelineState::FetchClusterEndpoint => {
                let address = self.fetch_endpoint(Topology::Cluster, &ctx.temp_db_id).await?;
                ctx.set_endpoint(address);
            }
            PipelineState::FetchInstanceEndpoint => {
                let address = self
                    .fetch_endpoint(Topology::Instance, &ctx.temp_db_id)
                    .await?;
                ctx.set_endpoint(address);
            }
            PipelineState::Sanitize => self.sanitize(ctx, input).await?,
            PipelineState::CreateFinalSnapshot => {
                self.engine
                    .create_snapshot(
                        topology,
                        &ctx.temp_db_id,
                        &ctx.target_snapshot_id,
                        &final_tags(&ctx.database_identifier),
                    )
                    .await?;
                record(created, state, ResourceKind::Snapshot, &ctx.target_snapshot_id);
            }
            PipelineState::WaitFinalSnapshot => {
                let resource =
                    ResourceRef::snapshot(topology, &ctx.temp_db_id, &ctx.target_snapshot_id);
                self.poller.wait_until_ready(&resource, wait).await?;
            }
            PipelineState::Resolve
            | PipelineState::PruneOld
            | PipelineState::Cleanup
            | PipelineState::Done
            | PipelineState::Failed => {
                warn!(state = %state, "State is not a work step");
            }
        }
        Ok(())
    }

    async fn fetch_endpoint(&self, topology: Topology, database_id: &str) -> Result<String> {
        let found = self
            .engine
            .describe_databases(topology, database_id)
            .await?;
        let [database] = found.as_slice() else {
            return Err(WorkflowError::not_found(format!("{topology} {database_id}")));
        };
        database
            .endpoint
            .clone()
            .filter(|address| !address.is_empty())
            .ok_or_else(|| WorkflowError::not_found(format!("endpoint of {topology} {database_id}")))
    }

    async fn sanitize(&self, ctx: &WorkflowContext, input: &ExecutionInput) -> Result<()> {
        let request = ScriptRequest {
            family: ctx.family,
            endpoint: ctx.endpoint()?.to_string(),
            port: ctx.credentials.port,
            user: ctx.credentials.user.clone(),
            password: ctx.credentials.password.clone(),
            database: ctx.credentials.database.clone(),
            script: input.script.clone(),
            timeout: self.config.script_timeout,
        };
        info!(
            family = %ctx.family,
            runner = self.runner.runner_type(),
            endpoint = %request.endpoint,
            "Running sanitize script"
        );

        match self.runner.run(&request).await {
            Ok(outcome) if outcome.success => {
                info!(duration_ms = outcome.duration_ms, "Sanitize script finished");
                Ok(())
            }
            Ok(outcome) => Err(WorkflowError::ScriptFailed {
                exit_code: outcome.exit_code,
                stderr: outcome.stderr.unwrap_or_default(),
            }),
            Err(RunnerError::ExitCode { exit_code, stderr }) => Err(WorkflowError::ScriptFailed {
                exit_code: Some(exit_code),
                stderr,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn prune_old(&self, ctx: &WorkflowContext, keep: usize) -> Result<PruneReport> {
        let result = self
            .pruner
            .prune(&final_tags(&ctx.database_identifier), ctx.topology, keep)
            .await;
        match &result {
            Ok(report) => info!(
                kept = report.kept.len(),
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "Pruned old sanitized snapshots"
            ),
            Err(e) => warn!(error = %e, "Pruning failed"),
        }
        result
    }
}

fn record(
    created: &mut Vec<CreatedResource>,
    state: PipelineState,
    kind: ResourceKind,
    identifier: &str,
) {
    created.push(CreatedResource {
        state,
        kind,
        identifier: identifier.to_string(),
    });
}
