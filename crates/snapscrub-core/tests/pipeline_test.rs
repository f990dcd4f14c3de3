// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end pipeline executions against the in-memory engine.

mod common;

use chrono::{TimeZone, Utc};

use common::*;
use snapscrub_core::cleanup::{BranchOutcome, CleanupTarget};
use snapscrub_core::context::ExecutionStatus;
use snapscrub_core::engine::{EngineOp, MemoryCollection, MemoryEngine, final_tags};
use snapscrub_core::runner::MockRunner;
use snapscrub_core::{
    EngineFamily, ExecutionInput, PipelinePlan, PipelineState, Topology, WorkflowError,
};

const SCRIPT: &str = "update users set email = null";

#[tokio::test(start_paused = true)]
async fn test_cluster_postgres_with_retention() {
    let engine = MemoryEngine::new();
    seed_source(&engine, Topology::Cluster, "aurora-postgresql13").await;
    for (id, month) in [
        ("orders-202301010000", 1),
        ("orders-202302010000", 2),
        ("orders-202303010000", 3),
    ] {
        engine
            .add_snapshot(
                Topology::Cluster,
                CLUSTER_ID,
                id,
                final_tags(CLUSTER_ID),
                Utc.with_ymd_and_hms(2023, month, 1, 0, 0, 0).unwrap(),
            )
            .await;
    }
    let h = Harness::new(engine, MockRunner::new());

    let input = ExecutionInput::new(CLUSTER_ID, Topology::Cluster, SCRIPT).with_history_limit(2);
    let report = h.pipeline.execute(&input).await;

    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(report.family, Some(EngineFamily::Postgres));
    assert_eq!(
        report.visited,
        PipelinePlan::new(Topology::Cluster, false, true).states()
    );
    let target = report.target_snapshot_id.clone().unwrap();

    let requests = h.runner.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].family, EngineFamily::Postgres);
    assert!(requests[0].endpoint.ends_with(".cluster-memory.local"));
    assert_eq!(requests[0].port, 5432);
    assert_eq!(requests[0].user, "admin");
    assert_eq!(requests[0].database, "orders");
    assert_eq!(requests[0].script, SCRIPT);
    assert!(requests[0].has_password);

    let prune = report.prune.as_ref().unwrap().as_ref().unwrap();
    assert_eq!(prune.deleted, vec!["orders-202301010000", "orders-202302010000"]);
    assert_eq!(prune.kept, vec!["orders-202303010000".to_string(), target.clone()]);
    assert!(prune.failed.is_empty());

    let cleanup = report.cleanup.as_ref().unwrap();
    assert!(cleanup.is_complete());
    assert!(cleanup.branch(CleanupTarget::EncryptedSnapshot).is_none());
    for target in [
        CleanupTarget::TempSnapshot,
        CleanupTarget::TempInstance,
        CleanupTarget::TempCluster,
    ] {
        assert_eq!(cleanup.branch(target).unwrap().outcome, BranchOutcome::Deleted);
    }

    // Only the source, its writer, the newest old snapshot and the target remain.
    assert_eq!(
        h.engine.snapshot_ids(Topology::Cluster).await,
        vec!["orders-202303010000".to_string(), target.clone()]
    );
    assert_eq!(h.engine.database_ids(Topology::Cluster).await, vec![CLUSTER_ID]);
    assert_eq!(h.engine.database_ids(Topology::Instance).await, vec![WRITER_ID]);

    let tags = h
        .engine
        .snapshot_tags(Topology::Cluster, &target)
        .await
        .unwrap();
    assert_eq!(tags, final_tags(CLUSTER_ID));

    let output = report.output();
    assert_eq!(output.status, ExecutionStatus::Succeeded);
    assert_eq!(output.target_snapshot_id, target);
    assert!(output.is_cluster);
    assert!(output.error.is_none());
    assert!(output.cleanup_failures.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_state_subset_per_topology_and_family() {
    let cases = [
        (Topology::Instance, "mysql", EngineFamily::Mysql),
        (Topology::Instance, "postgres", EngineFamily::Postgres),
        (Topology::Cluster, "aurora-mysql", EngineFamily::Mysql),
        (Topology::Cluster, "aurora-postgresql", EngineFamily::Postgres),
        (Topology::Instance, "mariadb", EngineFamily::Mysql),
    ];

    for (topology, engine_name, family) in cases {
        let engine = MemoryEngine::new();
        let source = seed_source(&engine, topology, engine_name).await;
        let h = Harness::new(engine, MockRunner::new());

        let input = ExecutionInput::new(source, topology, SCRIPT);
        let report = h.pipeline.execute(&input).await;

        assert!(report.is_success(), "{engine_name}: {:?}", report.error);
        assert_eq!(
            report.visited,
            PipelinePlan::new(topology, false, false).states(),
            "{engine_name}"
        );
        assert_eq!(h.runner.requests().await[0].family, family);

        let instance_creates = h
            .engine
            .calls_for(EngineOp::CreateDatabaseInstance)
            .await
            .len();
        assert_eq!(instance_creates, usize::from(topology.is_cluster()));
        assert!(h.engine.calls_for(EngineOp::CopySnapshot).await.is_empty());
        assert!(h.engine.calls_for(EngineOp::ListResources).await.is_empty());

        // Exactly one mutating call per create step, plus cleanup deletes.
        let restores = h.engine.calls_for(EngineOp::RestoreFromSnapshot).await;
        assert_eq!(restores.len(), 1);
        assert_eq!(restores[0].topology, Some(topology));
    }
}

#[tokio::test(start_paused = true)]
async fn test_instance_runs_against_instance_endpoint() {
    let engine = MemoryEngine::new();
    seed_source(&engine, Topology::Instance, "mysql").await;
    let h = Harness::new(engine, MockRunner::new());

    let input = ExecutionInput::new(INSTANCE_ID, Topology::Instance, SCRIPT);
    let report = h.pipeline.execute(&input).await;

    assert!(report.is_success());
    let request = &h.runner.requests().await[0];
    assert!(request.endpoint.ends_with(".memory.local"));
    assert!(!request.endpoint.contains("cluster"));
    assert_eq!(request.port, 3306);
    assert_eq!(request.database, "root");

    let cleanup = report.cleanup.unwrap();
    assert_eq!(cleanup.branches.len(), 2);
    assert!(cleanup.branch(CleanupTarget::TempCluster).is_none());
    assert_eq!(h.engine.database_ids(Topology::Instance).await, vec![INSTANCE_ID]);
    assert_eq!(h.engine.snapshot_ids(Topology::Instance).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reencrypt_restores_from_encrypted_copy() {
    let engine = MemoryEngine::new();
    seed_source(&engine, Topology::Cluster, "aurora-mysql").await;
    let h = Harness::new(engine, MockRunner::new());

    let input = ExecutionInput::new(CLUSTER_ID, Topology::Cluster, SCRIPT)
        .with_database_key(SOURCE_KEY)
        .with_snapshot_key("arn:aws:kms:eu-west-1:123456789012:key/shared");
    let report = h.pipeline.execute(&input).await;

    assert!(report.is_success(), "{:?}", report.error);
    assert!(report.visited.contains(&PipelineState::ReencryptSnapshot));
    assert!(report.visited.contains(&PipelineState::WaitReencrypt));

    let copies = h.engine.calls_for(EngineOp::CopySnapshot).await;
    assert_eq!(copies.len(), 1);
    assert!(copies[0].resource_id.starts_with("sanitize-enc-"));

    let cleanup = report.cleanup.unwrap();
    assert_eq!(cleanup.branches.len(), 4);
    assert_eq!(
        cleanup.branch(CleanupTarget::EncryptedSnapshot).unwrap().outcome,
        BranchOutcome::Deleted
    );
    let remaining = h.engine.snapshot_ids(Topology::Cluster).await;
    assert_eq!(remaining, vec![report.target_snapshot_id.unwrap()]);
}

#[tokio::test(start_paused = true)]
async fn test_resolve_failure_skips_cleanup() {
    let engine = MemoryEngine::new();
    seed_source(&engine, Topology::Cluster, "aurora-postgresql").await;
    let h = Harness::new(engine, MockRunner::new());

    let input = ExecutionInput::new(CLUSTER_ID, Topology::Cluster, SCRIPT)
        .with_temp_prefix("p".repeat(42));
    let report = h.pipeline.execute(&input).await;

    assert_eq!(report.visited, vec![PipelineState::Resolve, PipelineState::Failed]);
    assert_eq!(report.failed_at, Some(PipelineState::Resolve));
    assert!(report.cleanup.is_none());
    assert!(matches!(
        report.error,
        Some(WorkflowError::InvalidIdentifier {
            field: "temp_db_instance_id",
            ..
        })
    ));
    let calls = h.engine.calls().await;
    assert!(calls.iter().all(|c| !c.op.is_mutating()), "{calls:?}");

    let output = report.output();
    assert_eq!(output.status, ExecutionStatus::Failed);
    assert_eq!(output.error.unwrap().code, "INVALID_IDENTIFIER");
    assert!(output.target_snapshot_id.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_never_ready_times_out_and_cleans_up() {
    let engine = MemoryEngine::new().with_settle_polls(u32::MAX);
    seed_source(&engine, Topology::Cluster, "aurora-mysql").await;
    let h = Harness::new(engine, MockRunner::new());

    let input = ExecutionInput::new(CLUSTER_ID, Topology::Cluster, SCRIPT);
    let report = h.pipeline.execute(&input).await;

    assert_eq!(report.failed_at, Some(PipelineState::WaitSnapshot));
    assert!(matches!(
        report.error,
        Some(WorkflowError::WaitTimeout { attempts: 300, .. })
    ));
    assert_eq!(
        h.engine.calls_for(EngineOp::DescribeSnapshots).await.len(),
        300
    );
    assert_eq!(
        report.visited.last().copied(),
        Some(PipelineState::Failed)
    );

    let cleanup = report.cleanup.unwrap();
    assert!(cleanup.is_complete());
    assert_eq!(
        cleanup.branch(CleanupTarget::TempSnapshot).unwrap().outcome,
        BranchOutcome::Deleted
    );
    assert_eq!(
        cleanup.branch(CleanupTarget::TempCluster).unwrap().outcome,
        BranchOutcome::Absent
    );
    assert!(h.engine.snapshot_ids(Topology::Cluster).await.is_empty());
    assert!(h.runner.requests().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_poll_transport_error_is_not_retried() {
    let engine = MemoryEngine::new();
    seed_source(&engine, Topology::Instance, "postgres").await;
    engine
        .fail_operation(EngineOp::DescribeSnapshots, "sanitize-")
        .await;
    let h = Harness::new(engine, MockRunner::new());

    let input = ExecutionInput::new(INSTANCE_ID, Topology::Instance, SCRIPT);
    let report = h.pipeline.execute(&input).await;

    assert_eq!(report.failed_at, Some(PipelineState::WaitSnapshot));
    assert!(matches!(report.error, Some(WorkflowError::Engine { .. })));
    assert_eq!(
        h.engine.calls_for(EngineOp::DescribeSnapshots).await.len(),
        1
    );
    assert!(report.cleanup.unwrap().is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_prune_without_matches_does_not_fail_execution() {
    let engine = MemoryEngine::new();
    seed_source(&engine, Topology::Instance, "mysql").await;
    engine.fail_operation(EngineOp::ListResources, "").await;
    let h = Harness::new(engine, MockRunner::new());

    let input =
        ExecutionInput::new(INSTANCE_ID, Topology::Instance, SCRIPT).with_history_limit(3);
    let report = h.pipeline.execute(&input).await;

    assert!(report.is_success());
    assert!(matches!(report.prune, Some(Err(_))));
    assert_eq!(report.visited.last().copied(), Some(PipelineState::Done));
}

/// How a test makes one state fail.
#[derive(Debug, Clone, Copy)]
enum Injection {
    Fail(EngineOp, &'static str),
    Status(MemoryCollection, &'static str, &'static str),
    HoldModifications(&'static str),
    WithholdEndpoint(&'static str),
    ScriptFails,
}

impl Injection {
    async fn apply(self, engine: &MemoryEngine) {
        match self {
            Self::Fail(op, prefix) => engine.fail_operation(op, prefix).await,
            Self::Status(collection, prefix, status) => {
                engine.force_status(collection, prefix, status).await
            }
            Self::HoldModifications(prefix) => engine.hold_pending_modifications(prefix).await,
            Self::WithholdEndpoint(prefix) => engine.withhold_endpoint(prefix).await,
            Self::ScriptFails => {}
        }
    }

    fn runner(self) -> MockRunner {
        match self {
            Self::ScriptFails => MockRunner::failing(),
            _ => MockRunner::new(),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_failure_at_each_state_cleans_up_once() {
    use Injection::*;
    use MemoryCollection::*;
    use PipelineState::*;

    let cases = [
        (CreateSourceSnapshot, Fail(EngineOp::CreateSnapshot, "tmp-")),
        (WaitSnapshot, Status(ClusterSnapshots, "tmp-", "failed")),
        (ReencryptSnapshot, Fail(EngineOp::CopySnapshot, "tmp-enc-")),
        (
            WaitReencrypt,
            Status(ClusterSnapshots, "tmp-enc-", "inaccessible-encryption-credentials"),
        ),
        (RestoreDatabase, Fail(EngineOp::RestoreFromSnapshot, "tmp-")),
        (WaitDatabase, Status(Clusters, "tmp-", "incompatible-restore")),
        (SetTempPassword, Fail(EngineOp::ModifyDatabase, "tmp-")),
        (WaitPasswordApplied, HoldModifications("tmp-")),
        (CreateTempInstance, Fail(EngineOp::CreateDatabaseInstance, "tmp-inst-")),
        (WaitInstance, Status(Instances, "tmp-inst-", "failed")),
        (FetchClusterEndpoint, WithholdEndpoint("tmp-")),
        (Sanitize, ScriptFails),
        (CreateFinalSnapshot, Fail(EngineOp::CreateSnapshot, "final-")),
        (WaitFinalSnapshot, Status(ClusterSnapshots, "final-", "failed")),
    ];

    for (state, injection) in cases {
        let engine = MemoryEngine::new();
        seed_source(&engine, Topology::Cluster, "aurora-postgresql").await;
        injection.apply(&engine).await;
        let h = Harness::new(engine, injection.runner());

        let input = ExecutionInput::new(CLUSTER_ID, Topology::Cluster, SCRIPT)
            .with_snapshot_key("alias/shared")
            .with_temp_prefix("tmp")
            .with_snapshot_prefix("final");
        let report = h.pipeline.execute(&input).await;

        assert_eq!(report.failed_at, Some(state), "{injection:?}");
        assert!(report.error.is_some());
        let tail = &report.visited[report.visited.len() - 3..];
        assert_eq!(tail, &[state, Cleanup, Failed], "{state}");
        assert_eq!(
            report.visited.iter().filter(|s| **s == Cleanup).count(),
            1,
            "{state}"
        );

        let cleanup = report.cleanup.as_ref().unwrap();
        let targets: Vec<CleanupTarget> = cleanup.branches.iter().map(|b| b.target).collect();
        assert_eq!(
            targets,
            vec![
                CleanupTarget::TempSnapshot,
                CleanupTarget::EncryptedSnapshot,
                CleanupTarget::TempInstance,
                CleanupTarget::TempCluster,
            ],
            "{state}"
        );
        assert!(cleanup.is_complete(), "{state}: {cleanup:?}");
        assert!(cleanup.branches.iter().all(|b| b.attempts >= 1));

        // No temporary resource survives.
        let leftovers: Vec<String> = h
            .engine
            .snapshot_ids(Topology::Cluster)
            .await
            .into_iter()
            .chain(h.engine.database_ids(Topology::Cluster).await)
            .chain(h.engine.database_ids(Topology::Instance).await)
            .filter(|id| id.starts_with("tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "{state}: {leftovers:?}");

        let ran_script = !h.runner.requests().await.is_empty();
        assert_eq!(
            ran_script,
            matches!(state, Sanitize | CreateFinalSnapshot | WaitFinalSnapshot),
            "{state}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_script_failure_reports_exit_code() {
    let engine = MemoryEngine::new();
    seed_source(&engine, Topology::Instance, "postgres").await;
    let h = Harness::new(engine, MockRunner::failing());

    let input = ExecutionInput::new(INSTANCE_ID, Topology::Instance, SCRIPT);
    let report = h.pipeline.execute(&input).await;

    match report.error {
        Some(WorkflowError::ScriptFailed { exit_code, ref stderr }) => {
            assert_eq!(exit_code, Some(1));
            assert_eq!(stderr, "Mock failure");
        }
        ref other => panic!("expected ScriptFailed, got {other:?}"),
    }
    assert!(h.engine.calls_for(EngineOp::CreateSnapshot).await.len() == 1);
}

#[tokio::test(start_paused = true)]
async fn test_instance_endpoint_missing_fails_before_script() {
    let engine = MemoryEngine::new();
    seed_source(&engine, Topology::Instance, "mysql").await;
    engine.withhold_endpoint("sanitize-").await;
    let h = Harness::new(engine, MockRunner::new());

    let input = ExecutionInput::new(INSTANCE_ID, Topology::Instance, SCRIPT);
    let report = h.pipeline.execute(&input).await;

    assert_eq!(report.failed_at, Some(PipelineState::FetchInstanceEndpoint));
    assert!(h.runner.requests().await.is_empty());
    assert!(report.cleanup.unwrap().is_complete());
}
