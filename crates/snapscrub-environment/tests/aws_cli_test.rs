// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AwsCliEngine against a fake `aws` client.

#![cfg(unix)]

mod common;

use std::time::Duration;

use serde_json::json;

use common::FakeCli;
use snapscrub_core::Topology;
use snapscrub_core::engine::{
    CreateInstanceRequest, DatabaseEngine, EngineError, ModifyRequest, RestoreRequest, TagIndex, final_tags, general_tags,
};
use snapscrub_environment::engine::{AwsCliConfig, AwsCliEngine};

fn engine(cli: &FakeCli) -> AwsCliEngine {
    AwsCliEngine::new(AwsCliConfig::new(cli.program(), cli.args()).with_region("eu-west-1"))
}

#[tokio::test]
async fn test_describe_cluster() {
    let cli = FakeCli::responding(
        r#"{"DBClusters": [{
            "DBClusterIdentifier": "orders",
            "Status": "available",
            "Engine": "aurora-mysql",
            "Port": 3306,
            "MasterUsername": "admin",
            "DatabaseName": "orders",
            "DBClusterMembers": [{"DBInstanceIdentifier": "orders-writer"}],
            "Endpoint": "orders.cluster-abc.eu-west-1.rds.amazonaws.com"
        }]}"#,
    );

    let found = engine(&cli)
        .describe_databases(Topology::Cluster, "orders")
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].engine, "aurora-mysql");
    assert_eq!(found[0].members, vec!["orders-writer"]);
    assert_eq!(
        cli.recorded_args(),
        vec![
            "rds",
            "describe-db-clusters",
            "--cli-input-json",
            "file:///dev/stdin",
            "--output",
            "json",
            "--region",
            "eu-west-1",
        ]
    );
    assert_eq!(cli.recorded_request(), json!({"DBClusterIdentifier": "orders"}));
}

#[tokio::test]
async fn test_describe_missing_resources_is_empty() {
    let cli = FakeCli::service_error("DBInstanceNotFound");
    let engine = engine(&cli);

    assert!(
        engine
            .describe_databases(Topology::Instance, "gone")
            .await
            .unwrap()
            .is_empty()
    );

    let cli = FakeCli::service_error("DBClusterSnapshotNotFoundFault");
    let engine = AwsCliEngine::new(AwsCliConfig::new(cli.program(), cli.args()));
    assert!(
        engine
            .describe_snapshots(Topology::Cluster, None, "gone")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_delete_missing_snapshot_is_not_found() {
    let cli = FakeCli::service_error("DBSnapshotNotFound");

    let err = engine(&cli)
        .delete_snapshot(Topology::Instance, "billing-202401010000")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::NotFound { ref operation, ref resource }
            if operation == "delete-db-snapshot" && resource == "billing-202401010000"
    ));
    assert_eq!(
        cli.recorded_request(),
        json!({"DBSnapshotIdentifier": "billing-202401010000"})
    );
}

#[tokio::test]
async fn test_service_error_is_rejected() {
    let cli = FakeCli::service_error("InvalidDBClusterStateFault");

    let err = engine(&cli)
        .delete_database(Topology::Cluster, "sanitize-1", true)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Rejected { ref message, .. } if message.contains("InvalidDBClusterStateFault")));
    assert_eq!(
        cli.recorded_request(),
        json!({"DBClusterIdentifier": "sanitize-1", "SkipFinalSnapshot": true})
    );
}

#[tokio::test]
async fn test_password_only_on_stdin() {
    let cli = FakeCli::responding(r#"{"DBInstance": {}}"#);

    engine(&cli)
        .modify_database(
            Topology::Instance,
            &ModifyRequest {
                database_id: "sanitize-1".into(),
                master_password: "temporary-secret-value".into(),
                apply_immediately: true,
                backup_retention_days: None,
            },
        )
        .await
        .unwrap();

    assert!(
        cli.recorded_args()
            .iter()
            .all(|arg| !arg.contains("temporary-secret-value"))
    );
    assert_eq!(
        cli.recorded_request(),
        json!({
            "DBInstanceIdentifier": "sanitize-1",
            "MasterUserPassword": "temporary-secret-value",
            "ApplyImmediately": true,
        })
    );
}

#[tokio::test]
async fn test_restore_instance_omits_unset_placement() {
    let cli = FakeCli::responding("{}");

    engine(&cli)
        .restore_from_snapshot(
            Topology::Instance,
            &RestoreRequest {
                database_id: "sanitize-1".into(),
                snapshot_id: "sanitize-snap".into(),
                engine: "postgres".into(),
                instance_class: Some("db.t3.medium".into()),
                subnet_group: None,
                security_groups: Vec::new(),
                publicly_accessible: false,
                tags: general_tags("billing"),
            },
        )
        .await
        .unwrap();

    assert_eq!(cli.recorded_args()[1], "restore-db-instance-from-db-snapshot");
    assert_eq!(
        cli.recorded_request(),
        json!({
            "DBInstanceIdentifier": "sanitize-1",
            "DBSnapshotIdentifier": "sanitize-snap",
            "Engine": "postgres",
            "DBInstanceClass": "db.t3.medium",
            "PubliclyAccessible": false,
            "Tags": [{"Key": "RDS-sanitized-snapshots", "Value": "billing"}],
        })
    );
}

#[tokio::test]
async fn test_restore_cluster_is_not_publicly_accessible() {
    let cli = FakeCli::responding("{}");

    engine(&cli)
        .restore_from_snapshot(
            Topology::Cluster,
            &RestoreRequest {
                database_id: "sanitize-1".into(),
                snapshot_id: "sanitize-snap".into(),
                engine: "aurora-postgresql".into(),
                instance_class: None,
                subnet_group: Some("isolated".into()),
                security_groups: vec!["sg-1".into()],
                publicly_accessible: false,
                tags: general_tags("billing"),
            },
        )
        .await
        .unwrap();

    assert_eq!(cli.recorded_args()[1], "restore-db-cluster-from-snapshot");
    assert_eq!(
        cli.recorded_request(),
        json!({
            "DBClusterIdentifier": "sanitize-1",
            "SnapshotIdentifier": "sanitize-snap",
            "Engine": "aurora-postgresql",
            "DBSubnetGroupName": "isolated",
            "VpcSecurityGroupIds": ["sg-1"],
            "PubliclyAccessible": false,
            "Tags": [{"Key": "RDS-sanitized-snapshots", "Value": "billing"}],
        })
    );
}

#[tokio::test]
async fn test_create_cluster_instance_is_not_publicly_accessible() {
    let cli = FakeCli::responding("{}");

    engine(&cli)
        .create_database_instance(&CreateInstanceRequest {
            cluster_id: "sanitize-1".into(),
            instance_id: "sanitize-1-instance".into(),
            instance_class: "db.r6g.large".into(),
            engine: "aurora-postgresql".into(),
            publicly_accessible: false,
        })
        .await
        .unwrap();

    assert_eq!(cli.recorded_args()[1], "create-db-instance");
    assert_eq!(
        cli.recorded_request(),
        json!({
            "DBInstanceIdentifier": "sanitize-1-instance",
            "DBClusterIdentifier": "sanitize-1",
            "DBInstanceClass": "db.r6g.large",
            "Engine": "aurora-postgresql",
            "PubliclyAccessible": false,
        })
    );
}

#[tokio::test]
async fn test_list_snapshots_passes_marker() {
    let cli = FakeCli::responding(
        r#"{"DBSnapshots": [
            {"DBSnapshotIdentifier": "a", "Status": "available", "SnapshotCreateTime": "2024-01-03T00:00:00+00:00"},
            {"DBSnapshotIdentifier": "b", "Status": "creating"}
        ], "Marker": "page-3"}"#,
    );

    let page = engine(&cli)
        .list_snapshots(Topology::Instance, "billing", Some("page-2"))
        .await
        .unwrap();

    assert_eq!(page.snapshots.len(), 2);
    assert!(page.snapshots[1].created_at.is_none());
    assert_eq!(page.marker.as_deref(), Some("page-3"));
    assert!(cli.recorded_args().contains(&"--no-paginate".to_string()));
    assert_eq!(
        cli.recorded_request(),
        json!({"DBInstanceIdentifier": "billing", "Marker": "page-2"})
    );
}

#[tokio::test]
async fn test_list_resources_by_tags() {
    let cli = FakeCli::responding(
        r#"{"ResourceTagMappingList": [
            {"ResourceARN": "arn:aws:rds:eu-west-1:1:cluster-snapshot:orders-202401010000", "Tags": []}
        ]}"#,
    );

    let arns = engine(&cli)
        .list_resources(&final_tags("orders"), "rds:cluster-snapshot")
        .await
        .unwrap();

    assert_eq!(
        arns,
        vec!["arn:aws:rds:eu-west-1:1:cluster-snapshot:orders-202401010000"]
    );
    let args = cli.recorded_args();
    assert_eq!(&args[..2], ["resourcegroupstaggingapi", "get-resources"]);
    assert!(!args.contains(&"--no-paginate".to_string()));
    assert_eq!(
        cli.recorded_request(),
        json!({
            "TagFilters": [
                {"Key": "RDS-sanitized-snapshots", "Values": ["orders"]},
                {"Key": "Final", "Values": ["true"]},
            ],
            "ResourceTypeFilters": ["rds:cluster-snapshot"],
        })
    );
}

#[tokio::test]
async fn test_unparseable_output_is_malformed() {
    let cli = FakeCli::new("echo 'not json'");

    let err = engine(&cli)
        .describe_databases(Topology::Instance, "billing")
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Malformed { .. }));
}

#[tokio::test]
async fn test_missing_client_is_transport_error() {
    let engine = AwsCliEngine::new(AwsCliConfig::new("/nonexistent/aws", Vec::new()));

    let err = engine
        .describe_databases(Topology::Instance, "billing")
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Transport { .. }));
}

#[tokio::test]
async fn test_hung_client_times_out() {
    let cli = FakeCli::new("sleep 5");
    let engine = AwsCliEngine::new(
        AwsCliConfig::new(cli.program(), cli.args()).with_call_timeout(Duration::from_millis(200)),
    );

    let err = engine
        .create_snapshot(Topology::Cluster, "orders", "sanitize-1", &general_tags("orders"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Transport { ref details, .. } if details.contains("timed out")));
}
