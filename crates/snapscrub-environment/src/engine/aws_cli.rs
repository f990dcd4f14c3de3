// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database engine backed by the `aws` command line client.
//!
//! Every call spawns `aws <service> <operation> --cli-input-json file:///dev/stdin`
//! and writes the request document to the child's stdin, so credentials such
//! as the temporary master password never show up in the process table.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use snapscrub_core::Topology;
use snapscrub_core::engine::{
    CopySnapshotRequest, CreateInstanceRequest, DatabaseEngine, DatabaseInfo, EngineError,
    EngineResult, ModifyRequest, RestoreRequest, SnapshotInfo, SnapshotPage, Tag, TagIndex,
};

use super::wire::{
    ClusterSnapshotsResponse, ClustersResponse, InstanceSnapshotsResponse, InstancesResponse,
    ResourcesResponse, wire_tags, without_nulls,
};
use crate::config::optional_var;

const RDS: &str = "rds";
const TAGGING: &str = "resourcegroupstaggingapi";

/// aws CLI invocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCliConfig {
    /// Executable to spawn.
    pub program: String,
    /// Arguments placed before the service name (e.g. `--profile prod`).
    pub args: Vec<String>,
    /// Region passed with `--region`; the CLI default applies when unset.
    pub region: Option<String>,
    /// Upper bound for a single call.
    pub call_timeout: Duration,
}

impl Default for AwsCliConfig {
    fn default() -> Self {
        Self {
            program: "aws".to_string(),
            args: Vec::new(),
            region: None,
            call_timeout: Duration::from_secs(300),
        }
    }
}

impl AwsCliConfig {
    /// Spawn `program` with `args` in front of every call.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Default::default()
        }
    }

    /// Load from environment variables.
    ///
    /// - `SNAPSCRUB_AWS_CLI`: command line of the client, split on whitespace (default: `aws`)
    /// - `AWS_REGION`: region of every call
    /// - `SNAPSCRUB_AWS_TIMEOUT_SECS`: per-call timeout (default: 300)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(command) = optional_var("SNAPSCRUB_AWS_CLI") {
            let mut parts = command.split_whitespace().map(str::to_string);
            if let Some(program) = parts.next() {
                config.program = program;
                config.args = parts.collect();
            }
        }
        config.region = optional_var("AWS_REGION");
        if let Some(secs) = optional_var("SNAPSCRUB_AWS_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            config.call_timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Full argument list for one call.
    fn command_args(&self, service: &str, operation: &str, paginate: bool) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(
            [
                service,
                operation,
                "--cli-input-json",
                "file:///dev/stdin",
                "--output",
                "json",
            ]
            .map(str::to_string),
        );
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        if !paginate {
            args.push("--no-paginate".to_string());
        }
        args
    }
}

/// Extract the service error code from CLI stderr.
///
/// The CLI reports service errors as
/// `An error occurred (DBClusterNotFoundFault) when calling ...`.
fn error_code(stderr: &str) -> Option<&str> {
    let start = stderr.find("An error occurred (")? + "An error occurred (".len();
    let len = stderr[start..].find(')')?;
    Some(&stderr[start..start + len])
}

/// Map a failed CLI call to an engine error.
fn classify_failure(operation: &str, resource: &str, stderr: &str) -> EngineError {
    let message = stderr.trim().to_string();
    match error_code(&message) {
        Some(code) if code.contains("NotFound") => EngineError::NotFound {
            operation: operation.to_string(),
            resource: resource.to_string(),
        },
        Some(_) => EngineError::Rejected {
            operation: operation.to_string(),
            message,
        },
        None => EngineError::Transport {
            operation: operation.to_string(),
            details: message,
        },
    }
}

fn transport(operation: &str, details: impl ToString) -> EngineError {
    EngineError::Transport {
        operation: operation.to_string(),
        details: details.to_string(),
    }
}

fn malformed(operation: &str, details: impl ToString) -> EngineError {
    EngineError::Malformed {
        operation: operation.to_string(),
        details: details.to_string(),
    }
}

/// Describe calls report a missing resource as an empty result.
fn empty_if_not_found<T: Default>(result: EngineResult<T>) -> EngineResult<T> {
    match result {
        Err(err) if err.is_not_found() => Ok(T::default()),
        other => other,
    }
}

/// [`DatabaseEngine`] and [`TagIndex`] over the aws CLI.
pub struct AwsCliEngine {
    config: AwsCliConfig,
}

impl AwsCliEngine {
    pub fn new(config: AwsCliConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AwsCliConfig {
        &self.config
    }

    /// Run one CLI call and return its JSON output (`null` when empty).
    #[instrument(skip(self, input), fields(program = %self.config.program))]
    async fn call(
        &self,
        service: &str,
        operation: &str,
        resource: &str,
        input: Value,
        paginate: bool,
    ) -> EngineResult<Value> {
        let payload = serde_json::to_vec(&without_nulls(input))
            .map_err(|e| malformed(operation, format!("request encoding: {e}")))?;

        let mut child = Command::new(&self.config.program)
            .args(self.config.command_args(service, operation, paginate))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| transport(operation, format!("failed to spawn {}: {e}", self.config.program)))?;

        // A client that exits without reading its input closes the pipe early.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(&payload).await {
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            Ok(())
        };
        let exchange = async { tokio::join!(feed, child.wait_with_output()) };

        let (fed, output) = tokio::time::timeout(self.config.call_timeout, exchange)
            .await
            .map_err(|_| {
                warn!(operation, resource, "aws CLI call timed out");
                transport(
                    operation,
                    format!("timed out after {:?}", self.config.call_timeout),
                )
            })?;
        let output = output.map_err(|e| transport(operation, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let err = classify_failure(operation, resource, &stderr);
            debug!(operation, resource, exit_code = ?output.status.code(), error = %err, "aws CLI call failed");
            return Err(err);
        }
        fed.map_err(|e| transport(operation, format!("writing request: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&stdout).map_err(|e| malformed(operation, e))
    }

    async fn call_parsed<T: DeserializeOwned>(
        &self,
        service: &str,
        operation: &str,
        resource: &str,
        input: Value,
        paginate: bool,
    ) -> EngineResult<T> {
        let value = self.call(service, operation, resource, input, paginate).await?;
        serde_json::from_value(value).map_err(|e| malformed(operation, e))
    }

    async fn snapshots(
        &self,
        topology: Topology,
        input: Value,
        resource: &str,
    ) -> EngineResult<SnapshotPage> {
        let page = match topology {
            Topology::Cluster => {
                let response: ClusterSnapshotsResponse = self
                    .call_parsed(RDS, "describe-db-cluster-snapshots", resource, input, false)
                    .await?;
                SnapshotPage {
                    snapshots: response.snapshots.into_iter().map(Into::into).collect(),
                    marker: response.marker,
                }
            }
            Topology::Instance => {
                let response: InstanceSnapshotsResponse = self
                    .call_parsed(RDS, "describe-db-snapshots", resource, input, false)
                    .await?;
                SnapshotPage {
                    snapshots: response.snapshots.into_iter().map(Into::into).collect(),
                    marker: response.marker,
                }
            }
        };
        Ok(page)
    }
}

#[async_trait]
impl DatabaseEngine for AwsCliEngine {
    async fn create_snapshot(
        &self,
        topology: Topology,
        parent_id: &str,
        snapshot_id: &str,
        tags: &[Tag],
    ) -> EngineResult<()> {
        let (operation, input) = match topology {
            Topology::Cluster => (
                "create-db-cluster-snapshot",
                json!({
                    "DBClusterSnapshotIdentifier": snapshot_id,
                    "DBClusterIdentifier": parent_id,
                    "Tags": wire_tags(tags),
                }),
            ),
            Topology::Instance => (
                "create-db-snapshot",
                json!({
                    "DBSnapshotIdentifier": snapshot_id,
                    "DBInstanceIdentifier": parent_id,
                    "Tags": wire_tags(tags),
                }),
            ),
        };
        self.call(RDS, operation, snapshot_id, input, true).await?;
        Ok(())
    }

    async fn describe_snapshots(
        &self,
        topology: Topology,
        parent_id: Option<&str>,
        snapshot_id: &str,
    ) -> EngineResult<Vec<SnapshotInfo>> {
        let input = match topology {
            Topology::Cluster => json!({
                "DBClusterIdentifier": parent_id,
                "DBClusterSnapshotIdentifier": snapshot_id,
            }),
            Topology::Instance => json!({
                "DBInstanceIdentifier": parent_id,
                "DBSnapshotIdentifier": snapshot_id,
            }),
        };
        let page = empty_if_not_found(self.snapshots(topology, input, snapshot_id).await)?;
        Ok(page.snapshots)
    }

    async fn list_snapshots(
        &self,
        topology: Topology,
        parent_id: &str,
        marker: Option<&str>,
    ) -> EngineResult<SnapshotPage> {
        let input = match topology {
            Topology::Cluster => json!({ "DBClusterIdentifier": parent_id, "Marker": marker }),
            Topology::Instance => json!({ "DBInstanceIdentifier": parent_id, "Marker": marker }),
        };
        empty_if_not_found(self.snapshots(topology, input, parent_id).await)
    }

    async fn copy_snapshot(
        &self,
        topology: Topology,
        request: &CopySnapshotRequest,
    ) -> EngineResult<()> {
        let (operation, input) = match topology {
            Topology::Cluster => (
                "copy-db-cluster-snapshot",
                json!({
                    "SourceDBClusterSnapshotIdentifier": request.source_snapshot_id,
                    "TargetDBClusterSnapshotIdentifier": request.target_snapshot_id,
                    "KmsKeyId": request.kms_key_id,
                    "CopyTags": request.copy_tags,
                    "Tags": wire_tags(&request.tags),
                }),
            ),
            Topology::Instance => (
                "copy-db-snapshot",
                json!({
                    "SourceDBSnapshotIdentifier": request.source_snapshot_id,
                    "TargetDBSnapshotIdentifier": request.target_snapshot_id,
                    "KmsKeyId": request.kms_key_id,
                    "CopyTags": request.copy_tags,
                    "Tags": wire_tags(&request.tags),
                }),
            ),
        };
        self.call(RDS, operation, &request.target_snapshot_id, input, true)
            .await?;
        Ok(())
    }

    async fn restore_from_snapshot(
        &self,
        topology: Topology,
        request: &RestoreRequest,
    ) -> EngineResult<()> {
        let security_groups =
            (!request.security_groups.is_empty()).then_some(&request.security_groups);
        let (operation, input) = match topology {
            Topology::Cluster => (
                "restore-db-cluster-from-snapshot",
                json!({
                    "DBClusterIdentifier": request.database_id,
                    "SnapshotIdentifier": request.snapshot_id,
                    "Engine": request.engine,
                    "DBSubnetGroupName": request.subnet_group,
                    "VpcSecurityGroupIds": security_groups,
                    "PubliclyAccessible": request.publicly_accessible,
                    "Tags": wire_tags(&request.tags),
                }),
            ),
            Topology::Instance => (
                "restore-db-instance-from-db-snapshot",
                json!({
                    "DBInstanceIdentifier": request.database_id,
                    "DBSnapshotIdentifier": request.snapshot_id,
                    "Engine": request.engine,
                    "DBInstanceClass": request.instance_class,
                    "DBSubnetGroupName": request.subnet_group,
                    "VpcSecurityGroupIds": security_groups,
                    "PubliclyAccessible": request.publicly_accessible,
                    "Tags": wire_tags(&request.tags),
                }),
            ),
        };
        self.call(RDS, operation, &request.database_id, input, true)
            .await?;
        Ok(())
    }

    async fn describe_databases(
        &self,
        topology: Topology,
        database_id: &str,
    ) -> EngineResult<Vec<DatabaseInfo>> {
        let result: EngineResult<Vec<DatabaseInfo>> = match topology {
            Topology::Cluster => self
                .call_parsed::<ClustersResponse>(
                    RDS,
                    "describe-db-clusters",
                    database_id,
                    json!({ "DBClusterIdentifier": database_id }),
                    true,
                )
                .await
                .map(|r| r.clusters.into_iter().map(Into::into).collect()),
            Topology::Instance => self
                .call_parsed::<InstancesResponse>(
                    RDS,
                    "describe-db-instances",
                    database_id,
                    json!({ "DBInstanceIdentifier": database_id }),
                    true,
                )
                .await
                .map(|r| r.instances.into_iter().map(Into::into).collect()),
        };
        empty_if_not_found(result)
    }

    async fn modify_database(
        &self,
        topology: Topology,
        request: &ModifyRequest,
    ) -> EngineResult<()> {
        let (operation, id_key) = match topology {
            Topology::Cluster => ("modify-db-cluster", "DBClusterIdentifier"),
            Topology::Instance => ("modify-db-instance", "DBInstanceIdentifier"),
        };
        let mut input = json!({
            "MasterUserPassword": request.master_password,
            "ApplyImmediately": request.apply_immediately,
            "BackupRetentionPeriod": request.backup_retention_days,
        });
        input[id_key] = json!(request.database_id);
        self.call(RDS, operation, &request.database_id, input, true)
            .await?;
        Ok(())
    }

    async fn create_database_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> EngineResult<()> {
        let input = json!({
            "DBInstanceIdentifier": request.instance_id,
            "DBClusterIdentifier": request.cluster_id,
            "DBInstanceClass": request.instance_class,
            "Engine": request.engine,
            "PubliclyAccessible": request.publicly_accessible,
        });
        self.call(RDS, "create-db-instance", &request.instance_id, input, true)
            .await?;
        Ok(())
    }

    async fn delete_snapshot(&self, topology: Topology, snapshot_id: &str) -> EngineResult<()> {
        let (operation, input) = match topology {
            Topology::Cluster => (
                "delete-db-cluster-snapshot",
                json!({ "DBClusterSnapshotIdentifier": snapshot_id }),
            ),
            Topology::Instance => (
                "delete-db-snapshot",
                json!({ "DBSnapshotIdentifier": snapshot_id }),
            ),
        };
        self.call(RDS, operation, snapshot_id, input, true).await?;
        Ok(())
    }

    async fn delete_database(
        &self,
        topology: Topology,
        database_id: &str,
        skip_final_snapshot: bool,
    ) -> EngineResult<()> {
        let (operation, input) = match topology {
            Topology::Cluster => (
                "delete-db-cluster",
                json!({
                    "DBClusterIdentifier": database_id,
                    "SkipFinalSnapshot": skip_final_snapshot,
                }),
            ),
            Topology::Instance => (
                "delete-db-instance",
                json!({
                    "DBInstanceIdentifier": database_id,
                    "SkipFinalSnapshot": skip_final_snapshot,
                }),
            ),
        };
        self.call(RDS, operation, database_id, input, true).await?;
        Ok(())
    }
}

#[async_trait]
impl TagIndex for AwsCliEngine {
    async fn list_resources(&self, tags: &[Tag], resource_type: &str) -> EngineResult<Vec<String>> {
        let filters: Vec<Value> = tags
            .iter()
            .map(|tag| json!({ "Key": tag.key, "Values": [tag.value] }))
            .collect();
        let input = json!({
            "TagFilters": filters,
            "ResourceTypeFilters": [resource_type],
        });
        // Let the CLI follow pagination tokens itself.
        let response: ResourcesResponse = self
            .call_parsed(TAGGING, "get-resources", resource_type, input, true)
            .await?;
        Ok(response.resources.into_iter().map(|r| r.arn).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args() {
        let config = AwsCliConfig::new("aws", vec!["--profile".into(), "prod".into()])
            .with_region("eu-west-1");

        assert_eq!(
            config.command_args(RDS, "describe-db-snapshots", false),
            vec![
                "--profile",
                "prod",
                "rds",
                "describe-db-snapshots",
                "--cli-input-json",
                "file:///dev/stdin",
                "--output",
                "json",
                "--region",
                "eu-west-1",
                "--no-paginate",
            ]
        );
        assert!(
            !AwsCliConfig::default()
                .command_args(RDS, "delete-db-snapshot", true)
                .contains(&"--no-paginate".to_string())
        );
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            error_code(
                "\nAn error occurred (DBSnapshotNotFound) when calling the DeleteDBSnapshot operation: DBSnapshot not found: x\n"
            ),
            Some("DBSnapshotNotFound")
        );
        assert_eq!(error_code("Unable to locate credentials"), None);
        assert_eq!(error_code("An error occurred (Truncated"), None);
    }

    #[test]
    fn test_classify_failure() {
        let err = classify_failure(
            "delete-db-cluster",
            "tmp-1",
            "An error occurred (DBClusterNotFoundFault) when calling the DeleteDBCluster operation: DBCluster tmp-1 not found.",
        );
        assert!(err.is_not_found());

        let err = classify_failure(
            "delete-db-cluster",
            "tmp-1",
            "An error occurred (InvalidDBClusterStateFault) when calling the DeleteDBCluster operation: Cluster cannot be deleted, it still contains DB instances in non-deleting state.",
        );
        assert!(matches!(err, EngineError::Rejected { ref message, .. } if message.contains("InvalidDBClusterStateFault")));

        let err = classify_failure(
            "describe-db-clusters",
            "orders",
            "Could not connect to the endpoint URL\n",
        );
        assert!(matches!(err, EngineError::Transport { ref details, .. } if details == "Could not connect to the endpoint URL"));
    }

    #[test]
    fn test_empty_if_not_found() {
        let missing: EngineResult<Vec<String>> = Err(EngineError::NotFound {
            operation: "describe-db-instances".into(),
            resource: "x".into(),
        });
        assert!(empty_if_not_found(missing).unwrap().is_empty());

        let rejected: EngineResult<Vec<String>> = Err(EngineError::Rejected {
            operation: "describe-db-instances".into(),
            message: "throttled".into(),
        });
        assert!(empty_if_not_found(rejected).is_err());
    }
}
