// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution input, per-execution context and execution output.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Result, WorkflowError};

/// Source database topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Single database instance.
    Instance,
    /// Multi-node cluster.
    Cluster,
}

impl Topology {
    /// Map the `is_cluster` flag of an execution trigger.
    pub fn from_is_cluster(is_cluster: bool) -> Self {
        if is_cluster {
            Self::Cluster
        } else {
            Self::Instance
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, Self::Cluster)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Cluster => "cluster",
        }
    }

    /// Tag index resource type for snapshots of this topology.
    pub fn snapshot_resource_type(&self) -> &'static str {
        match self {
            Self::Instance => "rds:snapshot",
            Self::Cluster => "rds:cluster-snapshot",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine family; selects the sanitize script runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineFamily {
    Mysql,
    Postgres,
}

impl EngineFamily {
    /// Classify an engine identifier.
    ///
    /// `aurora` exactly, or anything containing `mysql` or `mariadb`, is
    /// MySQL; anything containing `postgres` is Postgres.
    pub fn classify(engine: &str) -> Result<Self> {
        let normalized = engine.to_ascii_lowercase();
        if normalized == "aurora" || normalized.contains("mysql") || normalized.contains("mariadb")
        {
            Ok(Self::Mysql)
        } else if normalized.contains("postgres") {
            Ok(Self::Postgres)
        } else {
            Err(WorkflowError::UnsupportedEngine {
                engine: engine.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trigger input for one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInput {
    /// Source database (cluster or instance) identifier.
    pub database_identifier: String,
    /// Whether the source is a cluster.
    #[serde(default)]
    pub is_cluster: bool,
    /// Expected encryption key of the source; checked when non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_key: Option<String>,
    /// Key to re-encrypt the temp snapshot with; enables re-encryption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_key: Option<String>,
    /// Prefix of the target snapshot (defaults to the source identifier).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_prefix: Option<String>,
    /// Prefix of temporary resources (defaults to `sanitize`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_prefix: Option<String>,
    /// Number of sanitized snapshots to keep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,
    /// SQL script run against the temporary database.
    pub script: String,
}

impl ExecutionInput {
    pub fn new(
        database_identifier: impl Into<String>,
        topology: Topology,
        script: impl Into<String>,
    ) -> Self {
        Self {
            database_identifier: database_identifier.into(),
            is_cluster: topology.is_cluster(),
            database_key: None,
            snapshot_key: None,
            snapshot_prefix: None,
            temp_prefix: None,
            history_limit: None,
            script: script.into(),
        }
    }

    pub fn with_database_key(mut self, key: impl Into<String>) -> Self {
        self.database_key = Some(key.into());
        self
    }

    pub fn with_snapshot_key(mut self, key: impl Into<String>) -> Self {
        self.snapshot_key = Some(key.into());
        self
    }

    pub fn with_snapshot_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.snapshot_prefix = Some(prefix.into());
        self
    }

    pub fn with_temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_prefix = Some(prefix.into());
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    pub fn topology(&self) -> Topology {
        Topology::from_is_cluster(self.is_cluster)
    }

    /// Re-encryption key, ignoring empty strings.
    pub fn reencrypt_key(&self) -> Option<&str> {
        self.snapshot_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Expected source key, ignoring empty strings.
    pub fn expected_key(&self) -> Option<&str> {
        self.database_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Temp database endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Endpoint {
    /// Not fetched yet.
    #[default]
    Unknown,
    /// Address of the temp cluster writer or temp instance.
    Known(String),
}

/// Credentials for connecting to the temporary database.
#[derive(Clone)]
pub struct TempCredentials {
    pub user: String,
    pub password: String,
    pub port: u16,
    pub database: String,
}

impl fmt::Debug for TempCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

/// State threaded through one execution.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub execution_id: Uuid,
    pub database_identifier: String,
    pub topology: Topology,
    pub engine: String,
    pub family: EngineFamily,
    /// Encryption key of the source database, if encrypted.
    pub kms_key_id: Option<String>,
    /// Key the temp snapshot is re-encrypted under, if any.
    pub reencrypt_key: Option<String>,
    pub temp_snapshot_id: String,
    pub temp_enc_snapshot_id: String,
    pub temp_db_id: String,
    pub temp_db_instance_id: String,
    pub temp_db_instance_class: String,
    pub target_snapshot_id: String,
    pub credentials: TempCredentials,
    endpoint: Endpoint,
}

/// Fields of a [`WorkflowContext`] that the resolver derives.
#[derive(Debug, Clone)]
pub struct ResolvedParameters {
    pub execution_id: Uuid,
    pub database_identifier: String,
    pub topology: Topology,
    pub engine: String,
    pub family: EngineFamily,
    pub kms_key_id: Option<String>,
    pub reencrypt_key: Option<String>,
    pub names: crate::naming::TempNames,
    pub temp_db_instance_class: String,
    pub target_snapshot_id: String,
    pub credentials: TempCredentials,
}

impl WorkflowContext {
    pub fn new(params: ResolvedParameters) -> Self {
        Self {
            execution_id: params.execution_id,
            database_identifier: params.database_identifier,
            topology: params.topology,
            engine: params.engine,
            family: params.family,
            kms_key_id: params.kms_key_id,
            reencrypt_key: params.reencrypt_key,
            temp_snapshot_id: params.names.snapshot,
            temp_enc_snapshot_id: params.names.encrypted_snapshot,
            temp_db_id: params.names.database,
            temp_db_instance_id: params.names.instance,
            temp_db_instance_class: params.temp_db_instance_class,
            target_snapshot_id: params.target_snapshot_id,
            credentials: params.credentials,
            endpoint: Endpoint::Unknown,
        }
    }

    pub fn reencrypts(&self) -> bool {
        self.reencrypt_key.is_some()
    }

    /// Snapshot the temp database is restored from.
    pub fn restore_snapshot_id(&self) -> &str {
        if self.reencrypts() {
            &self.temp_enc_snapshot_id
        } else {
            &self.temp_snapshot_id
        }
    }

    /// Instance removed during cleanup: the cluster writer for clusters,
    /// the temp database itself otherwise.
    pub fn temp_instance_to_delete(&self) -> &str {
        match self.topology {
            Topology::Cluster => &self.temp_db_instance_id,
            Topology::Instance => &self.temp_db_id,
        }
    }

    /// Temp endpoint address; an error until it has been fetched.
    pub fn endpoint(&self) -> Result<&str> {
        match &self.endpoint {
            Endpoint::Known(address) => Ok(address),
            Endpoint::Unknown => Err(WorkflowError::EndpointUnknown),
        }
    }

    pub fn set_endpoint(&mut self, address: impl Into<String>) {
        self.endpoint = Endpoint::Known(address.into());
    }
}

/// Terminal status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
}

/// Machine-readable error carried in the execution output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub code: String,
    pub message: String,
}

impl From<&WorkflowError> for ErrorSummary {
    fn from(err: &WorkflowError) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Result of one execution as returned to the trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub execution_id: Uuid,
    /// Empty when resolution failed before the id was derived.
    pub target_snapshot_id: String,
    pub is_cluster: bool,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
    /// Cleanup branches that exhausted their retries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleanup_failures: Vec<String>,
}

impl ExecutionOutput {
    pub fn topology(&self) -> Topology {
        Topology::from_is_cluster(self.is_cluster)
    }
}
