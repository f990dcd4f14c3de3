// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database engine and tag index abstractions.
//!
//! Every operation is dispatched by [`Topology`]: the same call targets the
//! cluster API for clusters and the instance API for single instances. The
//! only exception is [`DatabaseEngine::create_database_instance`], which
//! always adds an instance to a cluster.

mod memory;

pub use memory::{EngineCall, EngineOp, MemoryCollection, MemoryEngine};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::Topology;

/// Tag key carrying the source database identifier.
pub const SNAPSHOT_TAG_KEY: &str = "RDS-sanitized-snapshots";

/// Tag key marking a finished sanitized snapshot.
pub const FINAL_TAG_KEY: &str = "Final";

/// Errors from engine or tag index calls.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The addressed resource does not exist.
    #[error("{resource} not found during '{operation}'")]
    NotFound {
        /// Operation that was attempted.
        operation: String,
        /// Resource identifier.
        resource: String,
    },

    /// The engine refused the request (invalid state, quota, bad parameter).
    #[error("'{operation}' rejected: {message}")]
    Rejected {
        /// Operation that was attempted.
        operation: String,
        /// Message returned by the engine.
        message: String,
    },

    /// The call did not reach the engine or the response was lost.
    #[error("'{operation}' transport failure: {details}")]
    Transport {
        /// Operation that was attempted.
        operation: String,
        /// Error details.
        details: String,
    },

    /// The engine answered with something that could not be decoded.
    #[error("'{operation}' returned a malformed response: {details}")]
    Malformed {
        /// Operation that was attempted.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl EngineError {
    /// Operation that produced this error.
    pub fn operation(&self) -> &str {
        match self {
            Self::NotFound { operation, .. }
            | Self::Rejected { operation, .. }
            | Self::Transport { operation, .. }
            | Self::Malformed { operation, .. } => operation,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Resource tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Tags applied to every resource created for `source_id`.
pub fn general_tags(source_id: &str) -> Vec<Tag> {
    vec![Tag::new(SNAPSHOT_TAG_KEY, source_id)]
}

/// Tags applied to the final sanitized snapshot of `source_id`.
pub fn final_tags(source_id: &str) -> Vec<Tag> {
    vec![
        Tag::new(SNAPSHOT_TAG_KEY, source_id),
        Tag::new(FINAL_TAG_KEY, "true"),
    ]
}

/// Snapshot as reported by a describe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub identifier: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// One page of a snapshot listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotPage {
    pub snapshots: Vec<SnapshotInfo>,
    /// Marker for the next page, if any.
    pub marker: Option<String>,
}

/// Cluster or instance as reported by a describe call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub identifier: String,
    pub status: String,
    pub engine: String,
    pub port: Option<u16>,
    pub master_username: Option<String>,
    pub database_name: Option<String>,
    pub kms_key_id: Option<String>,
    /// Compute class (instances only).
    pub instance_class: Option<String>,
    /// Member instance identifiers (clusters only).
    pub members: Vec<String>,
    pub pending_modifications: bool,
    /// Writer endpoint (clusters) or instance address.
    pub endpoint: Option<String>,
}

/// Copy of a snapshot under another encryption key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySnapshotRequest {
    pub source_snapshot_id: String,
    pub target_snapshot_id: String,
    pub kms_key_id: String,
    pub copy_tags: bool,
    pub tags: Vec<Tag>,
}

/// Restore of a snapshot into a new database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub database_id: String,
    pub snapshot_id: String,
    pub engine: String,
    /// Compute class; only honoured for instance topology.
    pub instance_class: Option<String>,
    pub subnet_group: Option<String>,
    pub security_groups: Vec<String>,
    pub publicly_accessible: bool,
    pub tags: Vec<Tag>,
}

/// Modification of a database's credentials and backup settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    pub database_id: String,
    pub master_password: String,
    pub apply_immediately: bool,
    pub backup_retention_days: Option<u32>,
}

impl std::fmt::Debug for ModifyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModifyRequest")
            .field("database_id", &self.database_id)
            .field("master_password", &"<redacted>")
            .field("apply_immediately", &self.apply_immediately)
            .field("backup_retention_days", &self.backup_retention_days)
            .finish()
    }
}

/// New instance inside an existing cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInstanceRequest {
    pub cluster_id: String,
    pub instance_id: String,
    pub instance_class: String,
    pub engine: String,
    pub publicly_accessible: bool,
}

/// Relational database service operations used by the pipeline.
#[async_trait]
pub trait DatabaseEngine: Send + Sync {
    /// Start a snapshot of `parent_id`.
    async fn create_snapshot(
        &self,
        topology: Topology,
        parent_id: &str,
        snapshot_id: &str,
        tags: &[Tag],
    ) -> EngineResult<()>;

    /// Describe snapshots by identifier, optionally scoped to a parent.
    async fn describe_snapshots(
        &self,
        topology: Topology,
        parent_id: Option<&str>,
        snapshot_id: &str,
    ) -> EngineResult<Vec<SnapshotInfo>>;

    /// List all snapshots of `parent_id`, one page at a time.
    async fn list_snapshots(
        &self,
        topology: Topology,
        parent_id: &str,
        marker: Option<&str>,
    ) -> EngineResult<SnapshotPage>;

    /// Start a copy of a snapshot.
    async fn copy_snapshot(
        &self,
        topology: Topology,
        request: &CopySnapshotRequest,
    ) -> EngineResult<()>;

    /// Start restoring a snapshot into a new database.
    async fn restore_from_snapshot(
        &self,
        topology: Topology,
        request: &RestoreRequest,
    ) -> EngineResult<()>;

    /// Describe databases by identifier.
    async fn describe_databases(
        &self,
        topology: Topology,
        database_id: &str,
    ) -> EngineResult<Vec<DatabaseInfo>>;

    /// Start modifying a database.
    async fn modify_database(&self, topology: Topology, request: &ModifyRequest)
    -> EngineResult<()>;

    /// Start creating an instance inside a cluster.
    async fn create_database_instance(&self, request: &CreateInstanceRequest)
    -> EngineResult<()>;

    /// Delete a snapshot.
    async fn delete_snapshot(&self, topology: Topology, snapshot_id: &str) -> EngineResult<()>;

    /// Delete a database.
    async fn delete_database(
        &self,
        topology: Topology,
        database_id: &str,
        skip_final_snapshot: bool,
    ) -> EngineResult<()>;
}

/// Lookup of resources by tag.
#[async_trait]
pub trait TagIndex: Send + Sync {
    /// ARNs of resources of `resource_type` carrying every tag in `tags`.
    async fn list_resources(&self, tags: &[Tag], resource_type: &str) -> EngineResult<Vec<String>>;
}
