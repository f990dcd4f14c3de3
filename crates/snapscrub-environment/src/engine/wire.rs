// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JSON shapes of the RDS and tagging APIs as printed by `aws --output json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use snapscrub_core::engine::{DatabaseInfo, SnapshotInfo, Tag};

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireTag<'a> {
    key: &'a str,
    value: &'a str,
}

pub(crate) fn wire_tags(tags: &[Tag]) -> Vec<WireTag<'_>> {
    tags.iter()
        .map(|tag| WireTag {
            key: &tag.key,
            value: &tag.value,
        })
        .collect()
}

/// Drop `null` members of a request object; the CLI rejects them.
pub(crate) fn without_nulls(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.retain(|_, member| !member.is_null());
    }
    value
}

fn has_pending(values: &Option<Map<String, Value>>) -> bool {
    values.as_ref().is_some_and(|map| !map.is_empty())
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClusterSnapshotsResponse {
    #[serde(rename = "DBClusterSnapshots", default)]
    pub snapshots: Vec<ClusterSnapshot>,
    #[serde(rename = "Marker")]
    pub marker: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClusterSnapshot {
    #[serde(rename = "DBClusterSnapshotIdentifier")]
    identifier: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "SnapshotCreateTime")]
    created_at: Option<DateTime<Utc>>,
}

impl From<ClusterSnapshot> for SnapshotInfo {
    fn from(snapshot: ClusterSnapshot) -> Self {
        Self {
            identifier: snapshot.identifier,
            status: snapshot.status,
            created_at: snapshot.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstanceSnapshotsResponse {
    #[serde(rename = "DBSnapshots", default)]
    pub snapshots: Vec<InstanceSnapshot>,
    #[serde(rename = "Marker")]
    pub marker: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstanceSnapshot {
    #[serde(rename = "DBSnapshotIdentifier")]
    identifier: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "SnapshotCreateTime")]
    created_at: Option<DateTime<Utc>>,
}

impl From<InstanceSnapshot> for SnapshotInfo {
    fn from(snapshot: InstanceSnapshot) -> Self {
        Self {
            identifier: snapshot.identifier,
            status: snapshot.status,
            created_at: snapshot.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClustersResponse {
    #[serde(rename = "DBClusters", default)]
    pub clusters: Vec<Cluster>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClusterMember {
    #[serde(rename = "DBInstanceIdentifier")]
    instance_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Cluster {
    #[serde(rename = "DBClusterIdentifier")]
    identifier: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Engine", default)]
    engine: String,
    #[serde(rename = "Port")]
    port: Option<u16>,
    #[serde(rename = "MasterUsername")]
    master_username: Option<String>,
    #[serde(rename = "DatabaseName")]
    database_name: Option<String>,
    #[serde(rename = "KmsKeyId")]
    kms_key_id: Option<String>,
    #[serde(rename = "DBClusterMembers", default)]
    members: Vec<ClusterMember>,
    #[serde(rename = "Endpoint")]
    endpoint: Option<String>,
    #[serde(rename = "PendingModifiedValues")]
    pending: Option<Map<String, Value>>,
}

impl From<Cluster> for DatabaseInfo {
    fn from(cluster: Cluster) -> Self {
        Self {
            pending_modifications: has_pending(&cluster.pending),
            identifier: cluster.identifier,
            status: cluster.status,
            engine: cluster.engine,
            port: cluster.port,
            master_username: cluster.master_username,
            database_name: cluster.database_name,
            kms_key_id: cluster.kms_key_id,
            instance_class: None,
            members: cluster.members.into_iter().map(|m| m.instance_id).collect(),
            endpoint: cluster.endpoint,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstancesResponse {
    #[serde(rename = "DBInstances", default)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstanceEndpoint {
    #[serde(rename = "Address")]
    address: Option<String>,
    #[serde(rename = "Port")]
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Instance {
    #[serde(rename = "DBInstanceIdentifier")]
    identifier: String,
    #[serde(rename = "DBInstanceStatus", default)]
    status: String,
    #[serde(rename = "Engine", default)]
    engine: String,
    #[serde(rename = "Endpoint")]
    endpoint: Option<InstanceEndpoint>,
    #[serde(rename = "MasterUsername")]
    master_username: Option<String>,
    #[serde(rename = "DBName")]
    database_name: Option<String>,
    #[serde(rename = "KmsKeyId")]
    kms_key_id: Option<String>,
    #[serde(rename = "DBInstanceClass")]
    instance_class: Option<String>,
    #[serde(rename = "PendingModifiedValues")]
    pending: Option<Map<String, Value>>,
}

impl From<Instance> for DatabaseInfo {
    fn from(instance: Instance) -> Self {
        let (endpoint, port) = match instance.endpoint {
            Some(endpoint) => (endpoint.address, endpoint.port),
            None => (None, None),
        };
        Self {
            pending_modifications: has_pending(&instance.pending),
            identifier: instance.identifier,
            status: instance.status,
            engine: instance.engine,
            port,
            master_username: instance.master_username,
            database_name: instance.database_name,
            kms_key_id: instance.kms_key_id,
            instance_class: instance.instance_class,
            members: Vec::new(),
            endpoint,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourcesResponse {
    #[serde(rename = "ResourceTagMappingList", default)]
    pub resources: Vec<ResourceMapping>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourceMapping {
    #[serde(rename = "ResourceARN")]
    pub arn: String,
}
