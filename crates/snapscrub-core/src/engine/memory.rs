// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory engine for testing.
//!
//! Simulates asynchronous infrastructure: resources created through the
//! engine report a transitional status for a configurable number of
//! describe calls before becoming `available`. Failures can be injected per
//! operation and identifier prefix, and every call is recorded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::*;
use crate::context::Topology;

/// Engine operation, for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    CreateSnapshot,
    DescribeSnapshots,
    ListSnapshots,
    CopySnapshot,
    RestoreFromSnapshot,
    DescribeDatabases,
    ModifyDatabase,
    CreateDatabaseInstance,
    DeleteSnapshot,
    DeleteDatabase,
    ListResources,
}

impl EngineOp {
    /// Whether the operation changes engine state.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::DescribeSnapshots
                | Self::ListSnapshots
                | Self::DescribeDatabases
                | Self::ListResources
        )
    }
}

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCall {
    pub op: EngineOp,
    pub topology: Option<Topology>,
    /// Identifier the call addressed (resource type for tag lookups).
    pub resource_id: String,
}

/// Resource collection inside the memory engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryCollection {
    ClusterSnapshots,
    InstanceSnapshots,
    Clusters,
    Instances,
}

impl MemoryCollection {
    pub fn snapshots(topology: Topology) -> Self {
        match topology {
            Topology::Cluster => Self::ClusterSnapshots,
            Topology::Instance => Self::InstanceSnapshots,
        }
    }

    pub fn databases(topology: Topology) -> Self {
        match topology {
            Topology::Cluster => Self::Clusters,
            Topology::Instance => Self::Instances,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredSnapshot {
    parent: String,
    tags: Vec<Tag>,
    created_at: DateTime<Utc>,
    pending_polls: u32,
    /// Attributes of the parent at snapshot time, inherited by restores.
    origin: DatabaseInfo,
}

#[derive(Debug, Clone)]
struct StoredDatabase {
    info: DatabaseInfo,
    cluster: Option<String>,
    pending_polls: u32,
    transitional: &'static str,
}

#[derive(Debug, Clone)]
struct FailureRule {
    op: EngineOp,
    prefix: String,
}

#[derive(Debug, Clone)]
struct StatusRule {
    collection: MemoryCollection,
    prefix: String,
    status: String,
}

#[derive(Debug, Default)]
struct State {
    cluster_snapshots: BTreeMap<String, StoredSnapshot>,
    instance_snapshots: BTreeMap<String, StoredSnapshot>,
    clusters: BTreeMap<String, StoredDatabase>,
    instances: BTreeMap<String, StoredDatabase>,
    failures: Vec<FailureRule>,
    status_rules: Vec<StatusRule>,
    held_modifications: Vec<String>,
    withheld_endpoints: Vec<String>,
    calls: Vec<EngineCall>,
}

impl State {
    fn snapshots(&self, topology: Topology) -> &BTreeMap<String, StoredSnapshot> {
        match topology {
            Topology::Cluster => &self.cluster_snapshots,
            Topology::Instance => &self.instance_snapshots,
        }
    }

    fn snapshots_mut(&mut self, topology: Topology) -> &mut BTreeMap<String, StoredSnapshot> {
        match topology {
            Topology::Cluster => &mut self.cluster_snapshots,
            Topology::Instance => &mut self.instance_snapshots,
        }
    }

    fn databases(&self, topology: Topology) -> &BTreeMap<String, StoredDatabase> {
        match topology {
            Topology::Cluster => &self.clusters,
            Topology::Instance => &self.instances,
        }
    }

    fn databases_mut(&mut self, topology: Topology) -> &mut BTreeMap<String, StoredDatabase> {
        match topology {
            Topology::Cluster => &mut self.clusters,
            Topology::Instance => &mut self.instances,
        }
    }

    /// Record a call and apply any matching failure rule.
    fn enter(
        &mut self,
        op: EngineOp,
        topology: Option<Topology>,
        resource_id: &str,
    ) -> EngineResult<()> {
        self.calls.push(EngineCall {
            op,
            topology,
            resource_id: resource_id.to_string(),
        });
        if self
            .failures
            .iter()
            .any(|rule| rule.op == op && resource_id.starts_with(&rule.prefix))
        {
            return Err(EngineError::Rejected {
                operation: operation_name(op, topology).to_string(),
                message: format!("injected failure for {resource_id}"),
            });
        }
        Ok(())
    }

    fn forced_status(&self, collection: MemoryCollection, id: &str) -> Option<String> {
        self.status_rules
            .iter()
            .rev()
            .find(|rule| rule.collection == collection && id.starts_with(&rule.prefix))
            .map(|rule| rule.status.clone())
    }
}

fn operation_name(op: EngineOp, topology: Option<Topology>) -> &'static str {
    let cluster = topology.is_some_and(|t| t.is_cluster());
    match (op, cluster) {
        (EngineOp::CreateSnapshot, true) => "create-db-cluster-snapshot",
        (EngineOp::CreateSnapshot, false) => "create-db-snapshot",
        (EngineOp::DescribeSnapshots | EngineOp::ListSnapshots, true) => {
            "describe-db-cluster-snapshots"
        }
        (EngineOp::DescribeSnapshots | EngineOp::ListSnapshots, false) => "describe-db-snapshots",
        (EngineOp::CopySnapshot, true) => "copy-db-cluster-snapshot",
        (EngineOp::CopySnapshot, false) => "copy-db-snapshot",
        (EngineOp::RestoreFromSnapshot, true) => "restore-db-cluster-from-snapshot",
        (EngineOp::RestoreFromSnapshot, false) => "restore-db-instance-from-db-snapshot",
        (EngineOp::DescribeDatabases, true) => "describe-db-clusters",
        (EngineOp::DescribeDatabases, false) => "describe-db-instances",
        (EngineOp::ModifyDatabase, true) => "modify-db-cluster",
        (EngineOp::ModifyDatabase, false) => "modify-db-instance",
        (EngineOp::CreateDatabaseInstance, _) => "create-db-instance",
        (EngineOp::DeleteSnapshot, true) => "delete-db-cluster-snapshot",
        (EngineOp::DeleteSnapshot, false) => "delete-db-snapshot",
        (EngineOp::DeleteDatabase, true) => "delete-db-cluster",
        (EngineOp::DeleteDatabase, false) => "delete-db-instance",
        (EngineOp::ListResources, _) => "get-resources",
    }
}

fn not_found(op: EngineOp, topology: Option<Topology>, resource: &str) -> EngineError {
    EngineError::NotFound {
        operation: operation_name(op, topology).to_string(),
        resource: resource.to_string(),
    }
}

fn already_exists(op: EngineOp, topology: Option<Topology>, resource: &str) -> EngineError {
    EngineError::Rejected {
        operation: operation_name(op, topology).to_string(),
        message: format!("{resource} already exists"),
    }
}

fn endpoint_for(topology: Topology, id: &str) -> String {
    match topology {
        Topology::Cluster => format!("{id}.cluster-memory.local"),
        Topology::Instance => format!("{id}.memory.local"),
    }
}

fn default_port(engine: &str) -> u16 {
    if engine.contains("postgres") { 5432 } else { 3306 }
}

/// In-memory [`DatabaseEngine`] and [`TagIndex`].
pub struct MemoryEngine {
    state: Mutex<State>,
    /// Describe calls a new or modified resource stays transitional for.
    pub settle_polls: u32,
    /// Snapshots per page in [`DatabaseEngine::list_snapshots`].
    pub page_size: usize,
    /// Account embedded in generated ARNs.
    pub account_id: String,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Create an empty engine where new resources settle after one poll.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            settle_polls: 1,
            page_size: 2,
            account_id: "123456789012".to_string(),
        }
    }

    /// Number of transitional describe responses before `available`.
    pub fn with_settle_polls(mut self, polls: u32) -> Self {
        self.settle_polls = polls;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Seed an available source database.
    pub async fn add_database(&self, topology: Topology, info: DatabaseInfo) {
        let mut state = self.state.lock().await;
        state.databases_mut(topology).insert(
            info.identifier.clone(),
            StoredDatabase {
                info,
                cluster: None,
                pending_polls: 0,
                transitional: "creating",
            },
        );
    }

    /// Seed an available instance belonging to `cluster_id`.
    pub async fn add_cluster_member(&self, cluster_id: &str, info: DatabaseInfo) {
        let mut state = self.state.lock().await;
        state.instances.insert(
            info.identifier.clone(),
            StoredDatabase {
                info,
                cluster: Some(cluster_id.to_string()),
                pending_polls: 0,
                transitional: "creating",
            },
        );
    }

    /// Seed an available snapshot.
    pub async fn add_snapshot(
        &self,
        topology: Topology,
        parent_id: &str,
        snapshot_id: &str,
        tags: Vec<Tag>,
        created_at: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().await;
        let origin = state
            .databases(topology)
            .get(parent_id)
            .map(|db| db.info.clone())
            .unwrap_or_default();
        state.snapshots_mut(topology).insert(
            snapshot_id.to_string(),
            StoredSnapshot {
                parent: parent_id.to_string(),
                tags,
                created_at,
                pending_polls: 0,
                origin,
            },
        );
    }

    /// Reject every `op` call addressing an identifier starting with `prefix`.
    pub async fn fail_operation(&self, op: EngineOp, prefix: &str) {
        self.state.lock().await.failures.push(FailureRule {
            op,
            prefix: prefix.to_string(),
        });
    }

    /// Report `status` for resources in `collection` starting with `prefix`.
    pub async fn force_status(&self, collection: MemoryCollection, prefix: &str, status: &str) {
        self.state.lock().await.status_rules.push(StatusRule {
            collection,
            prefix: prefix.to_string(),
            status: status.to_string(),
        });
    }

    /// Keep pending modifications on databases starting with `prefix` once
    /// they have been modified.
    pub async fn hold_pending_modifications(&self, prefix: &str) {
        self.state
            .lock()
            .await
            .held_modifications
            .push(prefix.to_string());
    }

    /// Report no endpoint for databases starting with `prefix`.
    pub async fn withhold_endpoint(&self, prefix: &str) {
        self.state
            .lock()
            .await
            .withheld_endpoints
            .push(prefix.to_string());
    }

    /// All recorded calls, oldest first.
    pub async fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().await.calls.clone()
    }

    /// Recorded calls of one operation.
    pub async fn calls_for(&self, op: EngineOp) -> Vec<EngineCall> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.op == op)
            .cloned()
            .collect()
    }

    pub async fn snapshot_ids(&self, topology: Topology) -> Vec<String> {
        self.state
            .lock()
            .await
            .snapshots(topology)
            .keys()
            .cloned()
            .collect()
    }

    pub async fn database_ids(&self, topology: Topology) -> Vec<String> {
        self.state
            .lock()
            .await
            .databases(topology)
            .keys()
            .cloned()
            .collect()
    }

    /// Tags of a stored snapshot.
    pub async fn snapshot_tags(&self, topology: Topology, snapshot_id: &str) -> Option<Vec<Tag>> {
        self.state
            .lock()
            .await
            .snapshots(topology)
            .get(snapshot_id)
            .map(|snap| snap.tags.clone())
    }

    fn arn(&self, topology: Topology, snapshot_id: &str) -> String {
        let kind = match topology {
            Topology::Cluster => "cluster-snapshot",
            Topology::Instance => "snapshot",
        };
        format!(
            "arn:aws:rds:us-east-1:{}:{}:{}",
            self.account_id, kind, snapshot_id
        )
    }

    fn describe_database(
        state: &mut State,
        topology: Topology,
        database_id: &str,
    ) -> Option<DatabaseInfo> {
        let collection = MemoryCollection::databases(topology);
        let forced = state.forced_status(collection, database_id);
        let held = state
            .held_modifications
            .iter()
            .any(|prefix| database_id.starts_with(prefix));
        let withheld = state
            .withheld_endpoints
            .iter()
            .any(|prefix| database_id.starts_with(prefix));
        let members: Vec<String> = if topology.is_cluster() {
            state
                .instances
                .iter()
                .filter(|(_, db)| db.cluster.as_deref() == Some(database_id))
                .map(|(id, _)| id.clone())
                .collect()
        } else {
            Vec::new()
        };

        let stored = state.databases_mut(topology).get_mut(database_id)?;
        let mut info = stored.info.clone();
        if stored.pending_polls > 0 {
            stored.pending_polls -= 1;
            info.status = stored.transitional.to_string();
            info.pending_modifications = stored.transitional == "modifying";
        } else {
            info.status = "available".to_string();
            info.pending_modifications = held && stored.transitional == "modifying";
        }
        if let Some(status) = forced {
            info.status = status;
        }
        if withheld {
            info.endpoint = None;
        }
        if topology.is_cluster() {
            info.members = members;
        }
        Some(info)
    }
}

#[async_trait]
impl DatabaseEngine for MemoryEngine {
    async fn create_snapshot(
        &self,
        topology: Topology,
        parent_id: &str,
        snapshot_id: &str,
        tags: &[Tag],
    ) -> EngineResult<()> {
        let op = EngineOp::CreateSnapshot;
        let mut state = self.state.lock().await;
        state.enter(op, Some(topology), snapshot_id)?;
        let origin = state
            .databases(topology)
            .get(parent_id)
            .map(|db| db.info.clone())
            .ok_or_else(|| not_found(op, Some(topology), parent_id))?;
        if state.snapshots(topology).contains_key(snapshot_id) {
            return Err(already_exists(op, Some(topology), snapshot_id));
        }
        let pending_polls = self.settle_polls;
        state.snapshots_mut(topology).insert(
            snapshot_id.to_string(),
            StoredSnapshot {
                parent: parent_id.to_string(),
                tags: tags.to_vec(),
                created_at: Utc::now(),
                pending_polls,
                origin,
            },
        );
        Ok(())
    }

    async fn describe_snapshots(
        &self,
        topology: Topology,
        parent_id: Option<&str>,
        snapshot_id: &str,
    ) -> EngineResult<Vec<SnapshotInfo>> {
        let mut state = self.state.lock().await;
        state.enter(EngineOp::DescribeSnapshots, Some(topology), snapshot_id)?;
        let forced = state.forced_status(MemoryCollection::snapshots(topology), snapshot_id);
        let Some(snapshot) = state.snapshots_mut(topology).get_mut(snapshot_id) else {
            return Ok(Vec::new());
        };
        if parent_id.is_some_and(|parent| parent != snapshot.parent) {
            return Ok(Vec::new());
        }
        let status = if snapshot.pending_polls > 0 {
            snapshot.pending_polls -= 1;
            "creating".to_string()
        } else {
            "available".to_string()
        };
        Ok(vec![SnapshotInfo {
            identifier: snapshot_id.to_string(),
            status: forced.unwrap_or(status),
            created_at: Some(snapshot.created_at),
        }])
    }

    async fn list_snapshots(
        &self,
        topology: Topology,
        parent_id: &str,
        marker: Option<&str>,
    ) -> EngineResult<SnapshotPage> {
        let mut state = self.state.lock().await;
        state.enter(EngineOp::ListSnapshots, Some(topology), parent_id)?;
        let start = match marker {
            Some(marker) => marker.parse::<usize>().map_err(|e| EngineError::Rejected {
                operation: operation_name(EngineOp::ListSnapshots, Some(topology)).to_string(),
                message: format!("invalid marker '{marker}': {e}"),
            })?,
            None => 0,
        };
        let matching: Vec<SnapshotInfo> = state
            .snapshots(topology)
            .iter()
            .filter(|(_, snap)| snap.parent == parent_id)
            .map(|(id, snap)| SnapshotInfo {
                identifier: id.clone(),
                status: if snap.pending_polls > 0 {
                    "creating".to_string()
                } else {
                    "available".to_string()
                },
                created_at: Some(snap.created_at),
            })
            .collect();
        let end = (start + self.page_size).min(matching.len());
        let snapshots = matching.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
        let marker = (end < matching.len()).then(|| end.to_string());
        Ok(SnapshotPage { snapshots, marker })
    }

    async fn copy_snapshot(
        &self,
        topology: Topology,
        request: &CopySnapshotRequest,
    ) -> EngineResult<()> {
        let op = EngineOp::CopySnapshot;
        let mut state = self.state.lock().await;
        state.enter(op, Some(topology), &request.target_snapshot_id)?;
        let source = state
            .snapshots(topology)
            .get(&request.source_snapshot_id)
            .cloned()
            .ok_or_else(|| not_found(op, Some(topology), &request.source_snapshot_id))?;
        if state
            .snapshots(topology)
            .contains_key(&request.target_snapshot_id)
        {
            return Err(already_exists(op, Some(topology), &request.target_snapshot_id));
        }
        let mut tags = if request.copy_tags {
            source.tags.clone()
        } else {
            Vec::new()
        };
        tags.extend(request.tags.iter().cloned());
        let mut origin = source.origin.clone();
        origin.kms_key_id = Some(request.kms_key_id.clone());
        let pending_polls = self.settle_polls;
        state.snapshots_mut(topology).insert(
            request.target_snapshot_id.clone(),
            StoredSnapshot {
                parent: source.parent,
                tags,
                created_at: Utc::now(),
                pending_polls,
                origin,
            },
        );
        Ok(())
    }

    async fn restore_from_snapshot(
        &self,
        topology: Topology,
        request: &RestoreRequest,
    ) -> EngineResult<()> {
        let op = EngineOp::RestoreFromSnapshot;
        let mut state = self.state.lock().await;
        state.enter(op, Some(topology), &request.database_id)?;
        let snapshot = state
            .snapshots(topology)
            .get(&request.snapshot_id)
            .cloned()
            .ok_or_else(|| not_found(op, Some(topology), &request.snapshot_id))?;
        if state.databases(topology).contains_key(&request.database_id) {
            return Err(already_exists(op, Some(topology), &request.database_id));
        }
        let info = DatabaseInfo {
            identifier: request.database_id.clone(),
            status: "creating".to_string(),
            engine: request.engine.clone(),
            port: snapshot
                .origin
                .port
                .or_else(|| Some(default_port(&request.engine))),
            master_username: snapshot.origin.master_username.clone(),
            database_name: snapshot.origin.database_name.clone(),
            kms_key_id: snapshot.origin.kms_key_id.clone(),
            instance_class: match topology {
                Topology::Instance => request.instance_class.clone(),
                Topology::Cluster => None,
            },
            members: Vec::new(),
            pending_modifications: false,
            endpoint: Some(endpoint_for(topology, &request.database_id)),
        };
        let pending_polls = self.settle_polls;
        state.databases_mut(topology).insert(
            request.database_id.clone(),
            StoredDatabase {
                info,
                cluster: None,
                pending_polls,
                transitional: "creating",
            },
        );
        Ok(())
    }

    async fn describe_databases(
        &self,
        topology: Topology,
        database_id: &str,
    ) -> EngineResult<Vec<DatabaseInfo>> {
        let mut state = self.state.lock().await;
        state.enter(EngineOp::DescribeDatabases, Some(topology), database_id)?;
        Ok(Self::describe_database(&mut state, topology, database_id)
            .into_iter()
            .collect())
    }

    async fn modify_database(
        &self,
        topology: Topology,
        request: &ModifyRequest,
    ) -> EngineResult<()> {
        let op = EngineOp::ModifyDatabase;
        let mut state = self.state.lock().await;
        state.enter(op, Some(topology), &request.database_id)?;
        let settle = self.settle_polls;
        let stored = state
            .databases_mut(topology)
            .get_mut(&request.database_id)
            .ok_or_else(|| not_found(op, Some(topology), &request.database_id))?;
        stored.pending_polls = settle;
        stored.transitional = "modifying";
        Ok(())
    }

    async fn create_database_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> EngineResult<()> {
        let op = EngineOp::CreateDatabaseInstance;
        let mut state = self.state.lock().await;
        state.enter(op, None, &request.instance_id)?;
        let cluster = state
            .clusters
            .get(&request.cluster_id)
            .map(|db| db.info.clone())
            .ok_or_else(|| not_found(op, None, &request.cluster_id))?;
        if state.instances.contains_key(&request.instance_id) {
            return Err(already_exists(op, None, &request.instance_id));
        }
        let info = DatabaseInfo {
            identifier: request.instance_id.clone(),
            status: "creating".to_string(),
            engine: request.engine.clone(),
            port: cluster.port,
            master_username: cluster.master_username,
            database_name: cluster.database_name,
            kms_key_id: cluster.kms_key_id,
            instance_class: Some(request.instance_class.clone()),
            members: Vec::new(),
            pending_modifications: false,
            endpoint: Some(endpoint_for(Topology::Instance, &request.instance_id)),
        };
        let pending_polls = self.settle_polls;
        state.instances.insert(
            request.instance_id.clone(),
            StoredDatabase {
                info,
                cluster: Some(request.cluster_id.clone()),
                pending_polls,
                transitional: "creating",
            },
        );
        Ok(())
    }

    async fn delete_snapshot(&self, topology: Topology, snapshot_id: &str) -> EngineResult<()> {
        let op = EngineOp::DeleteSnapshot;
        let mut state = self.state.lock().await;
        state.enter(op, Some(topology), snapshot_id)?;
        state
            .snapshots_mut(topology)
            .remove(snapshot_id)
            .map(|_| ())
            .ok_or_else(|| not_found(op, Some(topology), snapshot_id))
    }

    async fn delete_database(
        &self,
        topology: Topology,
        database_id: &str,
        _skip_final_snapshot: bool,
    ) -> EngineResult<()> {
        let op = EngineOp::DeleteDatabase;
        let mut state = self.state.lock().await;
        state.enter(op, Some(topology), database_id)?;
        if !state.databases(topology).contains_key(database_id) {
            return Err(not_found(op, Some(topology), database_id));
        }
        if topology.is_cluster()
            && state
                .instances
                .values()
                .any(|db| db.cluster.as_deref() == Some(database_id))
        {
            return Err(EngineError::Rejected {
                operation: operation_name(op, Some(topology)).to_string(),
                message: format!("InvalidDBClusterStateFault: {database_id} still has instances"),
            });
        }
        state.databases_mut(topology).remove(database_id);
        Ok(())
    }
}

#[async_trait]
impl TagIndex for MemoryEngine {
    async fn list_resources(&self, tags: &[Tag], resource_type: &str) -> EngineResult<Vec<String>> {
        let mut state = self.state.lock().await;
        state.enter(EngineOp::ListResources, None, resource_type)?;
        let topology = match resource_type {
            "rds:cluster-snapshot" => Topology::Cluster,
            "rds:snapshot" => Topology::Instance,
            _ => return Ok(Vec::new()),
        };
        Ok(state
            .snapshots(topology)
            .iter()
            .filter(|(_, snap)| tags.iter().all(|tag| snap.tags.contains(tag)))
            .map(|(id, _)| self.arn(topology, id))
            .collect())
    }
}
