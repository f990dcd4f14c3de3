// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for snapscrub-core tests.
//!
//! Seeds a [`MemoryEngine`] with source databases and wires a [`Pipeline`]
//! around it.

#![allow(dead_code)]

use std::sync::Arc;

use snapscrub_core::config::WorkflowConfig;
use snapscrub_core::engine::{DatabaseInfo, MemoryEngine};
use snapscrub_core::runner::MockRunner;
use snapscrub_core::{Pipeline, Topology};

/// Source cluster identifier used across tests.
pub const CLUSTER_ID: &str = "orders";
/// Writer instance of [`CLUSTER_ID`].
pub const WRITER_ID: &str = "orders-writer";
/// Source instance identifier used across tests.
pub const INSTANCE_ID: &str = "billing";

pub const SOURCE_KEY: &str = "arn:aws:kms:eu-west-1:123456789012:key/source";

/// Source cluster running `engine`.
pub fn source_cluster(engine: &str) -> DatabaseInfo {
    DatabaseInfo {
        identifier: CLUSTER_ID.to_string(),
        status: "available".to_string(),
        engine: engine.to_string(),
        port: Some(if engine.contains("postgres") { 5432 } else { 3306 }),
        master_username: Some("admin".to_string()),
        database_name: Some("orders".to_string()),
        kms_key_id: Some(SOURCE_KEY.to_string()),
        instance_class: None,
        members: vec![WRITER_ID.to_string()],
        pending_modifications: false,
        endpoint: Some("orders.cluster-memory.local".to_string()),
    }
}

/// Writer instance of the source cluster.
pub fn source_writer(engine: &str) -> DatabaseInfo {
    DatabaseInfo {
        identifier: WRITER_ID.to_string(),
        status: "available".to_string(),
        engine: engine.to_string(),
        instance_class: Some("db.r6g.large".to_string()),
        ..Default::default()
    }
}

/// Source instance running `engine`, without a database name.
pub fn source_instance(engine: &str) -> DatabaseInfo {
    DatabaseInfo {
        identifier: INSTANCE_ID.to_string(),
        status: "available".to_string(),
        engine: engine.to_string(),
        port: Some(if engine.contains("postgres") { 5432 } else { 3306 }),
        master_username: Some("root".to_string()),
        database_name: None,
        kms_key_id: Some(SOURCE_KEY.to_string()),
        instance_class: Some("db.t3.medium".to_string()),
        members: Vec::new(),
        pending_modifications: false,
        endpoint: Some("billing.memory.local".to_string()),
    }
}

/// Seed the source database for `topology` and return its identifier.
pub async fn seed_source(engine: &MemoryEngine, topology: Topology, engine_name: &str) -> &'static str {
    match topology {
        Topology::Cluster => {
            engine
                .add_database(Topology::Cluster, source_cluster(engine_name))
                .await;
            engine
                .add_cluster_member(CLUSTER_ID, source_writer(engine_name))
                .await;
            CLUSTER_ID
        }
        Topology::Instance => {
            engine
                .add_database(Topology::Instance, source_instance(engine_name))
                .await;
            INSTANCE_ID
        }
    }
}

/// Pipeline over shared fakes.
pub struct Harness {
    pub engine: Arc<MemoryEngine>,
    pub runner: Arc<MockRunner>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new(engine: MemoryEngine, runner: MockRunner) -> Self {
        Self::with_config(engine, runner, WorkflowConfig::default())
    }

    pub fn with_config(engine: MemoryEngine, runner: MockRunner, config: WorkflowConfig) -> Self {
        let engine = Arc::new(engine);
        let runner = Arc::new(runner);
        let pipeline = Pipeline::builder()
            .engine(engine.clone())
            .tag_index(engine.clone())
            .runner(runner.clone())
            .config(config)
            .build()
            .expect("pipeline should build");
        Self {
            engine,
            runner,
            pipeline,
        }
    }
}
