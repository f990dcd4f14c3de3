// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Parameter resolution.
//!
//! Inspects the source database once, derives every identifier and
//! credential of the execution and validates naming rules. Only describe
//! calls are issued here.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::context::{
    EngineFamily, ExecutionInput, ResolvedParameters, TempCredentials, Topology, WorkflowContext,
};
use crate::engine::{DatabaseEngine, DatabaseInfo};
use crate::error::{Result, WorkflowError};
use crate::naming::{self, DEFAULT_TEMP_PREFIX, TempNames};

/// Builds a [`WorkflowContext`] from an execution input.
#[derive(Clone)]
pub struct ParameterResolver {
    engine: Arc<dyn DatabaseEngine>,
}

impl ParameterResolver {
    pub fn new(engine: Arc<dyn DatabaseEngine>) -> Self {
        Self { engine }
    }

    /// Resolve using the current time for the target snapshot id.
    pub async fn resolve(&self, input: &ExecutionInput, execution_id: Uuid) -> Result<WorkflowContext> {
        self.resolve_at(input, execution_id, Utc::now()).await
    }

    /// Resolve with an explicit timestamp for the target snapshot id.
    #[instrument(skip(self, input, now), fields(database_id = %input.database_identifier))]
    pub async fn resolve_at(
        &self,
        input: &ExecutionInput,
        execution_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<WorkflowContext> {
        let topology = input.topology();
        let source = self
            .describe_one(topology, &input.database_identifier)
            .await?;

        let port = source.port.ok_or_else(|| {
            WorkflowError::not_found(format!("port of {} {}", topology, source.identifier))
        })?;
        let user = source.master_username.clone().ok_or_else(|| {
            WorkflowError::not_found(format!(
                "master username of {} {}",
                topology, source.identifier
            ))
        })?;
        if source.engine.is_empty() {
            return Err(WorkflowError::not_found(format!(
                "engine of {} {}",
                topology, source.identifier
            )));
        }
        let database = source
            .database_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| user.clone());

        if let Some(expected) = input.expected_key() {
            let actual = source.kms_key_id.as_deref().unwrap_or_default();
            if actual != expected {
                return Err(WorkflowError::ConfigMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        let instance_class = self.instance_class(topology, &source).await?;
        let family = EngineFamily::classify(&source.engine)?;

        let snapshot_prefix = input
            .snapshot_prefix
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&input.database_identifier);
        let target_snapshot_id = naming::target_snapshot_id(snapshot_prefix, now);

        let temp_prefix = input
            .temp_prefix
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_TEMP_PREFIX);
        let names = TempNames::new(temp_prefix, &naming::random_suffix());
        names.validate()?;
        naming::check_identifier("target_snapshot_id", &target_snapshot_id)?;

        let credentials = TempCredentials {
            user,
            password: naming::random_password(),
            port,
            database,
        };

        info!(
            execution_id = %execution_id,
            topology = %topology,
            engine = %source.engine,
            family = %family,
            temp_db_id = %names.database,
            target_snapshot_id = %target_snapshot_id,
            "Resolved execution parameters"
        );

        Ok(WorkflowContext::new(ResolvedParameters {
            execution_id,
            database_identifier: input.database_identifier.clone(),
            topology,
            engine: source.engine.clone(),
            family,
            kms_key_id: source.kms_key_id.clone(),
            reencrypt_key: input.reencrypt_key().map(str::to_string),
            names,
            temp_db_instance_class: instance_class,
            target_snapshot_id,
            credentials,
        }))
    }

    async fn describe_one(&self, topology: Topology, database_id: &str) -> Result<DatabaseInfo> {
        let mut found = self
            .engine
            .describe_databases(topology, database_id)
            .await?;
        if found.len() != 1 {
            debug!(matches = found.len(), "Unexpected number of databases");
            return Err(WorkflowError::not_found(format!("{topology} {database_id}")));
        }
        Ok(found.remove(0))
    }

    /// Compute class of the source; clusters report it on their first member.
    async fn instance_class(&self, topology: Topology, source: &DatabaseInfo) -> Result<String> {
        let class = match topology {
            Topology::Instance => source.instance_class.clone(),
            Topology::Cluster => {
                let member = source.members.first().ok_or_else(|| {
                    WorkflowError::not_found(format!("members of cluster {}", source.identifier))
                })?;
                self.describe_one(Topology::Instance, member)
                    .await?
                    .instance_class
            }
        };
        class
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                WorkflowError::not_found(format!(
                    "instance class of {} {}",
                    topology, source.identifier
                ))
            })
    }
}
