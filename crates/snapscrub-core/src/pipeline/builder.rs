// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Builder for [`Pipeline`].

use std::sync::Arc;

use super::Pipeline;
use crate::cleanup::CleanupCoordinator;
use crate::config::{ConfigError, WorkflowConfig};
use crate::engine::{DatabaseEngine, TagIndex};
use crate::poller::ReadinessPoller;
use crate::resolver::ParameterResolver;
use crate::retention::RetentionPruner;
use crate::runner::ScriptRunner;

/// Builder for creating a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    engine: Option<Arc<dyn DatabaseEngine>>,
    tag_index: Option<Arc<dyn TagIndex>>,
    runner: Option<Arc<dyn ScriptRunner>>,
    config: WorkflowConfig,
}

impl PipelineBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database engine (required).
    pub fn engine(mut self, engine: Arc<dyn DatabaseEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the tag index used for retention (required).
    pub fn tag_index(mut self, tag_index: Arc<dyn TagIndex>) -> Self {
        self.tag_index = Some(tag_index);
        self
    }

    /// Set the sanitize script runner (required).
    pub fn runner(mut self, runner: Arc<dyn ScriptRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Set wait, cleanup and placement settings.
    ///
    /// Default: [`WorkflowConfig::default()`]
    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if a collaborator is missing.
    pub fn build(self) -> Result<Pipeline, ConfigError> {
        let engine = self.engine.ok_or(ConfigError::Missing("engine"))?;
        let tag_index = self.tag_index.ok_or(ConfigError::Missing("tag_index"))?;
        let runner = self.runner.ok_or(ConfigError::Missing("runner"))?;

        Ok(Pipeline {
            resolver: ParameterResolver::new(engine.clone()),
            poller: ReadinessPoller::new(engine.clone()),
            cleanup: CleanupCoordinator::new(engine.clone(), self.config.cleanup),
            pruner: RetentionPruner::new(engine.clone(), tag_index),
            engine,
            runner,
            config: self.config,
        })
    }
}
