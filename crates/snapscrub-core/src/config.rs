// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

use crate::cleanup::CleanupPolicy;
use crate::poller::WaitPolicy;

/// Where temporary databases are placed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkPlacement {
    /// Subnet group for restored databases.
    pub subnet_group: Option<String>,
    /// Security groups attached to restored databases.
    pub security_groups: Vec<String>,
}

/// Execution tuning shared by every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Readiness wait after each mutating step.
    pub wait: WaitPolicy,
    /// Retry bound for each cleanup branch.
    pub cleanup: CleanupPolicy,
    /// Network placement of the temporary database.
    pub network: NetworkPlacement,
    /// Upper bound on one sanitize script run.
    pub script_timeout: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            wait: WaitPolicy::default(),
            cleanup: CleanupPolicy::default(),
            network: NetworkPlacement::default(),
            script_timeout: Duration::from_secs(3600),
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `SNAPSCRUB_WAIT_INTERVAL_SECS`: delay between readiness polls (default: 60)
    /// - `SNAPSCRUB_WAIT_MAX_ATTEMPTS`: polls before a wait times out (default: 300)
    /// - `SNAPSCRUB_CLEANUP_INTERVAL_SECS`: delay between cleanup retries (default: 10)
    /// - `SNAPSCRUB_CLEANUP_MAX_ATTEMPTS`: attempts per cleanup branch (default: 5)
    /// - `SNAPSCRUB_SCRIPT_TIMEOUT_SECS`: sanitize script timeout (default: 3600)
    /// - `SNAPSCRUB_SUBNET_GROUP`: subnet group for the temporary database
    /// - `SNAPSCRUB_SECURITY_GROUPS`: comma-separated security group ids
    pub fn from_env() -> Result<Self, ConfigError> {
        let wait = WaitPolicy::new(
            Duration::from_secs(parse_var("SNAPSCRUB_WAIT_INTERVAL_SECS", 60)?),
            parse_var("SNAPSCRUB_WAIT_MAX_ATTEMPTS", 300)?,
        );
        let cleanup = CleanupPolicy::new(
            Duration::from_secs(parse_var("SNAPSCRUB_CLEANUP_INTERVAL_SECS", 10)?),
            parse_var("SNAPSCRUB_CLEANUP_MAX_ATTEMPTS", 5)?,
        );
        let script_timeout =
            Duration::from_secs(parse_var("SNAPSCRUB_SCRIPT_TIMEOUT_SECS", 3600)?);

        let subnet_group = std::env::var("SNAPSCRUB_SUBNET_GROUP")
            .ok()
            .filter(|s| !s.is_empty());
        let security_groups = std::env::var("SNAPSCRUB_SECURITY_GROUPS")
            .map(|s| split_list(&s))
            .unwrap_or_default();

        Ok(Self {
            wait,
            cleanup,
            network: NetworkPlacement {
                subnet_group,
                security_groups,
            },
            script_timeout,
        })
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_network(mut self, network: NetworkPlacement) -> Self {
        self.network = network;
        self
    }

    pub fn with_script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }
}

/// Split a comma-separated list, dropping empty items.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, "must be a non-negative integer")),
        _ => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required setting is missing.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A setting has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
