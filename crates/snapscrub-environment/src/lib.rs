// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Snapscrub Environment - Collaborator Bindings and Binary
//!
//! This crate connects the snapscrub-core pipeline to the outside world: the
//! relational database service through the `aws` command line client, the
//! sanitize script through a database client container, and a scheduler that
//! triggers executions periodically.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    snapscrub binary (run, schedule, ...)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  snapscrub-environment (This Crate)                      │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │   Config    │  │   Runtime   │  │  Schedule   │  │  Container  │     │
//! │  │  (env vars) │  │             │  │   Worker    │  │   Runner    │     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                 │                              │
//!           │                 ▼                              ▼
//!           │       ┌───────────────────┐        ┌─────────────────────────┐
//!           │       │  snapscrub-core   │        │  mysql / psql client    │
//!           │       │     Pipeline      │        │  (docker run --rm -i)   │
//!           │       └───────────────────┘        └─────────────────────────┘
//!           │                 │
//!           ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                    AwsCliEngine (aws rds, tagging API)                 │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | One execution; prints the execution output as JSON |
//! | `schedule` | One execution per interval until Ctrl-C |
//! | `latest` | Identifier of the newest snapshot of the source |
//! | `discard <output.json>` | Delete the target snapshot of an execution |
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SNAPSCRUB_DATABASE_ID` | required | Source cluster or instance |
//! | `SNAPSCRUB_IS_CLUSTER` | `false` | Source is a cluster |
//! | `SNAPSCRUB_DATABASE_KEY` | - | Expected source encryption key |
//! | `SNAPSCRUB_SNAPSHOT_KEY` | - | Re-encrypt the temporary snapshot under this key |
//! | `SNAPSCRUB_SNAPSHOT_PREFIX` | source id | Prefix of the target snapshot |
//! | `SNAPSCRUB_TEMP_PREFIX` | `sanitize` | Prefix of temporary resources |
//! | `SNAPSCRUB_HISTORY_LIMIT` | - | Sanitized snapshots to keep |
//! | `SNAPSCRUB_SCRIPT` / `SNAPSCRUB_SCRIPT_FILE` | - | Sanitize script |
//! | `SNAPSCRUB_SCHEDULE_SECS` | - | Interval of `schedule` |
//! | `SNAPSCRUB_AWS_CLI` | `aws` | aws client command line |
//! | `SNAPSCRUB_AWS_TIMEOUT_SECS` | `300` | Timeout of one aws call |
//! | `AWS_REGION` | CLI default | Region |
//! | `SNAPSCRUB_CONTAINER_CLI` | `docker` | Container client command line |
//! | `SNAPSCRUB_MYSQL_IMAGE` | `mysql:8.0` | Image with the `mysql` client |
//! | `SNAPSCRUB_POSTGRES_IMAGE` | `postgres:16` | Image with the `psql` client |
//! | `SNAPSCRUB_NETWORK` | - | Network of the client container |
//!
//! Wait, cleanup and placement variables are documented in `snapscrub_core`.

/// Command line interface of the binary.
pub mod cli;

/// Configuration loaded from environment variables.
pub mod config;

/// Error types.
pub mod error;

/// aws CLI database engine.
pub mod engine;

/// Container script runner.
pub mod runner;

/// Periodic execution trigger.
pub mod schedule_worker;

/// Embeddable runtime.
pub mod runtime;

pub use config::Config;
pub use error::{Error, Result};
