// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Snapscrub Core - Sanitized Snapshot Workflow Engine
//!
//! This crate sequences the production of a sanitized, shareable snapshot of a
//! relational database: snapshot the source, optionally re-encrypt, restore
//! into a throwaway database, run an operator script against it, snapshot the
//! result and tear every temporary resource down again, even on failure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Trigger (snapscrub binary, worker)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ ExecutionInput
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pipeline (This Crate)                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │  Parameter  │  │  Readiness  │  │   Cleanup   │  │  Retention  │     │
//! │  │  Resolver   │  │   Poller    │  │ Coordinator │  │   Pruner    │     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                     │                          │
//!           ▼                     ▼                          ▼
//! ┌───────────────────┐ ┌───────────────────┐ ┌─────────────────────────────┐
//! │  DatabaseEngine   │ │     TagIndex      │ │        ScriptRunner         │
//! │ (snapshots, DBs)  │ │  (tagged ARNs)    │ │  (mysql / psql client)      │
//! └───────────────────┘ └───────────────────┘ └─────────────────────────────┘
//! ```
//!
//! Collaborators are trait objects handed to [`Pipeline::builder()`]; the
//! in-memory [`engine::MemoryEngine`] and [`runner::MockRunner`] back the
//! tests.
//!
//! # Execution State Machine
//!
//! ```text
//!   RESOLVE ─► CREATE_SOURCE_SNAPSHOT ─► WAIT_SNAPSHOT
//!                                           │
//!              ┌──── re-encrypt? ───────────┤
//!              ▼                            │
//!   REENCRYPT_SNAPSHOT ─► WAIT_REENCRYPT ───┤
//!                                           ▼
//!   RESTORE_DATABASE ─► WAIT_DATABASE ─► SET_TEMP_PASSWORD ─► WAIT_PASSWORD_APPLIED
//!                                                                   │
//!              ┌──────────── cluster ──────────────┬──── instance ───┤
//!              ▼                                   ▼                 │
//!   CREATE_TEMP_INSTANCE ─► WAIT_INSTANCE    FETCH_INSTANCE_ENDPOINT │
//!              │                                   │                 │
//!              ▼                                   │                 │
//!   FETCH_CLUSTER_ENDPOINT ────────────────────────┴─────────────────┘
//!              │
//!              ▼
//!   SANITIZE ─► CREATE_FINAL_SNAPSHOT ─► WAIT_FINAL_SNAPSHOT ─► [PRUNE_OLD]
//!                                                                   │
//!   any failure after RESOLVE ──────────────────────────────► CLEANUP ─► DONE | FAILED
//! ```
//!
//! # Readiness
//!
//! | Outcome | Meaning | Wait loop |
//! |---------|---------|-----------|
//! | `Ready` | `available` and nothing pending | returns |
//! | `NotReady` | still transitioning | sleeps, polls again |
//! | `Failed` | missing, or status contains a fatal marker | `OperationFailed` |
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SNAPSCRUB_WAIT_INTERVAL_SECS` | `60` | Delay between readiness polls |
//! | `SNAPSCRUB_WAIT_MAX_ATTEMPTS` | `300` | Polls before `WaitTimeout` |
//! | `SNAPSCRUB_CLEANUP_INTERVAL_SECS` | `10` | Delay between cleanup retries |
//! | `SNAPSCRUB_CLEANUP_MAX_ATTEMPTS` | `5` | Attempts per cleanup branch |
//! | `SNAPSCRUB_SCRIPT_TIMEOUT_SECS` | `3600` | Sanitize script timeout |
//! | `SNAPSCRUB_SUBNET_GROUP` | - | Subnet group of the temporary database |
//! | `SNAPSCRUB_SECURITY_GROUPS` | - | Comma-separated security groups |
//!
//! # Modules
//!
//! - [`context`]: Execution input, per-execution context and output
//! - [`naming`]: Identifier generation and validation
//! - [`engine`]: Database engine and tag index traits, in-memory engine
//! - [`runner`]: Script runner trait and mock runner
//! - [`resolver`]: Source inspection and parameter derivation
//! - [`poller`]: Single-read readiness checks and bounded waits
//! - [`pipeline`]: State plan and sequencer
//! - [`cleanup`]: Concurrent, independently retried teardown
//! - [`retention`]: Pruning of old sanitized snapshots
//! - [`finder`]: Latest-snapshot lookup and target snapshot disposal
//! - [`config`]: Wait, cleanup and placement settings
//! - [`error`]: Error taxonomy with stable codes

/// Wait, cleanup and placement settings loaded from environment variables.
pub mod config;

/// Execution input, context and output types.
pub mod context;

/// Error taxonomy with stable machine codes.
pub mod error;

/// Identifier generation and naming rules.
pub mod naming;

/// Database engine and tag index abstractions.
pub mod engine;

/// Sanitize script runners.
pub mod runner;

/// Parameter resolution against the source database.
pub mod resolver;

/// Readiness polling and bounded waits.
pub mod poller;

/// Pipeline plan and sequencer.
pub mod pipeline;

/// Teardown of temporary resources.
pub mod cleanup;

/// Retention pruning of sanitized snapshots.
pub mod retention;

/// Snapshot lookup helpers.
pub mod finder;

pub use config::WorkflowConfig;
pub use context::{EngineFamily, ExecutionInput, ExecutionOutput, Topology, WorkflowContext};
pub use error::{Result, WorkflowError};
pub use pipeline::{ExecutionReport, Pipeline, PipelinePlan, PipelineState};
