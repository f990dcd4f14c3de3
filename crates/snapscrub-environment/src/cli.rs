// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command line interface of the `snapscrub` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Snapscrub - Sanitized Database Snapshots
///
/// The source database, script and collaborators are configured through
/// `SNAPSCRUB_*` environment variables (or a `.env` file).
#[derive(Debug, Parser)]
#[command(name = "snapscrub")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Run one execution and print its output as JSON
    Run,

    /// Run one execution per SNAPSCRUB_SCHEDULE_SECS until Ctrl-C
    Schedule,

    /// Print the identifier of the newest snapshot of the source
    Latest,

    /// Delete the target snapshot of a finished execution
    Discard {
        /// Execution output JSON written by `run`
        output: PathBuf,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Run => "run",
            Command::Schedule => "schedule",
            Command::Latest => "latest",
            Command::Discard { .. } => "discard",
        }
    }
}
