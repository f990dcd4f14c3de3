// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for snapscrub-core.
//!
//! Every fatal condition of an execution maps to one [`WorkflowError`]
//! variant. "Not ready yet" is deliberately absent: it is a
//! [`PollOutcome`](crate::poller::PollOutcome), not an error.

use thiserror::Error;

use crate::engine::EngineError;
use crate::naming::NamingViolation;
use crate::runner::RunnerError;

/// Result type using WorkflowError
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors that terminate an execution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkflowError {
    /// A describe call returned zero or several matches, or a required
    /// attribute was missing from the match.
    #[error("Not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// The caller-supplied encryption key does not match the source.
    #[error("Database key ({actual}) doesn't match database_key parameter ({expected})")]
    ConfigMismatch {
        /// Key supplied by the caller.
        expected: String,
        /// Key reported by the source database.
        actual: String,
    },

    /// The source engine is neither MySQL- nor Postgres-compatible.
    #[error("\"{engine}\" is not a supported database engine")]
    UnsupportedEngine {
        /// Engine identifier reported by the source.
        engine: String,
    },

    /// A generated identifier violates the naming rules.
    #[error(
        "\"{field}\" {reason}. Try adjusting 'temp_prefix' and/or 'snapshot_prefix'. Current value: {value}"
    )]
    InvalidIdentifier {
        /// Context field holding the identifier.
        field: &'static str,
        /// Offending identifier.
        value: String,
        /// Which rule was broken.
        reason: NamingViolation,
    },

    /// A resource reached a terminal non-available status.
    #[error("Operation on {resource} failed with status '{status}'")]
    OperationFailed {
        /// Resource that failed.
        resource: String,
        /// Status (or reason) reported by the poll.
        status: String,
    },

    /// A wait exhausted its attempt budget.
    #[error("Timed out waiting for {resource} after {attempts} attempts")]
    WaitTimeout {
        /// Resource being waited on.
        resource: String,
        /// Number of polls performed.
        attempts: u32,
    },

    /// The sanitize script exited unsuccessfully.
    #[error("Sanitize script failed (exit code {exit_code:?}): {stderr}")]
    ScriptFailed {
        /// Process exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The temp endpoint was read before it was fetched.
    #[error("Temporary database endpoint is not known yet")]
    EndpointUnknown,

    /// A collaborator call failed at the transport level or was rejected.
    #[error("Engine error during '{operation}': {details}")]
    Engine {
        /// Engine operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// The tag index returned nothing to prune.
    #[error("No snapshots of type '{resource_type}' matched the retention tags")]
    NoMatches {
        /// Tag index resource type that was queried.
        resource_type: String,
    },

    /// The script runner failed outside of a normal script exit.
    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),
}

impl WorkflowError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ConfigMismatch { .. } => "CONFIG_MISMATCH",
            Self::UnsupportedEngine { .. } => "UNSUPPORTED_ENGINE",
            Self::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
            Self::OperationFailed { .. } => "OPERATION_FAILED",
            Self::WaitTimeout { .. } => "WAIT_TIMEOUT",
            Self::ScriptFailed { .. } => "SCRIPT_FAILED",
            Self::EndpointUnknown => "ENDPOINT_UNKNOWN",
            Self::Engine { .. } => "ENGINE_ERROR",
            Self::NoMatches { .. } => "NO_MATCHES",
            Self::Runner(_) => "RUNNER_ERROR",
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

impl From<EngineError> for WorkflowError {
    fn from(err: EngineError) -> Self {
        WorkflowError::Engine {
            operation: err.operation().to_string(),
            details: err.to_string(),
        }
    }
}
