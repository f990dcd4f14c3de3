// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock runner for testing.
//!
//! Records every request and answers with a canned outcome instead of
//! connecting to a database.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::traits::*;

/// Request as seen by the mock, without the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub family: crate::context::EngineFamily,
    pub endpoint: String,
    pub port: u16,
    pub user: String,
    pub database: String,
    pub script: String,
    /// Whether a non-empty password was supplied.
    pub has_password: bool,
}

/// Mock runner for testing.
pub struct MockRunner {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    /// Optional delay to simulate execution time (in milliseconds)
    pub execution_delay_ms: u64,
    /// If true, scripts exit with code 1
    pub fail_by_default: bool,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            execution_delay_ms: 10,
            fail_by_default: false,
        }
    }

    /// Create a mock runner whose scripts always fail.
    pub fn failing() -> Self {
        Self {
            fail_by_default: true,
            ..Self::new()
        }
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ScriptRunner for MockRunner {
    fn runner_type(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, request: &ScriptRequest) -> Result<ScriptOutcome> {
        let start = std::time::Instant::now();

        self.requests.lock().await.push(RecordedRequest {
            family: request.family,
            endpoint: request.endpoint.clone(),
            port: request.port,
            user: request.user.clone(),
            database: request.database.clone(),
            script: request.script.clone(),
            has_password: !request.password.is_empty(),
        });

        // Simulate execution
        if self.execution_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.execution_delay_ms)).await;
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        if self.fail_by_default {
            Ok(ScriptOutcome {
                success: false,
                exit_code: Some(1),
                stderr: Some("Mock failure".to_string()),
                duration_ms,
            })
        } else {
            Ok(ScriptOutcome {
                success: true,
                exit_code: Some(0),
                stderr: None,
                duration_ms,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineFamily;
    use std::time::Duration;

    fn test_request() -> ScriptRequest {
        ScriptRequest {
            family: EngineFamily::Postgres,
            endpoint: "tmp.cluster.local".to_string(),
            port: 5432,
            user: "admin".to_string(),
            password: "0123456789abcdef0123456789abcdef".to_string(),
            database: "orders".to_string(),
            script: "update users set email = null".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_mock_runner_run_success() {
        let runner = MockRunner::new();
        let result = runner.run(&test_request()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stderr.is_none());
    }

    #[tokio::test]
    async fn test_mock_runner_run_failure() {
        let runner = MockRunner::failing();
        let result = runner.run(&test_request()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(1));
        assert!(result.stderr.is_some());
    }

    #[tokio::test]
    async fn test_mock_runner_records_requests_without_password() {
        let runner = MockRunner::new();
        runner.run(&test_request()).await.unwrap();

        let requests = runner.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].family, EngineFamily::Postgres);
        assert_eq!(requests[0].database, "orders");
        assert!(requests[0].has_password);
    }

    #[test]
    fn test_request_debug_redacts_password() {
        let rendered = format!("{:?}", test_request());
        assert!(!rendered.contains("0123456789abcdef0123456789abcdef"));
    }
}
