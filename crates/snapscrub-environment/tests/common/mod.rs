// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for snapscrub-environment tests.
//!
//! External clients (`aws`, `docker`) are replaced by `sh -c <script>`. The
//! script records its stdin and arguments in a temporary directory before
//! running the test-specific body.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A fake command line client living in a temporary directory.
pub struct FakeCli {
    dir: TempDir,
    script: String,
}

impl FakeCli {
    /// Fake client running `body` after recording its input.
    ///
    /// `body` can write further files under `$dir`.
    pub fn new(body: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().display();
        let script = format!(
            "dir='{path}'; cat > \"$dir/stdin\"; printf '%s\\n' \"$@\" > \"$dir/args\"; {body}"
        );
        Self { dir, script }
    }

    /// Fake client running `body` alone, leaving stdin to the body.
    pub fn unrecorded(body: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        Self {
            dir,
            script: body.to_string(),
        }
    }

    /// Fake client printing `json` on stdout.
    pub fn responding(json: &str) -> Self {
        Self::new(&format!("cat <<'JSON'\n{json}\nJSON"))
    }

    /// Fake client failing like the aws CLI does for a service error.
    pub fn service_error(code: &str) -> Self {
        Self::new(&format!(
            "echo 'An error occurred ({code}) when calling the Operation operation: denied' >&2; exit 254"
        ))
    }

    /// Program to spawn.
    pub fn program(&self) -> String {
        "sh".to_string()
    }

    /// Arguments placed before the real client arguments.
    pub fn args(&self) -> Vec<String> {
        vec!["-c".to_string(), self.script.clone(), "fake".to_string()]
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Arguments the client received, one per entry.
    pub fn recorded_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.file("args"))
            .expect("args recorded")
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Raw stdin the client received.
    pub fn recorded_stdin(&self) -> String {
        std::fs::read_to_string(self.file("stdin")).expect("stdin recorded")
    }

    /// Stdin parsed as a JSON request document.
    pub fn recorded_request(&self) -> serde_json::Value {
        serde_json::from_str(&self.recorded_stdin()).expect("request is JSON")
    }
}
