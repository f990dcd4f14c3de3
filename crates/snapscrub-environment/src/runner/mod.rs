// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runner module - sanitize script execution backends.

mod container;

pub use container::{ContainerRunner, ContainerRunnerConfig};
