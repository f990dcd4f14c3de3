// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database engine implementations.

mod aws_cli;
mod wire;

pub use aws_cli::{AwsCliConfig, AwsCliEngine};
