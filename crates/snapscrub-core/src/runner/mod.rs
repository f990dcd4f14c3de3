// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runner module - sanitize script execution backends.

pub mod mock;
mod traits;

pub use mock::MockRunner;
pub use traits::*;
