// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session hosts.
//!
//! - [`BridgeHost`]: a real browser reached through an HTTP bridge
//! - [`MockHost`]: scripted in-memory host for tests

mod bridge;
pub mod mock;
mod traits;

pub use bridge::BridgeHost;
pub use mock::{HostCall, MockHost, MockPage};
pub use traits::*;
