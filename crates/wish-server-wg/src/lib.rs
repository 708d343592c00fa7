// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Controller for the server's WireGuard interface.

pub mod controller;
pub mod error;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod tools;

pub use controller::{
	ControllerOp, ControllerParams, InterfaceController, StagedPeer, DEFAULT_INTERFACE,
};
pub use error::{Result, WgError};
pub use stats::{parse_dump, PeerStats, StatsMap};
pub use tools::{WgQuickTools, WgTools, DEFAULT_TOOL_TIMEOUT};
