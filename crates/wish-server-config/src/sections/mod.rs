// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod database;
mod logging;
mod ssh;
mod wireguard;

pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer, LOG_LEVELS};
pub use ssh::{SshConfig, SshConfigLayer};
pub use wireguard::{WireGuardConfig, WireGuardConfigLayer};
