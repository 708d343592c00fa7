// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Orchestration of administrator keys and WireGuard clients.
//!
//! Each operation runs inside one store transaction and keeps the
//! interface controller in step with what was committed.

pub mod error;
pub mod publickey;
pub mod wireguard;

pub use error::{Domain, ErrorKind, Result, ServiceError, GENERIC_MESSAGE};
pub use publickey::PublicKeyService;
pub use wireguard::{
	AddClientOptions, ClientInfo, WireGuardService, WireGuardServiceParams, SERVER_PEER_NAME,
};
