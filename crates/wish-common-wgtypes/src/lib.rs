// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared WireGuard types: keys, CIDR arithmetic, config files and
//! administrator credentials.

pub mod addr;
pub mod authorized_key;
pub mod config;
pub mod keys;

pub use addr::AddrError;
pub use authorized_key::{AuthorizedKey, AuthorizedKeyError};
pub use config::{
	ClientConfig, ClientInterface, ClientPeer, ConfigError, ServerConfig, ServerConfigParams,
	ServerInterface, ServerPeer, DEFAULT_LISTEN_PORT,
};
pub use keys::{KeyError, WgKeyPair, WgPrivateKey, WgPublicKey, KEY_LEN};
