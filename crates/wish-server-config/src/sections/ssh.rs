// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Settings shared with the SSH access layer.
//!
//! Only `admin_keys` and `replace_admin_keys` are consumed by the server
//! core; the listener settings are carried for the access layer.

use serde::Deserialize;
use std::path::PathBuf;
use wish_common_wgtypes::AuthorizedKey;

use crate::error::ConfigError;

pub const DEFAULT_SSH_PORT: u16 = 51822;
pub const DEFAULT_HOST_KEY_PATH: &str = "/var/lib/wg-wish/host_ed25519";

#[derive(Debug, Clone)]
pub struct SshConfig {
	/// Listen port of the SSH access layer. Reserved; the core never binds it.
	pub port: u16,
	/// Host key of the SSH access layer. Reserved; the core never reads it.
	pub host_key_path: PathBuf,
	pub admin_keys: Vec<AuthorizedKey>,
	/// Drop stored administrators that are not listed in `admin_keys`.
	pub replace_admin_keys: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshConfigLayer {
	#[serde(default)]
	pub port: Option<u16>,
	#[serde(default)]
	pub host_key_path: Option<PathBuf>,
	/// authorized_keys lines.
	#[serde(default)]
	pub admin_keys: Option<Vec<String>>,
	#[serde(default)]
	pub replace_admin_keys: Option<bool>,
}

impl SshConfigLayer {
	pub fn merge(&mut self, other: SshConfigLayer) {
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.host_key_path.is_some() {
			self.host_key_path = other.host_key_path;
		}
		if other.admin_keys.is_some() {
			self.admin_keys = other.admin_keys;
		}
		if other.replace_admin_keys.is_some() {
			self.replace_admin_keys = other.replace_admin_keys;
		}
	}

	pub fn finalize(self) -> Result<SshConfig, ConfigError> {
		let admin_keys = self
			.admin_keys
			.unwrap_or_default()
			.iter()
			.filter(|line| !line.trim().is_empty())
			.enumerate()
			.map(|(i, line)| {
				line.parse::<AuthorizedKey>()
					.map_err(|e| ConfigError::InvalidValue {
						key: format!("ssh.admin_keys[{i}]"),
						message: e.to_string(),
					})
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(SshConfig {
			port: self.port.unwrap_or(DEFAULT_SSH_PORT),
			host_key_path: self
				.host_key_path
				.unwrap_or_else(|| PathBuf::from(DEFAULT_HOST_KEY_PATH)),
			admin_keys,
			replace_admin_keys: self.replace_admin_keys.unwrap_or(false),
		})
	}
}
