// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard server settings and per-client defaults.

use ipnet::IpNet;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use wish_common_wgtypes::addr;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/wg-wish/wg0.conf";
pub const DEFAULT_INTERFACE: &str = "wg0";
pub const DEFAULT_ADDRESS: &str = "10.9.8.1/24";
pub const DEFAULT_PORT: u16 = 51820;
pub const DEFAULT_DEVICE: &str = "eth0";
pub const DEFAULT_ALLOWED_IPS: &[&str] = &["0.0.0.0/0"];
pub const DEFAULT_DNS: &[&str] = &["1.1.1.1", "8.8.8.8"];
pub const DEFAULT_PERSISTENT_KEEPALIVE: u16 = 25;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct WireGuardConfig {
	/// Host name or IP clients use as their endpoint.
	pub host: String,
	pub path: PathBuf,
	pub interface: String,
	pub address: IpNet,
	pub port: u16,
	pub device: String,
	pub allowed_ips: Vec<IpNet>,
	/// `None` when configured as 0.
	pub persistent_keepalive: Option<u16>,
	pub dns: Vec<IpAddr>,
	pub tool_timeout: Duration,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireGuardConfigLayer {
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub path: Option<PathBuf>,
	#[serde(default)]
	pub interface: Option<String>,
	#[serde(default)]
	pub address: Option<String>,
	#[serde(default)]
	pub port: Option<u16>,
	#[serde(default)]
	pub device: Option<String>,
	#[serde(default)]
	pub allowed_ips: Option<Vec<String>>,
	#[serde(default)]
	pub persistent_keepalive: Option<u16>,
	#[serde(default)]
	pub dns: Option<Vec<String>>,
	#[serde(default)]
	pub tool_timeout_secs: Option<u64>,
}

fn owned(items: &[&str]) -> Vec<String> {
	items.iter().map(|s| s.to_string()).collect()
}

fn invalid(key: &str, e: impl std::fmt::Display) -> ConfigError {
	ConfigError::InvalidValue {
		key: key.to_string(),
		message: e.to_string(),
	}
}

impl WireGuardConfigLayer {
	pub fn merge(&mut self, other: WireGuardConfigLayer) {
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.path.is_some() {
			self.path = other.path;
		}
		if other.interface.is_some() {
			self.interface = other.interface;
		}
		if other.address.is_some() {
			self.address = other.address;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.device.is_some() {
			self.device = other.device;
		}
		if other.allowed_ips.is_some() {
			self.allowed_ips = other.allowed_ips;
		}
		if other.persistent_keepalive.is_some() {
			self.persistent_keepalive = other.persistent_keepalive;
		}
		if other.dns.is_some() {
			self.dns = other.dns;
		}
		if other.tool_timeout_secs.is_some() {
			self.tool_timeout_secs = other.tool_timeout_secs;
		}
	}

	/// Resolves defaults and parses addresses. Fails only on values that do
	/// not parse; cross-field rules live in `validate`.
	pub fn finalize(self) -> Result<WireGuardConfig, ConfigError> {
		let address = addr::parse_address(self.address.as_deref().unwrap_or(DEFAULT_ADDRESS))
			.map_err(|e| invalid("wireguard.address", e))?;
		let allowed_ips = addr::parse_addresses(
			&self.allowed_ips.unwrap_or_else(|| owned(DEFAULT_ALLOWED_IPS)),
		)
		.map_err(|e| invalid("wireguard.allowed_ips", e))?;
		let dns = addr::parse_ips(&self.dns.unwrap_or_else(|| owned(DEFAULT_DNS)))
			.map_err(|e| invalid("wireguard.dns", e))?;

		Ok(WireGuardConfig {
			host: self.host.unwrap_or_default(),
			path: self.path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
			interface: self
				.interface
				.unwrap_or_else(|| DEFAULT_INTERFACE.to_string()),
			address,
			port: self.port.unwrap_or(DEFAULT_PORT),
			device: self.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
			allowed_ips,
			persistent_keepalive: match self
				.persistent_keepalive
				.unwrap_or(DEFAULT_PERSISTENT_KEEPALIVE)
			{
				0 => None,
				secs => Some(secs),
			},
			dns,
			tool_timeout: Duration::from_secs(
				self.tool_timeout_secs.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
			),
		})
	}
}
