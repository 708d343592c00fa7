// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;

use crate::sections::{DatabaseConfigLayer, LoggingConfigLayer, SshConfigLayer, WireGuardConfigLayer};

/// One source's partial view of the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub wireguard: Option<WireGuardConfigLayer>,
	#[serde(default)]
	pub ssh: Option<SshConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

fn merge_section<T: Default>(slot: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	if let Some(other) = other {
		merge(slot.get_or_insert_with(T::default), other);
	}
}

impl ServerConfigLayer {
	/// Overlays `other` on top of `self`; set fields in `other` win.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.wireguard, other.wireguard, WireGuardConfigLayer::merge);
		merge_section(&mut self.ssh, other.ssh, SshConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_is_field_wise() {
		let mut base: ServerConfigLayer = toml::from_str(
			r#"
			[wireguard]
			host = "vpn.example.com"
			port = 51000
			"#,
		)
		.unwrap();
		let over: ServerConfigLayer = toml::from_str(
			r#"
			[wireguard]
			port = 52000
			[logging]
			format = "json"
			"#,
		)
		.unwrap();

		base.merge(over);

		let wg = base.wireguard.unwrap();
		assert_eq!(wg.host.as_deref(), Some("vpn.example.com"));
		assert_eq!(wg.port, Some(52000));
		assert!(base.logging.is_some());
		assert!(base.database.is_none());
	}
}
