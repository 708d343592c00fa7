// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and environment
//! variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, LogFormat, LoggingConfigLayer, SshConfigLayer, WireGuardConfigLayer,
};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/wg-wish/server.toml";
pub const ENV_PREFIX: &str = "WGWISH_";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Contributes nothing; every default lives in the sections' `finalize`.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

pub struct TomlSource {
	path: PathBuf,
	required: bool,
}

impl TomlSource {
	/// A file the operator named explicitly; it must exist.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			required: true,
		}
	}

	/// The system-wide file, skipped when absent.
	pub fn system() -> Self {
		Self {
			path: PathBuf::from(SYSTEM_CONFIG_PATH),
			required: false,
		}
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.required && !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `WGWISH_<SECTION>_<FIELD>`. List values are comma separated,
/// except `WGWISH_SSH_ADMIN_KEYS` which takes one authorized_keys line per
/// line.
pub struct EnvSource {
	lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl Default for EnvSource {
	fn default() -> Self {
		Self::with_lookup(|name| std::env::var(name).ok())
	}
}

impl EnvSource {
	pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
		Self {
			lookup: Box::new(lookup),
		}
	}

	fn var(&self, field: &str) -> Option<String> {
		(self.lookup)(&format!("{ENV_PREFIX}{field}")).filter(|s| !s.is_empty())
	}

	fn bool(&self, field: &str) -> Option<bool> {
		self.var(field)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parsed<T: std::str::FromStr>(&self, field: &str, what: &str) -> Result<Option<T>, ConfigError> {
		match self.var(field) {
			Some(v) => v.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: format!("{ENV_PREFIX}{field}"),
				message: format!("invalid {what} value '{v}'"),
			}),
			None => Ok(None),
		}
	}

	fn list(&self, field: &str, sep: char) -> Option<Vec<String>> {
		self.var(field).map(|v| {
			v.split(sep)
				.map(|s| s.trim().to_string())
				.filter(|s| !s.is_empty())
				.collect()
		})
	}

	fn load_database(&self) -> DatabaseConfigLayer {
		DatabaseConfigLayer {
			path: self.var("DATABASE_PATH").map(PathBuf::from),
		}
	}

	fn load_wireguard(&self) -> Result<WireGuardConfigLayer, ConfigError> {
		Ok(WireGuardConfigLayer {
			host: self.var("WIREGUARD_HOST"),
			path: self.var("WIREGUARD_PATH").map(PathBuf::from),
			interface: self.var("WIREGUARD_INTERFACE"),
			address: self.var("WIREGUARD_ADDRESS"),
			port: self.parsed("WIREGUARD_PORT", "u16")?,
			device: self.var("WIREGUARD_DEVICE"),
			allowed_ips: self.list("WIREGUARD_ALLOWED_IPS", ','),
			persistent_keepalive: self.parsed("WIREGUARD_PERSISTENT_KEEPALIVE", "u16")?,
			dns: self.list("WIREGUARD_DNS", ','),
			tool_timeout_secs: self.parsed("WIREGUARD_TOOL_TIMEOUT_SECS", "u64")?,
		})
	}

	fn load_ssh(&self) -> Result<SshConfigLayer, ConfigError> {
		Ok(SshConfigLayer {
			port: self.parsed("SSH_PORT", "u16")?,
			host_key_path: self.var("SSH_HOST_KEY_PATH").map(PathBuf::from),
			admin_keys: self.list("SSH_ADMIN_KEYS", '\n'),
			replace_admin_keys: self.bool("SSH_REPLACE_ADMIN_KEYS"),
		})
	}

	fn load_logging(&self) -> Result<LoggingConfigLayer, ConfigError> {
		let format = match self.var("LOGGING_FORMAT") {
			Some(v) => Some(LogFormat::parse(&v).ok_or_else(|| ConfigError::InvalidValue {
				key: format!("{ENV_PREFIX}LOGGING_FORMAT"),
				message: format!("expected 'pretty' or 'json', got '{v}'"),
			})?),
			None => None,
		};
		Ok(LoggingConfigLayer {
			level: self.var("LOGGING_LEVEL"),
			format,
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			database: Some(self.load_database()),
			wireguard: Some(self.load_wireguard()?),
			ssh: Some(self.load_ssh()?),
			logging: Some(self.load_logging()?),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn env(vars: &[(&str, &str)]) -> EnvSource {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		EnvSource::with_lookup(move |name| vars.get(name).cloned())
	}

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.wireguard.is_none());
		assert!(layer.database.is_none());
	}

	#[test]
	fn test_system_toml_missing_file_is_skipped() {
		let source = TomlSource {
			path: PathBuf::from("/nonexistent/server.toml"),
			required: false,
		};
		assert!(source.load().unwrap().wireguard.is_none());
	}

	#[test]
	fn test_explicit_toml_missing_file_is_an_error() {
		let source = TomlSource::new("/nonexistent/server.toml");
		assert!(matches!(source.load(), Err(ConfigError::FileRead { .. })));
	}

	#[test]
	fn test_env_fields() {
		let layer = env(&[
			("WGWISH_WIREGUARD_HOST", "vpn.example.com"),
			("WGWISH_WIREGUARD_PORT", "51000"),
			("WGWISH_WIREGUARD_DNS", "9.9.9.9, 149.112.112.112"),
			("WGWISH_SSH_REPLACE_ADMIN_KEYS", "true"),
			("WGWISH_LOGGING_FORMAT", "json"),
			("WGWISH_DATABASE_PATH", ""),
		])
		.load()
		.unwrap();

		let wg = layer.wireguard.unwrap();
		assert_eq!(wg.host.as_deref(), Some("vpn.example.com"));
		assert_eq!(wg.port, Some(51000));
		assert_eq!(
			wg.dns,
			Some(vec!["9.9.9.9".to_string(), "149.112.112.112".to_string()])
		);
		assert_eq!(layer.ssh.unwrap().replace_admin_keys, Some(true));
		assert_eq!(layer.logging.unwrap().format, Some(LogFormat::Json));
		assert_eq!(layer.database.unwrap().path, None);
	}

	#[test]
	fn test_env_bad_number() {
		let err = env(&[("WGWISH_WIREGUARD_PORT", "lots")]).load().unwrap_err();
		assert!(err.to_string().contains("WGWISH_WIREGUARD_PORT"));
	}

	#[test]
	fn test_env_bad_format() {
		let err = env(&[("WGWISH_LOGGING_FORMAT", "xml")]).load().unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { .. }));
	}
}
