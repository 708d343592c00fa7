// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the wg-wish server.
//!
//! Layers are merged in order of [`Precedence`]: built-in defaults, then a
//! TOML file, then `WGWISH_*` environment variables.
//!
//! ```ignore
//! let config = wish_server_config::load_config(None)?;
//! println!("clients connect to {}:{}", config.wireguard.host, config.wireguard.port);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::path::PathBuf;
use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub database: DatabaseConfig,
	pub wireguard: WireGuardConfig,
	pub ssh: SshConfig,
	pub logging: LoggingConfig,
}

/// Loads configuration from defaults, the TOML file and the environment.
///
/// `config_path` replaces the system file and must exist when given.
pub fn load_config(config_path: Option<PathBuf>) -> Result<ServerConfig, ConfigError> {
	let toml = match config_path {
		Some(path) => TomlSource::new(path),
		None => TomlSource::system(),
	};
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(toml),
		Box::new(EnvSource::default()),
	])
}

pub fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		database: layer.database.unwrap_or_default().finalize(),
		wireguard: layer.wireguard.unwrap_or_default().finalize()?,
		ssh: layer.ssh.unwrap_or_default().finalize()?,
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate(&config)?;

	info!(
		database = %config.database.path.display(),
		host = %config.wireguard.host,
		address = %config.wireguard.address,
		port = config.wireguard.port,
		interface = %config.wireguard.interface,
		admin_keys = config.ssh.admin_keys.len(),
		"server configuration loaded"
	);

	Ok(config)
}

/// Cross-field and range rules that parsing alone does not catch.
pub fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
	let wg = &config.wireguard;
	if wg.host.trim().is_empty() {
		return Err(ConfigError::Validation(
			"wireguard.host is required (set it in the config file or WGWISH_WIREGUARD_HOST)"
				.to_string(),
		));
	}
	if wg.port == 0 {
		return Err(ConfigError::Validation("wireguard.port must be non-zero".to_string()));
	}
	if wg.interface.is_empty() {
		return Err(ConfigError::Validation("wireguard.interface must not be empty".to_string()));
	}
	if config.ssh.port == 0 {
		return Err(ConfigError::Validation("ssh.port must be non-zero".to_string()));
	}
	if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
		return Err(ConfigError::Validation(format!(
			"logging.level must be one of {}, got '{}'",
			LOG_LEVELS.join(", "),
			config.logging.level
		)));
	}
	Ok(())
}
