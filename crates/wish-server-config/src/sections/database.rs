// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Record store location.

use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_DATABASE_PATH: &str = "/var/lib/wg-wish/wg-wish.db";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
	pub path: PathBuf,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			path: PathBuf::from(DEFAULT_DATABASE_PATH),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfigLayer {
	#[serde(default)]
	pub path: Option<PathBuf>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: DatabaseConfigLayer) {
		if other.path.is_some() {
			self.path = other.path;
		}
	}

	pub fn finalize(self) -> DatabaseConfig {
		DatabaseConfig {
			path: self.path.unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_path() {
		let config = DatabaseConfigLayer::default().finalize();
		assert_eq!(config.path, PathBuf::from("/var/lib/wg-wish/wg-wish.db"));
	}

	#[test]
	fn test_merge_overrides() {
		let mut layer = DatabaseConfigLayer {
			path: Some("/a.db".into()),
		};
		layer.merge(DatabaseConfigLayer { path: None });
		assert_eq!(layer.path, Some(PathBuf::from("/a.db")));
		layer.merge(DatabaseConfigLayer {
			path: Some("/b.db".into()),
		});
		assert_eq!(layer.finalize().path, PathBuf::from("/b.db"));
	}
}
