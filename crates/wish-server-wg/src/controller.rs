// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Owner of the in-memory interface configuration.
//!
//! All reads and writes of the config go through one async RW lock. Tool
//! invocations that only need the config file on disk run without it.

use std::collections::HashSet;
use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};
use wish_common_wgtypes::{ServerConfig, ServerPeer};

use crate::error::{Result, WgError};
use crate::stats::{parse_dump, StatsMap};
use crate::tools::WgTools;

pub const DEFAULT_INTERFACE: &str = "wg0";
const CONFIG_MODE: u32 = 0o600;

pub struct ControllerParams {
	/// Where the rendered config is written for `wg-quick`.
	pub config_path: PathBuf,
	/// Kernel interface name used by `wg syncconf` and `wg show`.
	pub interface: String,
	pub tools: Arc<dyn WgTools>,
}

/// Controller steps that can be made to fail once under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerOp {
	ApplyStaged,
	RemovePeer,
}

/// A peer that passed validation but has not been added yet.
#[derive(Debug)]
pub struct StagedPeer {
	peer: ServerPeer,
}

impl StagedPeer {
	pub fn peer(&self) -> &ServerPeer {
		&self.peer
	}
}

pub struct InterfaceController {
	config: RwLock<Option<ServerConfig>>,
	config_path: PathBuf,
	interface: String,
	tools: Arc<dyn WgTools>,
	// Serializes render+persist so files land in render order.
	file_lock: Mutex<()>,
	injected: std::sync::Mutex<HashSet<ControllerOp>>,
}

impl InterfaceController {
	pub fn new(params: ControllerParams) -> Self {
		Self {
			config: RwLock::new(None),
			config_path: params.config_path,
			interface: params.interface,
			tools: params.tools,
			file_lock: Mutex::new(()),
			injected: std::sync::Mutex::new(HashSet::new()),
		}
	}

	/// Makes the next `op` fail with a tool failure.
	#[cfg(any(test, feature = "test-support"))]
	pub fn fail_next(&self, op: ControllerOp) {
		self.injected
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.insert(op);
	}

	fn take_injected(&self, op: ControllerOp) -> Result<()> {
		let fired = self
			.injected
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.remove(&op);
		if fired {
			return Err(WgError::ToolFailure {
				command: format!("{op:?}"),
				stderr: "injected failure".to_string(),
			});
		}
		Ok(())
	}

	pub fn config_path(&self) -> &Path {
		&self.config_path
	}

	pub fn interface(&self) -> &str {
		&self.interface
	}

	/// Replaces the whole configuration.
	#[instrument(skip_all, fields(peers = config.peers.len()))]
	pub async fn load_config(&self, config: ServerConfig) {
		*self.config.write().await = Some(config);
	}

	pub async fn config_snapshot(&self) -> Result<ServerConfig> {
		self.config.read().await.clone().ok_or(WgError::NotConfigured)
	}

	pub async fn has_peer(&self, name: &str) -> Result<bool> {
		let guard = self.config.read().await;
		let config = guard.as_ref().ok_or(WgError::NotConfigured)?;
		Ok(config.find_peer(name).is_some())
	}

	/// Renders the config and writes it with owner-only permissions.
	///
	/// Each write goes to its own temporary file beside the target and is
	/// renamed over it, so readers only ever see a complete file.
	#[instrument(skip(self), fields(path = %self.config_path.display()))]
	pub async fn write_config_file(&self) -> Result<()> {
		let _file = self.file_lock.lock().await;
		let rendered = {
			let guard = self.config.read().await;
			guard.as_ref().ok_or(WgError::NotConfigured)?.to_string()
		};

		let dir = match self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
			Some(parent) => parent.to_path_buf(),
			None => PathBuf::from("."),
		};
		tokio::fs::create_dir_all(&dir).await?;

		let staging = tempfile::Builder::new()
			.prefix(&format!(".{}-", self.interface))
			.suffix(".conf.tmp")
			.tempfile_in(&dir)?;

		let mut file = tokio::fs::File::from_std(staging.as_file().try_clone()?);
		file.set_permissions(Permissions::from_mode(CONFIG_MODE)).await?;
		file.write_all(rendered.as_bytes()).await?;
		file.sync_all().await?;
		drop(file);

		staging.persist(&self.config_path).map_err(|e| WgError::Io(e.error))?;
		debug!("config file written");
		Ok(())
	}

	#[instrument(skip(self, peer), fields(name = %peer.name))]
	pub async fn add_peer(&self, peer: ServerPeer) -> Result<()> {
		let mut guard = self.config.write().await;
		let config = guard.as_mut().ok_or(WgError::NotConfigured)?;
		if config.find_peer(&peer.name).is_some() {
			return Err(WgError::PeerExists(peer.name));
		}
		config.peers.push(peer);
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn remove_peer(&self, name: &str) -> Result<()> {
		self.take_injected(ControllerOp::RemovePeer)?;
		let mut guard = self.config.write().await;
		let config = guard.as_mut().ok_or(WgError::NotConfigured)?;
		let idx = config
			.peers
			.iter()
			.position(|p| p.name == name)
			.ok_or_else(|| WgError::PeerNotFound(name.to_string()))?;
		config.peers.remove(idx);
		Ok(())
	}

	/// Checks that `peer` could be added without adding it.
	pub async fn stage_peer(&self, peer: ServerPeer) -> Result<StagedPeer> {
		let guard = self.config.read().await;
		let config = guard.as_ref().ok_or(WgError::NotConfigured)?;
		if config.find_peer(&peer.name).is_some() {
			return Err(WgError::PeerExists(peer.name));
		}
		Ok(StagedPeer { peer })
	}

	/// Adds a staged peer, re-checking under the write lock.
	pub async fn apply_staged(&self, staged: StagedPeer) -> Result<()> {
		self.take_injected(ControllerOp::ApplyStaged)?;
		self.add_peer(staged.peer).await
	}

	#[instrument(skip(self), fields(path = %self.config_path.display()))]
	pub async fn start_interface(&self) -> Result<()> {
		self.tools.bring_up(&self.config_path).await?;
		info!(interface = %self.interface, "interface up");
		Ok(())
	}

	#[instrument(skip(self), fields(path = %self.config_path.display()))]
	pub async fn stop_interface(&self) -> Result<()> {
		self.tools.bring_down(&self.config_path).await?;
		info!(interface = %self.interface, "interface down");
		Ok(())
	}

	/// Applies the config file to the running interface without a restart.
	///
	/// The stripped config goes through a private temporary file that is
	/// removed when this returns, whether or not the sync succeeded.
	#[instrument(skip(self), fields(interface = %self.interface))]
	pub async fn reload_interface(&self) -> Result<()> {
		let stripped = self.tools.strip(&self.config_path).await?;

		let tmp = tempfile::Builder::new()
			.prefix(&format!("{}-", self.interface))
			.suffix(".conf")
			.tempfile()?;
		tokio::fs::write(tmp.path(), stripped.as_bytes()).await?;

		self.tools.synchronize(&self.interface, tmp.path()).await?;
		debug!("interface synchronized");
		Ok(())
	}

	#[instrument(skip(self), fields(interface = %self.interface))]
	pub async fn live_stats(&self) -> Result<StatsMap> {
		let dump = self.tools.status_dump(&self.interface).await?;
		parse_dump(&dump)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{MockTools, ToolCall};
	use wish_common_wgtypes::{ServerConfigParams, WgKeyPair, WgPrivateKey};

	fn server_config() -> ServerConfig {
		ServerConfig::new(ServerConfigParams {
			private_key: WgPrivateKey::generate(),
			address: "10.9.8.1/24".parse().unwrap(),
			listen_port: Some(51820),
			device: "eth0",
			interface: "wg0",
		})
	}

	fn peer(name: &str) -> ServerPeer {
		ServerPeer {
			name: name.to_string(),
			public_key: *WgKeyPair::generate().public_key(),
			allowed_ips: vec!["10.9.8.2/24".parse().unwrap()],
		}
	}

	fn controller(dir: &Path, tools: Arc<MockTools>) -> InterfaceController {
		InterfaceController::new(ControllerParams {
			config_path: dir.join("wg0.conf"),
			interface: DEFAULT_INTERFACE.to_string(),
			tools,
		})
	}

	#[tokio::test]
	async fn operations_before_load_are_not_configured() {
		let dir = tempfile::tempdir().unwrap();
		let ctl = controller(dir.path(), Arc::new(MockTools::default()));
		assert!(matches!(ctl.add_peer(peer("a")).await, Err(WgError::NotConfigured)));
		assert!(matches!(ctl.write_config_file().await, Err(WgError::NotConfigured)));
	}

	#[tokio::test]
	async fn add_and_remove_peer() {
		let dir = tempfile::tempdir().unwrap();
		let ctl = controller(dir.path(), Arc::new(MockTools::default()));
		ctl.load_config(server_config()).await;

		ctl.add_peer(peer("alice")).await.unwrap();
		assert!(matches!(
			ctl.add_peer(peer("alice")).await,
			Err(WgError::PeerExists(name)) if name == "alice"
		));
		assert!(ctl.has_peer("alice").await.unwrap());

		ctl.remove_peer("alice").await.unwrap();
		assert!(matches!(
			ctl.remove_peer("alice").await,
			Err(WgError::PeerNotFound(_))
		));
		assert!(ctl.config_snapshot().await.unwrap().peers.is_empty());
	}

	#[tokio::test]
	async fn staged_peer_is_invisible_until_applied() {
		let dir = tempfile::tempdir().unwrap();
		let ctl = controller(dir.path(), Arc::new(MockTools::default()));
		ctl.load_config(server_config()).await;

		let staged = ctl.stage_peer(peer("bob")).await.unwrap();
		assert!(!ctl.has_peer("bob").await.unwrap());
		ctl.apply_staged(staged).await.unwrap();
		assert!(ctl.has_peer("bob").await.unwrap());

		assert!(matches!(
			ctl.stage_peer(peer("bob")).await,
			Err(WgError::PeerExists(_))
		));
	}

	/// A second stage for the same name can pass before either is applied;
	/// the write-locked re-check is what keeps names unique.
	#[tokio::test]
	async fn apply_rechecks_for_duplicates() {
		let dir = tempfile::tempdir().unwrap();
		let ctl = controller(dir.path(), Arc::new(MockTools::default()));
		ctl.load_config(server_config()).await;

		let first = ctl.stage_peer(peer("carol")).await.unwrap();
		let second = ctl.stage_peer(peer("carol")).await.unwrap();
		ctl.apply_staged(first).await.unwrap();
		assert!(matches!(
			ctl.apply_staged(second).await,
			Err(WgError::PeerExists(_))
		));
	}

	#[tokio::test]
	async fn config_file_is_private_and_complete() {
		let dir = tempfile::tempdir().unwrap();
		let ctl = controller(dir.path(), Arc::new(MockTools::default()));
		ctl.load_config(server_config()).await;
		ctl.add_peer(peer("alice")).await.unwrap();

		ctl.write_config_file().await.unwrap();

		let path = dir.path().join("wg0.conf");
		let text = std::fs::read_to_string(&path).unwrap();
		let parsed: ServerConfig = text.parse().unwrap();
		assert_eq!(parsed, ctl.config_snapshot().await.unwrap());

		let mode = std::fs::metadata(&path).unwrap().permissions().mode();
		assert_eq!(mode & 0o777, 0o600);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_writes_leave_one_complete_file() {
		let dir = tempfile::tempdir().unwrap();
		let ctl = Arc::new(controller(dir.path(), Arc::new(MockTools::default())));
		let mut config = server_config();
		for i in 0..200 {
			config.peers.push(peer(&format!("peer{i}")));
		}
		ctl.load_config(config).await;

		for _ in 0..5 {
			let writers: Vec<_> = (0..8)
				.map(|_| {
					let ctl = ctl.clone();
					tokio::spawn(async move { ctl.write_config_file().await })
				})
				.collect();
			for writer in writers {
				writer.await.unwrap().unwrap();
			}
		}

		let text = std::fs::read_to_string(dir.path().join("wg0.conf")).unwrap();
		let parsed: ServerConfig = text.parse().unwrap();
		assert_eq!(parsed, ctl.config_snapshot().await.unwrap());

		let entries: Vec<_> = std::fs::read_dir(dir.path())
			.unwrap()
			.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
			.collect();
		assert_eq!(entries, vec!["wg0.conf".to_string()]);
	}

	#[tokio::test]
	async fn injected_failures_fire_once_and_leave_config_alone() {
		let dir = tempfile::tempdir().unwrap();
		let ctl = controller(dir.path(), Arc::new(MockTools::default()));
		ctl.load_config(server_config()).await;

		ctl.fail_next(ControllerOp::ApplyStaged);
		let staged = ctl.stage_peer(peer("dave")).await.unwrap();
		assert!(matches!(
			ctl.apply_staged(staged).await,
			Err(WgError::ToolFailure { .. })
		));
		assert!(!ctl.has_peer("dave").await.unwrap());

		let staged = ctl.stage_peer(peer("dave")).await.unwrap();
		ctl.apply_staged(staged).await.unwrap();

		ctl.fail_next(ControllerOp::RemovePeer);
		assert!(ctl.remove_peer("dave").await.is_err());
		assert!(ctl.has_peer("dave").await.unwrap());
		ctl.remove_peer("dave").await.unwrap();
	}

	#[tokio::test]
	async fn start_and_stop_use_config_path() {
		let dir = tempfile::tempdir().unwrap();
		let tools = Arc::new(MockTools::default());
		let ctl = controller(dir.path(), tools.clone());

		ctl.start_interface().await.unwrap();
		ctl.stop_interface().await.unwrap();

		let path = dir.path().join("wg0.conf");
		assert_eq!(
			tools.calls(),
			vec![ToolCall::BringUp(path.clone()), ToolCall::BringDown(path)]
		);
	}

	#[tokio::test]
	async fn reload_syncs_stripped_config_through_temp_file() {
		let dir = tempfile::tempdir().unwrap();
		let tools = Arc::new(MockTools::default());
		tools.set_stripped("[Interface]\nPrivateKey = x\n");
		let ctl = controller(dir.path(), tools.clone());

		ctl.reload_interface().await.unwrap();

		let synced = tools.last_synced().unwrap();
		assert_eq!(synced.contents, "[Interface]\nPrivateKey = x\n");
		let name = synced.path.file_name().unwrap().to_string_lossy().into_owned();
		assert!(name.starts_with("wg0-") && name.ends_with(".conf"));
		assert_eq!(synced.mode & 0o777, 0o600);
		assert!(!synced.path.exists());
	}

	#[tokio::test]
	async fn reload_removes_temp_file_when_sync_fails() {
		let dir = tempfile::tempdir().unwrap();
		let tools = Arc::new(MockTools::default());
		tools.fail_on(crate::testing::ToolOp::Synchronize);
		let ctl = controller(dir.path(), tools.clone());

		let err = ctl.reload_interface().await.unwrap_err();
		assert!(matches!(err, WgError::ToolFailure { .. }));
		let synced = tools.last_synced().unwrap();
		assert!(!synced.path.exists());
	}

	#[tokio::test]
	async fn strip_failure_skips_sync() {
		let dir = tempfile::tempdir().unwrap();
		let tools = Arc::new(MockTools::default());
		tools.fail_on(crate::testing::ToolOp::Strip);
		let ctl = controller(dir.path(), tools.clone());

		assert!(ctl.reload_interface().await.is_err());
		assert!(tools.last_synced().is_none());
	}

	#[tokio::test]
	async fn live_stats_parses_dump() {
		let dir = tempfile::tempdir().unwrap();
		let tools = Arc::new(MockTools::default());
		let pk = *WgKeyPair::generate().public_key();
		tools.set_dump(format!(
			"priv\tpub\t51820\toff\n{pk}\t(none)\t(none)\t10.9.8.2/32\t0\t7\t9\toff\n"
		));
		let ctl = controller(dir.path(), tools);

		let stats = ctl.live_stats().await.unwrap();
		assert_eq!(stats[&pk].received, 7);
		assert_eq!(stats[&pk].sent, 9);
	}
}
