// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server bootstrap shared by the binary and its tests.

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, instrument};
use wish_server_config::ServerConfig;
use wish_server_db::Store;
use wish_server_service::{PublicKeyService, WireGuardService, WireGuardServiceParams};
use wish_server_wg::{ControllerParams, InterfaceController, WgTools};

/// The services handed to the access layer.
pub struct Services {
	pub public_keys: PublicKeyService,
	pub wireguard: WireGuardService,
}

/// Opens the store, installs the configured administrator keys and builds
/// the WireGuard service. Does not touch the interface.
#[instrument(skip_all, fields(database = %config.database.path.display()))]
pub async fn bootstrap(config: &ServerConfig, tools: Arc<dyn WgTools>) -> anyhow::Result<Services> {
	let store = Store::open(&config.database.path)
		.await
		.with_context(|| format!("failed to open database {}", config.database.path.display()))?;

	let public_keys = PublicKeyService::new(store.clone());
	public_keys
		.sync_admin_keys(&config.ssh.admin_keys, config.ssh.replace_admin_keys)
		.await
		.context("failed to sync admin keys")?;

	let wg = &config.wireguard;
	let controller = Arc::new(InterfaceController::new(ControllerParams {
		config_path: wg.path.clone(),
		interface: wg.interface.clone(),
		tools,
	}));

	let wireguard = WireGuardService::new(WireGuardServiceParams {
		store,
		controller,
		host: wg.host.clone(),
		address: wg.address,
		port: wg.port,
		device: wg.device.clone(),
		dns: wg.dns.clone(),
		allowed_ips: wg.allowed_ips.clone(),
		persistent_keepalive: wg.persistent_keepalive,
	})
	.await
	.context("failed to initialise wireguard service")?;

	info!(public_key = %wireguard.public_key(), "server identity loaded");

	Ok(Services {
		public_keys,
		wireguard,
	})
}
