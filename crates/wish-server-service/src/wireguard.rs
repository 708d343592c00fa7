// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer lifecycle across the record store and the interface controller.
//!
//! Mutations follow stage, commit, apply: the controller change is
//! validated first, the store transaction is committed with its write
//! section still held, and only then is the controller change applied. If
//! applying fails, the committed record is removed again under the same
//! section so no other writer observes the gap.

use futures::future::BoxFuture;
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use wish_common_wgtypes::addr;
use wish_common_wgtypes::{
	ClientConfig, ClientInterface, ClientPeer, ServerConfig, ServerConfigParams, ServerPeer,
	WgKeyPair, WgPrivateKey, WgPublicKey,
};
use wish_server_db::{CommittedSection, DbError, PeerIdentity, ServerIdentity, Store, StoreTx};
use wish_server_wg::{InterfaceController, PeerStats};

use crate::error::{Result, ServiceError};

pub const SERVER_PEER_NAME: &str = "Server";

pub struct WireGuardServiceParams {
	pub store: Store,
	pub controller: Arc<InterfaceController>,

	/// Public host name or IP that clients connect to.
	pub host: String,
	/// Server interface address; its network is the peer subnet.
	pub address: IpNet,
	pub port: u16,
	/// Egress device for the NAT rules.
	pub device: String,

	pub dns: Vec<IpAddr>,
	pub allowed_ips: Vec<IpNet>,
	pub persistent_keepalive: Option<u16>,
}

/// Per-call overrides for [`WireGuardService::add_client`].
#[derive(Debug, Clone, Default)]
pub struct AddClientOptions {
	pub address: Option<IpNet>,
	/// `Some` replaces the default list, even when empty.
	pub dns: Option<Vec<IpAddr>>,
	/// Empty means the default list.
	pub allowed_ips: Vec<IpNet>,
	pub persistent_keepalive: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
	pub config: ClientConfig,
	pub stats: Option<PeerStats>,
}

pub struct WireGuardService {
	store: Store,
	controller: Arc<InterfaceController>,

	public_key: WgPublicKey,
	address: IpNet,
	host: String,
	port: u16,
	dns: Vec<IpAddr>,
	allowed_ips: Vec<IpNet>,
	persistent_keepalive: Option<u16>,

	/// Single-host net of the highest address handed out so far. Only
	/// touched while the store's write section is held.
	last_allocated: Mutex<IpNet>,
}

fn projection(peer: &PeerIdentity) -> ServerPeer {
	ServerPeer {
		name: peer.name.clone(),
		public_key: peer.public_key,
		allowed_ips: vec![addr::to_host(&peer.address)],
	}
}

/// Whether `candidate` sits inside `subnet` above the `last` high-water mark.
fn is_beyond(subnet: &IpNet, candidate: &IpNet, last: &IpNet) -> bool {
	let ip = candidate.addr();
	subnet.contains(&ip) && addr::host_bits(subnet, &ip) > addr::host_bits(subnet, &last.addr())
}

impl WireGuardService {
	/// Loads or creates the server identity, rebuilds the interface config
	/// from stored peers and hands it to the controller.
	#[instrument(skip_all, fields(address = %params.address, port = params.port))]
	pub async fn new(params: WireGuardServiceParams) -> Result<Self> {
		let mut tx = params.store.update().await?;

		let identity = match tx.server().get().await {
			Ok(identity) => identity,
			Err(DbError::NotFound(_)) => {
				info!("generating server key");
				let identity = ServerIdentity {
					private_key: WgPrivateKey::generate(),
				};
				tx.server().set(&identity).await?;
				identity
			}
			Err(e) => return Err(e.into()),
		};
		let public_key = identity.private_key.public_key();

		let mut config = ServerConfig::new(ServerConfigParams {
			private_key: identity.private_key,
			address: params.address,
			listen_port: Some(params.port),
			device: &params.device,
			interface: params.controller.interface(),
		});

		let subnet = addr::network_of(&params.address);
		let mut last = addr::to_host(&params.address);
		let peers = tx.peers().get_all().await?;
		for peer in &peers {
			if is_beyond(&subnet, &peer.address, &last) {
				last = addr::to_host(&peer.address);
			}
			config.peers.push(projection(peer));
		}

		// A generated key must be durable before the interface is built on it.
		tx.commit().await?.release();
		params.controller.load_config(config).await;

		info!(peers = peers.len(), last_allocated = %last, "wireguard service ready");

		Ok(Self {
			store: params.store,
			controller: params.controller,
			public_key,
			address: params.address,
			host: params.host,
			port: params.port,
			dns: params.dns,
			allowed_ips: params.allowed_ips,
			persistent_keepalive: params.persistent_keepalive,
			last_allocated: Mutex::new(last),
		})
	}

	pub fn public_key(&self) -> &WgPublicKey {
		&self.public_key
	}

	pub fn address(&self) -> &IpNet {
		&self.address
	}

	pub fn controller(&self) -> &Arc<InterfaceController> {
		&self.controller
	}

	/// The address after `last`, carrying the server's prefix length.
	fn allocate(&self, last: &IpNet) -> Result<IpNet> {
		let subnet = addr::network_of(&self.address);
		let next = match addr::next_address(last) {
			Ok(next) => next.addr(),
			Err(addr::AddrError::Overflow) => return Err(ServiceError::AllocationExhausted { subnet }),
			Err(e) => return Err(e.into()),
		};
		if !subnet.contains(&next) || next == addr::last_address(&subnet) {
			return Err(ServiceError::AllocationExhausted { subnet });
		}
		IpNet::new(next, self.address.prefix_len()).map_err(|e| ServiceError::Internal(e.to_string()))
	}

	#[instrument(skip(self, options), fields(%name))]
	pub async fn add_client(&self, name: &str, options: AddClientOptions) -> Result<ClientConfig> {
		let mut tx = self.store.update().await?;
		if tx.peers().exists(name).await? {
			return Err(ServiceError::client_exists());
		}

		let mut last = self.last_allocated.lock().await;

		let (private_key, public_key) = WgKeyPair::generate().into_parts();
		let address = match options.address {
			Some(requested) => {
				if addr::overlaps(&requested, &self.address.addr()) {
					return Err(ServiceError::Overlap {
						requested,
						server: self.address.addr(),
					});
				}
				requested
			}
			None => self.allocate(&last)?,
		};

		let peer = PeerIdentity {
			name: name.to_string(),
			address,
			private_key,
			public_key,
			dns: options.dns.unwrap_or_else(|| self.dns.clone()),
			allowed_ips: if options.allowed_ips.is_empty() {
				self.allowed_ips.clone()
			} else {
				options.allowed_ips
			},
			persistent_keepalive: options.persistent_keepalive.or(self.persistent_keepalive),
		};

		tx.peers().add(&peer).await?;
		let staged = self.controller.stage_peer(projection(&peer)).await?;
		let section = tx.commit().await?;

		if let Err(e) = self.controller.apply_staged(staged).await {
			error!(error = %e, "failed to apply peer, removing committed record");
			let name = name.to_string();
			self.undo(section, move |tx| {
				Box::pin(async move { tx.peers().remove(&name).await })
			})
			.await;
			return Err(e.into());
		}

		if is_beyond(&addr::network_of(&self.address), &address, &last) {
			*last = addr::to_host(&address);
		}
		drop(last);
		section.release();

		info!(%address, "client added");
		Ok(self.client_config(&peer))
	}

	#[instrument(skip(self), fields(%name))]
	pub async fn remove_client(&self, name: &str) -> Result<()> {
		let mut tx = self.store.update().await?;
		let peer = match tx.peers().get(name).await {
			Ok(peer) => peer,
			Err(DbError::NotFound(_)) => return Err(ServiceError::client_not_found()),
			Err(e) => return Err(e.into()),
		};
		tx.peers().remove(name).await?;

		if !self.controller.has_peer(name).await? {
			return Err(ServiceError::Internal(format!(
				"wireguard server peer {name} not found"
			)));
		}
		let section = tx.commit().await?;

		if let Err(e) = self.controller.remove_peer(name).await {
			error!(error = %e, "failed to remove peer, restoring committed record");
			self.undo(section, move |tx| Box::pin(async move { tx.peers().add(&peer).await }))
				.await;
			return Err(e.into());
		}
		section.release();

		info!("client removed");
		Ok(())
	}

	/// Reverts a committed change under the section the commit kept. Failure
	/// here leaves the store and controller out of step, so it is logged.
	async fn undo<F>(&self, section: CommittedSection, revert: F)
	where
		F: for<'c> FnOnce(&'c mut StoreTx) -> BoxFuture<'c, wish_server_db::Result<()>>,
	{
		let result = async {
			let mut tx = section.reopen().await?;
			revert(&mut tx).await?;
			tx.commit().await?.release();
			Ok::<(), DbError>(())
		}
		.await;
		if let Err(e) = result {
			error!(error = %e, "undo failed, store and interface may disagree until restart");
		}
	}

	#[instrument(skip(self), fields(%name))]
	pub async fn get_client(&self, name: &str) -> Result<ClientConfig> {
		let mut view = self.store.view().await?;
		match view.peers().get(name).await {
			Ok(peer) => Ok(self.client_config(&peer)),
			Err(DbError::NotFound(_)) => Err(ServiceError::client_not_found()),
			Err(e) => Err(e.into()),
		}
	}

	/// Lists every client with live stats where the interface reports them.
	#[instrument(skip(self))]
	pub async fn get_client_infos(&self) -> Result<Vec<ClientInfo>> {
		let peers = {
			let mut view = self.store.view().await?;
			view.peers().get_all().await?
		};

		let stats = match self.controller.live_stats().await {
			Ok(stats) => stats,
			Err(e) => {
				error!(error = %e, "failed to get peer stats");
				Default::default()
			}
		};

		Ok(peers
			.iter()
			.map(|peer| ClientInfo {
				config: self.client_config(peer),
				stats: stats.get(&peer.public_key).copied(),
			})
			.collect())
	}

	#[instrument(skip(self))]
	pub async fn start_server(&self) -> Result<()> {
		self.controller.write_config_file().await?;
		self.controller.start_interface().await?;
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn stop_server(&self) -> Result<()> {
		self.controller.stop_interface().await?;
		Ok(())
	}

	/// Rewrites the config file so the strip step sees current peers, then
	/// syncs the running interface.
	#[instrument(skip(self))]
	pub async fn reload_server(&self) -> Result<()> {
		self.controller.write_config_file().await?;
		if let Err(e) = self.controller.reload_interface().await {
			warn!(error = %e, "reload failed");
			return Err(e.into());
		}
		Ok(())
	}

	fn client_config(&self, peer: &PeerIdentity) -> ClientConfig {
		ClientConfig {
			interface: ClientInterface {
				name: Some(peer.name.clone()),
				address: peer.address,
				private_key: peer.private_key.clone(),
				dns: peer.dns.clone(),
			},
			peer: ClientPeer {
				name: Some(SERVER_PEER_NAME.to_string()),
				endpoint_host: self.host.clone(),
				endpoint_port: self.port,
				public_key: self.public_key,
				allowed_ips: peer.allowed_ips.clone(),
				persistent_keepalive: peer.persistent_keepalive,
			},
		}
	}
}
