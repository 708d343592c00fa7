// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server and client configuration in `wg-quick`'s INI-like text format.

use crate::addr::{self, AddrError};
use crate::keys::{KeyError, WgPrivateKey, WgPublicKey};
use ipnet::IpNet;
use std::fmt::{self, Write as _};
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_LISTEN_PORT: u16 = 51820;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
	#[error("line {line}: {message}")]
	Syntax { line: usize, message: String },

	#[error("missing section [{0}]")]
	MissingSection(&'static str),

	#[error("[{section}] missing key {key}")]
	MissingKey {
		section: &'static str,
		key: &'static str,
	},

	#[error("invalid {key}: {message}")]
	InvalidValue { key: &'static str, message: String },

	#[error(transparent)]
	Key(#[from] KeyError),

	#[error(transparent)]
	Addr(#[from] AddrError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// The `[Interface]` block of the server's own config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInterface {
	pub name: Option<String>,
	pub address: IpNet,
	pub listen_port: Option<u16>,
	pub private_key: WgPrivateKey,
	pub post_up: Vec<String>,
	pub post_down: Vec<String>,
}

/// A `[Peer]` block of the server config: the live projection of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPeer {
	pub name: String,
	pub public_key: WgPublicKey,
	pub allowed_ips: Vec<IpNet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
	pub interface: ServerInterface,
	pub peers: Vec<ServerPeer>,
}

pub struct ServerConfigParams<'a> {
	pub private_key: WgPrivateKey,
	pub address: IpNet,
	pub listen_port: Option<u16>,
	/// Egress device used by the NAT rules.
	pub device: &'a str,
	/// Name of the WireGuard interface itself, e.g. `wg0`.
	pub interface: &'a str,
}

impl ServerConfig {
	/// Builds the interface block with the forwarding and masquerade rules
	/// `wg-quick` runs on bring-up and tear-down.
	pub fn new(params: ServerConfigParams<'_>) -> Self {
		let port = params.listen_port.unwrap_or(DEFAULT_LISTEN_PORT);
		let subnet = addr::network_of(&params.address);
		let device = params.device;
		let wg = params.interface;

		let post_up = vec![
			format!("iptables -t nat -A POSTROUTING -s {subnet} -o {device} -j MASQUERADE"),
			format!("iptables -A INPUT -i {device} -p udp -m udp --dport {port} -j ACCEPT"),
			format!("iptables -A FORWARD -i {wg} -o {device} -j ACCEPT"),
			format!("iptables -A FORWARD -i {device} -o {wg} -j ACCEPT"),
		];
		let post_down = vec![
			format!("iptables -t nat -D POSTROUTING -s {subnet} -o {device} -j MASQUERADE"),
			format!("iptables -D INPUT -i {device} -p udp -m udp --dport {port} -j ACCEPT"),
			format!("iptables -D FORWARD -i {wg} -o {device} -j ACCEPT"),
			format!("iptables -D FORWARD -i {device} -o {wg} -j ACCEPT"),
		];

		Self {
			interface: ServerInterface {
				name: None,
				address: params.address,
				listen_port: Some(port),
				private_key: params.private_key,
				post_up,
				post_down,
			},
			peers: Vec::new(),
		}
	}

	pub fn find_peer(&self, name: &str) -> Option<&ServerPeer> {
		self.peers.iter().find(|p| p.name == name)
	}
}

/// Peer-facing configuration handed back to an administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
	pub interface: ClientInterface,
	pub peer: ClientPeer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInterface {
	pub name: Option<String>,
	pub address: IpNet,
	pub private_key: WgPrivateKey,
	pub dns: Vec<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientPeer {
	pub name: Option<String>,
	pub endpoint_host: String,
	pub endpoint_port: u16,
	pub public_key: WgPublicKey,
	pub allowed_ips: Vec<IpNet>,
	pub persistent_keepalive: Option<u16>,
}

impl ClientPeer {
	pub fn endpoint(&self) -> String {
		if self.endpoint_host.contains(':') {
			format!("[{}]:{}", self.endpoint_host, self.endpoint_port)
		} else {
			format!("{}:{}", self.endpoint_host, self.endpoint_port)
		}
	}
}

// Rendering

struct Writer {
	out: String,
}

impl Writer {
	fn new() -> Self {
		Self { out: String::new() }
	}

	fn section(&mut self, title: &str, comment: Option<&str>) {
		if !self.out.is_empty() {
			self.out.push('\n');
		}
		if let Some(comment) = comment.filter(|c| !c.is_empty()) {
			let _ = writeln!(self.out, "# {comment}");
		}
		let _ = writeln!(self.out, "[{title}]");
	}

	fn key(&mut self, key: &str, value: impl fmt::Display) {
		let _ = writeln!(self.out, "{key:<10} = {value}");
	}
}

impl fmt::Display for ServerConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut w = Writer::new();
		let iface = &self.interface;

		w.section("Interface", iface.name.as_deref());
		w.key("Address", iface.address);
		if let Some(port) = iface.listen_port {
			w.key("ListenPort", port);
		}
		w.key("PrivateKey", iface.private_key.to_base64().as_str());
		for cmd in &iface.post_up {
			w.key("PostUp", cmd);
		}
		for cmd in &iface.post_down {
			w.key("PostDown", cmd);
		}

		for peer in &self.peers {
			w.section("Peer", Some(&peer.name));
			w.key("PublicKey", peer.public_key);
			w.key("AllowedIPs", addr::format_addresses(&peer.allowed_ips, ","));
		}

		f.write_str(&w.out)
	}
}

impl fmt::Display for ClientConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut w = Writer::new();
		let iface = &self.interface;
		let peer = &self.peer;

		w.section("Interface", iface.name.as_deref());
		w.key("Address", iface.address);
		w.key("PrivateKey", iface.private_key.to_base64().as_str());
		if !iface.dns.is_empty() {
			w.key("DNS", addr::format_ips(&iface.dns, ","));
		}

		w.section("Peer", peer.name.as_deref());
		w.key("Endpoint", peer.endpoint());
		w.key("PublicKey", peer.public_key);
		w.key("AllowedIPs", addr::format_addresses(&peer.allowed_ips, ","));
		if let Some(keepalive) = peer.persistent_keepalive {
			w.key("PersistentKeepalive", keepalive);
		}

		f.write_str(&w.out)
	}
}

// Parsing

#[derive(Debug, Default)]
struct Section {
	title: String,
	comment: Option<String>,
	entries: Vec<(String, String)>,
}

impl Section {
	fn all(&self, key: &str) -> impl Iterator<Item = &str> {
		let key = key.to_string();
		self.entries
			.iter()
			.filter(move |(k, _)| k.eq_ignore_ascii_case(&key))
			.map(|(_, v)| v.as_str())
	}

	fn get(&self, key: &str) -> Option<&str> {
		self.all(key).last()
	}

	fn require(&self, section: &'static str, key: &'static str) -> Result<&str> {
		self.get(key).ok_or(ConfigError::MissingKey { section, key })
	}
}

fn parse_sections(input: &str) -> Result<Vec<Section>> {
	let mut sections: Vec<Section> = Vec::new();
	let mut pending_comment: Option<String> = None;

	for (idx, raw) in input.lines().enumerate() {
		let line = raw.trim();
		if line.is_empty() {
			continue;
		}
		if let Some(comment) = line.strip_prefix('#').or_else(|| line.strip_prefix(';')) {
			pending_comment = Some(comment.trim_start_matches(['#', ' ']).trim().to_string());
			continue;
		}
		if let Some(title) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
			sections.push(Section {
				title: title.trim().to_string(),
				comment: pending_comment.take(),
				entries: Vec::new(),
			});
			continue;
		}

		let Some((key, value)) = line.split_once('=') else {
			return Err(ConfigError::Syntax {
				line: idx + 1,
				message: format!("expected key = value, got {line:?}"),
			});
		};
		let Some(section) = sections.last_mut() else {
			return Err(ConfigError::Syntax {
				line: idx + 1,
				message: "key outside of a section".to_string(),
			});
		};
		pending_comment = None;
		section
			.entries
			.push((key.trim().to_string(), value.trim().to_string()));
	}

	Ok(sections)
}

fn split_list(value: &str) -> Vec<&str> {
	value
		.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.collect()
}

fn parse_u16(key: &'static str, value: &str) -> Result<u16> {
	value.parse().map_err(|_| ConfigError::InvalidValue {
		key,
		message: format!("{value:?} is not a 16-bit unsigned integer"),
	})
}

impl FromStr for ServerConfig {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self> {
		let sections = parse_sections(s)?;
		let iface = sections
			.iter()
			.find(|s| s.title == "Interface")
			.ok_or(ConfigError::MissingSection("Interface"))?;

		let interface = ServerInterface {
			name: iface.comment.clone(),
			address: addr::parse_address(iface.require("Interface", "Address")?)?,
			listen_port: iface
				.get("ListenPort")
				.map(|v| parse_u16("ListenPort", v))
				.transpose()?,
			private_key: WgPrivateKey::from_base64(iface.require("Interface", "PrivateKey")?)?,
			post_up: iface.all("PostUp").map(str::to_string).collect(),
			post_down: iface.all("PostDown").map(str::to_string).collect(),
		};

		let peers = sections
			.iter()
			.filter(|s| s.title == "Peer")
			.map(|peer| -> Result<ServerPeer> {
				Ok(ServerPeer {
					name: peer.comment.clone().unwrap_or_default(),
					public_key: WgPublicKey::from_base64(peer.require("Peer", "PublicKey")?)?,
					allowed_ips: addr::parse_addresses(&split_list(peer.require("Peer", "AllowedIPs")?))?,
				})
			})
			.collect::<Result<Vec<_>>>()?;

		Ok(Self { interface, peers })
	}
}

impl FromStr for ClientConfig {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self> {
		let sections = parse_sections(s)?;
		let iface = sections
			.iter()
			.find(|s| s.title == "Interface")
			.ok_or(ConfigError::MissingSection("Interface"))?;
		let peer = sections
			.iter()
			.find(|s| s.title == "Peer")
			.ok_or(ConfigError::MissingSection("Peer"))?;

		let interface = ClientInterface {
			name: iface.comment.clone(),
			address: addr::parse_address(iface.require("Interface", "Address")?)?,
			private_key: WgPrivateKey::from_base64(iface.require("Interface", "PrivateKey")?)?,
			dns: match iface.get("DNS") {
				Some(v) => addr::parse_ips(&split_list(v))?,
				None => Vec::new(),
			},
		};

		let endpoint = peer.require("Peer", "Endpoint")?;
		let (host, port) = endpoint
			.rsplit_once(':')
			.ok_or_else(|| ConfigError::InvalidValue {
				key: "Endpoint",
				message: format!("{endpoint:?} is not host:port"),
			})?;
		let host = host.trim_start_matches('[').trim_end_matches(']');

		let peer = ClientPeer {
			name: peer.comment.clone(),
			endpoint_host: host.to_string(),
			endpoint_port: parse_u16("Endpoint", port)?,
			public_key: WgPublicKey::from_base64(peer.require("Peer", "PublicKey")?)?,
			allowed_ips: addr::parse_addresses(&split_list(peer.require("Peer", "AllowedIPs")?))?,
			persistent_keepalive: peer
				.get("PersistentKeepalive")
				.map(|v| parse_u16("PersistentKeepalive", v))
				.transpose()?,
		};

		Ok(Self { interface, peer })
	}
}
