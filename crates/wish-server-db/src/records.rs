// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stored record types and their versioned wire encoding.
//!
//! Payloads are MessagePack arrays holding the fields in declaration order.
//! Addresses are kept as raw IP and mask bytes so the layout does not depend
//! on any textual CIDR format.

use ipnet::IpNet;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;
use wish_common_wgtypes::addr;
use wish_common_wgtypes::{WgPrivateKey, WgPublicKey, KEY_LEN};
use zeroize::Zeroizing;

use crate::error::{DbError, Result};
use crate::meta::Meta;

/// An administrator allowed to open a session. Keyed by the SSH wire blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
	pub key: Vec<u8>,
	pub comment: String,
}

/// A peer's durable identity. Keyed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
	pub name: String,
	pub address: IpNet,
	pub private_key: WgPrivateKey,
	pub public_key: WgPublicKey,
	pub dns: Vec<IpAddr>,
	pub allowed_ips: Vec<IpNet>,
	pub persistent_keepalive: Option<u16>,
}

/// The server's long-term key, stored under [`SERVER_KEY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
	pub private_key: WgPrivateKey,
}

pub const SERVER_KEY: &[u8] = b"config";

const CURRENT_VERSION: u8 = 1;

/// Raw bytes written as MessagePack `bin`. Cleared on drop since private keys
/// pass through here.
struct Bin(Zeroizing<Vec<u8>>);

impl Bin {
	fn new(bytes: &[u8]) -> Self {
		Self(Zeroizing::new(bytes.to_vec()))
	}
}

impl Serialize for Bin {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.serialize_bytes(&self.0)
	}
}

impl<'de> Deserialize<'de> for Bin {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		struct BinVisitor;

		impl<'de> Visitor<'de> for BinVisitor {
			type Value = Bin;

			fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str("a byte string")
			}

			fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Bin, E> {
				Ok(Bin::new(v))
			}

			fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Bin, A::Error> {
				let mut out = Zeroizing::new(Vec::with_capacity(seq.size_hint().unwrap_or(0)));
				while let Some(byte) = seq.next_element::<u8>()? {
					out.push(byte);
				}
				Ok(Bin(out))
			}
		}

		deserializer.deserialize_byte_buf(BinVisitor)
	}
}

#[derive(Serialize, Deserialize)]
struct NetV1(Bin, Bin);

impl NetV1 {
	fn from_net(net: &IpNet) -> Self {
		let (ip, mask) = addr::to_raw_parts(net);
		Self(Bin::new(&ip), Bin::new(&mask))
	}

	fn into_net(self) -> Result<IpNet> {
		addr::from_raw_parts(&self.0 .0, &self.1 .0).map_err(|e| DbError::Corrupted(e.to_string()))
	}
}

#[derive(Serialize, Deserialize)]
struct CredentialV1 {
	comment: String,
}

#[derive(Serialize, Deserialize)]
struct PeerV1 {
	address: NetV1,
	private_key: Bin,
	public_key: Bin,
	dns: Vec<Bin>,
	allowed_ips: Vec<NetV1>,
	persistent_keepalive: Option<i64>,
}

#[derive(Serialize, Deserialize)]
struct ServerV1 {
	private_key: Bin,
}

fn frame<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
	let meta = Meta::new(CURRENT_VERSION)?;
	let body = rmp_serde::to_vec(payload)?;
	let mut out = Vec::with_capacity(body.len() + 1);
	out.push(meta.to_byte());
	out.extend_from_slice(&body);
	Ok(out)
}

fn key_bytes(bin: &Bin, what: &str) -> Result<[u8; KEY_LEN]> {
	bin.0
		.as_slice()
		.try_into()
		.map_err(|_| DbError::Corrupted(format!("{what} has {} bytes", bin.0.len())))
}

impl Credential {
	pub(crate) fn encode_value(&self) -> Result<Vec<u8>> {
		frame(&CredentialV1 {
			comment: self.comment.clone(),
		})
	}

	pub(crate) fn decode(key: Vec<u8>, value: &[u8]) -> Result<Self> {
		let (meta, payload) = Meta::split(value)?;
		match meta.version() {
			1 => {
				let v1: CredentialV1 = rmp_serde::from_slice(payload)?;
				Ok(Self {
					key,
					comment: v1.comment,
				})
			}
			v => Err(DbError::UnsupportedVersion(v)),
		}
	}
}

impl PeerIdentity {
	pub(crate) fn encode_value(&self) -> Result<Vec<u8>> {
		frame(&PeerV1 {
			address: NetV1::from_net(&self.address),
			private_key: Bin::new(self.private_key.expose_bytes()),
			public_key: Bin::new(self.public_key.as_bytes()),
			dns: self.dns.iter().map(|ip| Bin::new(&addr::ip_to_raw(ip))).collect(),
			allowed_ips: self.allowed_ips.iter().map(NetV1::from_net).collect(),
			persistent_keepalive: self.persistent_keepalive.map(i64::from),
		})
	}

	pub(crate) fn decode(name: String, value: &[u8]) -> Result<Self> {
		let (meta, payload) = Meta::split(value)?;
		let v1: PeerV1 = match meta.version() {
			1 => rmp_serde::from_slice(payload)?,
			v => return Err(DbError::UnsupportedVersion(v)),
		};

		let dns = v1
			.dns
			.iter()
			.map(|b| addr::ip_from_raw(&b.0).map_err(|e| DbError::Corrupted(e.to_string())))
			.collect::<Result<Vec<_>>>()?;
		let allowed_ips = v1
			.allowed_ips
			.into_iter()
			.map(NetV1::into_net)
			.collect::<Result<Vec<_>>>()?;
		let persistent_keepalive = v1
			.persistent_keepalive
			.map(|k| {
				u16::try_from(k).map_err(|_| DbError::Corrupted(format!("keepalive {k} out of range")))
			})
			.transpose()?;

		Ok(Self {
			name,
			address: v1.address.into_net()?,
			private_key: WgPrivateKey::from_bytes(key_bytes(&v1.private_key, "private key")?),
			public_key: WgPublicKey::from_bytes(key_bytes(&v1.public_key, "public key")?),
			dns,
			allowed_ips,
			persistent_keepalive,
		})
	}
}

impl ServerIdentity {
	pub(crate) fn encode_value(&self) -> Result<Vec<u8>> {
		frame(&ServerV1 {
			private_key: Bin::new(self.private_key.expose_bytes()),
		})
	}

	pub(crate) fn decode(value: &[u8]) -> Result<Self> {
		let (meta, payload) = Meta::split(value)?;
		match meta.version() {
			1 => {
				let v1: ServerV1 = rmp_serde::from_slice(payload)?;
				Ok(Self {
					private_key: WgPrivateKey::from_bytes(key_bytes(&v1.private_key, "private key")?),
				})
			}
			v => Err(DbError::UnsupportedVersion(v)),
		}
	}
}
