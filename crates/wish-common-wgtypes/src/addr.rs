// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! CIDR helpers for peer address allocation.
//!
//! Addresses are `ipnet::IpNet` values that keep their host bits, so
//! `10.9.8.5/24` is a peer at `.5` inside `10.9.8.0/24`.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

const V4_IN_V6_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddrError {
	#[error("ip address overflow")]
	Overflow,

	#[error("invalid CIDR address: {0}")]
	InvalidCidr(String),

	#[error("invalid IP address: {0}")]
	InvalidIp(String),

	#[error("address length {ip} does not match mask length {mask}")]
	FamilyMismatch { ip: usize, mask: usize },

	#[error("non-contiguous network mask")]
	NonContiguousMask,
}

pub type Result<T> = std::result::Result<T, AddrError>;

/// Returns the highest address of `net`'s network (all host bits set).
pub fn last_address(net: &IpNet) -> IpAddr {
	net.broadcast()
}

/// Whether the prefix covers every bit of the address family.
pub fn is_host_mask(net: &IpNet) -> bool {
	net.prefix_len() == net.max_prefix_len()
}

/// Turns `net` into a single-host network around the same address.
pub fn to_host(net: &IpNet) -> IpNet {
	match net {
		IpNet::V4(v4) => IpNet::V4(Ipv4Net::from(v4.addr())),
		IpNet::V6(v6) => IpNet::V6(Ipv6Net::from(v6.addr())),
	}
}

/// Adds `step` to `ip` as a fixed-width big-endian integer.
///
/// A carry out of the address width is reported as [`AddrError::Overflow`].
pub fn increment(ip: IpAddr, step: u8) -> Result<IpAddr> {
	match ip {
		IpAddr::V4(v4) => {
			let (num, carry) = u32::from(v4).overflowing_add(u32::from(step));
			if carry {
				return Err(AddrError::Overflow);
			}
			Ok(IpAddr::V4(Ipv4Addr::from(num)))
		}
		IpAddr::V6(v6) => {
			let octets = v6.octets();
			let mut hi = [0u8; 8];
			let mut lo = [0u8; 8];
			hi.copy_from_slice(&octets[..8]);
			lo.copy_from_slice(&octets[8..]);

			let (lo, carry) = u64::from_be_bytes(lo).overflowing_add(u64::from(step));
			let (hi, carry) = u64::from_be_bytes(hi).overflowing_add(u64::from(carry));
			if carry {
				return Err(AddrError::Overflow);
			}

			let mut out = [0u8; 16];
			out[..8].copy_from_slice(&hi.to_be_bytes());
			out[8..].copy_from_slice(&lo.to_be_bytes());
			Ok(IpAddr::V6(Ipv6Addr::from(out)))
		}
	}
}

/// Computes the address that follows `net`'s network.
///
/// The last address of the network is incremented by one for single-host
/// masks and by two otherwise, which skips the following network's base
/// address. The prefix length is preserved.
pub fn next_address(net: &IpNet) -> Result<IpNet> {
	let step = if is_host_mask(net) { 1 } else { 2 };
	let next = increment(last_address(net), step)?;
	IpNet::new(next, net.prefix_len()).map_err(|e| AddrError::InvalidCidr(e.to_string()))
}

/// Returns the host portion of `ip` relative to `subnet`'s mask.
pub fn host_bits(subnet: &IpNet, ip: &IpAddr) -> u128 {
	match (subnet, ip) {
		(IpNet::V4(net), IpAddr::V4(ip)) => u128::from(u32::from(*ip) & u32::from(net.hostmask())),
		(IpNet::V6(net), IpAddr::V6(ip)) => u128::from(*ip) & u128::from(net.hostmask()),
		_ => 0,
	}
}

/// The network that `net`'s address and mask describe (host bits cleared).
pub fn network_of(net: &IpNet) -> IpNet {
	net.trunc()
}

/// Whether `net`'s own network contains `ip`.
pub fn overlaps(net: &IpNet, ip: &IpAddr) -> bool {
	network_of(net).contains(ip)
}

/// Builds an `IpNet` from raw address and mask bytes as stored on disk.
///
/// Mixed-family pairs are narrowed to IPv4 first: a 16-byte mask whose
/// first 12 bytes are `0xff` paired with a 4-byte address, and a 4-byte mask
/// paired with a v4-mapped 16-byte address.
pub fn from_raw_parts(ip: &[u8], mask: &[u8]) -> Result<IpNet> {
	let mut ip = ip;
	let mut mask = mask;

	if mask.len() == 16 && ip.len() == 4 && mask[..12].iter().all(|b| *b == 0xff) {
		mask = &mask[12..];
	}
	if mask.len() == 4 && ip.len() == 16 && ip[..12] == V4_IN_V6_PREFIX {
		ip = &ip[12..];
	}
	if ip.len() != mask.len() {
		return Err(AddrError::FamilyMismatch {
			ip: ip.len(),
			mask: mask.len(),
		});
	}

	let prefix = prefix_len(mask)?;
	let addr = match ip.len() {
		4 => {
			let mut octets = [0u8; 4];
			octets.copy_from_slice(ip);
			IpAddr::V4(Ipv4Addr::from(octets))
		}
		16 => {
			let mut octets = [0u8; 16];
			octets.copy_from_slice(ip);
			IpAddr::V6(Ipv6Addr::from(octets))
		}
		n => return Err(AddrError::InvalidIp(format!("{n}-byte address"))),
	};

	IpNet::new(addr, prefix).map_err(|e| AddrError::InvalidCidr(e.to_string()))
}

/// Splits `net` into raw address and mask bytes.
pub fn to_raw_parts(net: &IpNet) -> (Vec<u8>, Vec<u8>) {
	match net {
		IpNet::V4(v4) => (v4.addr().octets().to_vec(), v4.netmask().octets().to_vec()),
		IpNet::V6(v6) => (v6.addr().octets().to_vec(), v6.netmask().octets().to_vec()),
	}
}

pub fn ip_from_raw(ip: &[u8]) -> Result<IpAddr> {
	match ip.len() {
		4 => {
			let mut octets = [0u8; 4];
			octets.copy_from_slice(ip);
			Ok(IpAddr::V4(Ipv4Addr::from(octets)))
		}
		16 => {
			let mut octets = [0u8; 16];
			octets.copy_from_slice(ip);
			Ok(IpAddr::V6(Ipv6Addr::from(octets)))
		}
		n => Err(AddrError::InvalidIp(format!("{n}-byte address"))),
	}
}

pub fn ip_to_raw(ip: &IpAddr) -> Vec<u8> {
	match ip {
		IpAddr::V4(v4) => v4.octets().to_vec(),
		IpAddr::V6(v6) => v6.octets().to_vec(),
	}
}

fn prefix_len(mask: &[u8]) -> Result<u8> {
	let mut ones = 0u8;
	let mut seen_zero = false;
	for byte in mask {
		for bit in (0..8).rev() {
			if byte & (1 << bit) != 0 {
				if seen_zero {
					return Err(AddrError::NonContiguousMask);
				}
				ones += 1;
			} else {
				seen_zero = true;
			}
		}
	}
	Ok(ones)
}

pub fn parse_address(s: &str) -> Result<IpNet> {
	s.trim()
		.parse()
		.map_err(|_| AddrError::InvalidCidr(s.to_string()))
}

pub fn parse_addresses<S: AsRef<str>>(items: &[S]) -> Result<Vec<IpNet>> {
	items.iter().map(|s| parse_address(s.as_ref())).collect()
}

pub fn parse_ips<S: AsRef<str>>(items: &[S]) -> Result<Vec<IpAddr>> {
	items
		.iter()
		.map(|s| {
			let s = s.as_ref().trim();
			s.parse().map_err(|_| AddrError::InvalidIp(s.to_string()))
		})
		.collect()
}

pub fn format_addresses(items: &[IpNet], sep: &str) -> String {
	items
		.iter()
		.map(|n| n.to_string())
		.collect::<Vec<_>>()
		.join(sep)
}

pub fn format_ips(items: &[IpAddr], sep: &str) -> String {
	items
		.iter()
		.map(|ip| ip.to_string())
		.collect::<Vec<_>>()
		.join(sep)
}
