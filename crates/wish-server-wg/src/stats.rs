// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Parser for `wg show <interface> dump`.
//!
//! The first line describes the interface and is skipped. Every peer then
//! contributes eight whitespace-separated fields:
//!
//! ```text
//! public-key preshared-key endpoint allowed-ips latest-handshake rx tx keepalive
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use wish_common_wgtypes::WgPublicKey;

use crate::error::{Result, WgError};

pub const FIELDS_PER_PEER: usize = 8;

const FIELD_PUBLIC_KEY: usize = 0;
const FIELD_HANDSHAKE: usize = 4;
const FIELD_RECEIVED: usize = 5;
const FIELD_SENT: usize = 6;

/// A point-in-time traffic snapshot for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerStats {
	pub received: u64,
	pub sent: u64,
	/// `None` until the first handshake completes.
	pub latest_handshake: Option<DateTime<Utc>>,
}

pub type StatsMap = HashMap<WgPublicKey, PeerStats>;

#[derive(Default)]
struct Partial {
	public_key: Option<WgPublicKey>,
	stats: PeerStats,
}

fn is_separator(b: u8) -> bool {
	matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

fn parse_u64(field: &str, what: &str) -> Result<u64> {
	field
		.parse()
		.map_err(|_| WgError::StatsParse(format!("{what} {field:?} is not a number")))
}

pub fn parse_dump(output: &str) -> Result<StatsMap> {
	let mut peers = StatsMap::new();

	let Some((_, body)) = output.split_once('\n') else {
		return Ok(peers);
	};

	let bytes = body.as_bytes();
	let mut pos = 0;
	let mut field_num = 0usize;
	let mut current = Partial::default();

	while pos < bytes.len() {
		while pos < bytes.len() && is_separator(bytes[pos]) {
			pos += 1;
		}
		if pos == bytes.len() {
			break;
		}
		let start = pos;
		while pos < bytes.len() && !is_separator(bytes[pos]) {
			pos += 1;
		}
		let field = &body[start..pos];

		match field_num % FIELDS_PER_PEER {
			FIELD_PUBLIC_KEY => {
				let key = WgPublicKey::from_base64(field)
					.map_err(|e| WgError::StatsParse(format!("public key {field:?}: {e}")))?;
				current.public_key = Some(key);
			}
			FIELD_HANDSHAKE => {
				let secs = parse_u64(field, "handshake")?;
				current.stats.latest_handshake = match secs {
					0 => None,
					secs => {
						let secs = i64::try_from(secs)
							.map_err(|_| WgError::StatsParse(format!("handshake {secs} out of range")))?;
						Some(DateTime::from_timestamp(secs, 0).ok_or_else(|| {
							WgError::StatsParse(format!("handshake {secs} out of range"))
						})?)
					}
				};
			}
			FIELD_RECEIVED => current.stats.received = parse_u64(field, "received bytes")?,
			FIELD_SENT => current.stats.sent = parse_u64(field, "sent bytes")?,
			_ => {}
		}

		field_num += 1;
		if field_num % FIELDS_PER_PEER == 0 {
			let done = std::mem::take(&mut current);
			if let Some(key) = done.public_key {
				peers.insert(key, done.stats);
			}
		}
	}

	if field_num % FIELDS_PER_PEER != 0 {
		return Err(WgError::StatsParse(format!(
			"truncated peer record: {} of {FIELDS_PER_PEER} fields",
			field_num % FIELDS_PER_PEER
		)));
	}

	Ok(peers)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use wish_common_wgtypes::WgKeyPair;

	const HEADER: &str = "cHJpdmF0ZQ==\tcHVibGlj\t51820\toff";

	fn key() -> WgPublicKey {
		*WgKeyPair::generate().public_key()
	}

	#[test]
	fn parses_handshake_and_counters() {
		let pk = key();
		let out = format!("{HEADER}\n{pk}\t(none)\t203.0.113.5:41000\t10.9.8.2/32\t1700000000\t100\t200\t25\n");
		let stats = parse_dump(&out).unwrap();
		let peer = stats[&pk];
		assert_eq!(peer.received, 100);
		assert_eq!(peer.sent, 200);
		assert_eq!(peer.latest_handshake.unwrap().timestamp(), 1_700_000_000);
	}

	#[test]
	fn zero_handshake_is_none() {
		let pk = key();
		let out = format!("{HEADER}\n{pk}\t(none)\t(none)\t10.9.8.2/32\t0\t0\t0\toff\n");
		let stats = parse_dump(&out).unwrap();
		assert_eq!(stats[&pk].latest_handshake, None);
	}

	#[test]
	fn space_separated_and_trailing_whitespace() {
		let a = key();
		let b = key();
		let out = format!(
			"{HEADER}\n{a} (none) 1.2.3.4:5 10.9.8.2/32 10 1 2 off\n{b} (none) (none) 10.9.8.3/32 0 3 4 25 \n\n  "
		);
		let stats = parse_dump(&out).unwrap();
		assert_eq!(stats.len(), 2);
		assert_eq!(stats[&b].received, 3);
		assert_eq!(stats[&b].sent, 4);
	}

	#[test]
	fn no_newline_means_no_peers() {
		assert!(parse_dump(HEADER).unwrap().is_empty());
		assert!(parse_dump("").unwrap().is_empty());
	}

	#[test]
	fn header_only_means_no_peers() {
		assert!(parse_dump(&format!("{HEADER}\n")).unwrap().is_empty());
	}

	#[test]
	fn truncated_record_is_an_error() {
		let pk = key();
		let out = format!("{HEADER}\n{pk}\t(none)\t(none)\t10.9.8.2/32\t0\t1\n");
		assert!(matches!(parse_dump(&out), Err(WgError::StatsParse(_))));
	}

	#[test]
	fn bad_counter_is_an_error() {
		let pk = key();
		let out = format!("{HEADER}\n{pk}\t(none)\t(none)\t10.9.8.2/32\t0\tlots\t1\toff\n");
		assert!(matches!(parse_dump(&out), Err(WgError::StatsParse(_))));
	}

	proptest! {
		#[test]
		fn counters_survive_parsing(rx in any::<u64>(), tx in any::<u64>(), hs in 0u32..) {
			let pk = key();
			let out = format!("{HEADER}\n{pk}\t(none)\t(none)\t10.9.8.2/32\t{hs}\t{rx}\t{tx}\toff\n");
			let stats = parse_dump(&out).unwrap();
			prop_assert_eq!(stats[&pk].received, rx);
			prop_assert_eq!(stats[&pk].sent, tx);
			prop_assert_eq!(stats[&pk].latest_handshake.is_none(), hs == 0);
		}
	}
}
