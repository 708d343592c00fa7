// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The one-byte header in front of every stored value.
//!
//! ```text
//!  7 6 5 4 3 2 1 0
//! +-----+-+-------+
//! | rsv |C|  v-1  |
//! +-----+-+-------+
//! ```
//!
//! The low nibble holds the record version minus one, so versions 1 to 16
//! fit. `C` marks a collision record. The top three bits are reserved and
//! ignored on read.

use crate::error::{DbError, Result};

pub const VERSION_MASK: u8 = 0x0f;
pub const COLLISION_FLAG: u8 = 0x10;
pub const MAX_VERSION: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
	version: u8,
	collision: bool,
}

impl Meta {
	pub fn new(version: u8) -> Result<Self> {
		if !(1..=MAX_VERSION).contains(&version) {
			return Err(DbError::UnsupportedVersion(version));
		}
		Ok(Self {
			version,
			collision: false,
		})
	}

	pub fn with_collision(mut self, collision: bool) -> Self {
		self.collision = collision;
		self
	}

	pub fn version(&self) -> u8 {
		self.version
	}

	pub fn is_collision(&self) -> bool {
		self.collision
	}

	pub fn to_byte(self) -> u8 {
		let mut byte = (self.version - 1) & VERSION_MASK;
		if self.collision {
			byte |= COLLISION_FLAG;
		}
		byte
	}

	pub fn from_byte(byte: u8) -> Self {
		Self {
			version: (byte & VERSION_MASK) + 1,
			collision: byte & COLLISION_FLAG != 0,
		}
	}

	/// Splits a stored value into its header and payload.
	pub fn split(value: &[u8]) -> Result<(Self, &[u8])> {
		match value.split_first() {
			Some((&byte, payload)) => Ok((Self::from_byte(byte), payload)),
			None => Err(DbError::Corrupted("empty value".to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn version_one_is_zero_byte() {
		assert_eq!(Meta::new(1).unwrap().to_byte(), 0x00);
		assert_eq!(Meta::new(16).unwrap().to_byte(), 0x0f);
	}

	#[test]
	fn collision_sets_bit_four() {
		let meta = Meta::new(1).unwrap().with_collision(true);
		assert_eq!(meta.to_byte(), 0x10);
		assert!(Meta::from_byte(0x13).is_collision());
		assert_eq!(Meta::from_byte(0x13).version(), 4);
	}

	#[test]
	fn reserved_bits_are_ignored() {
		let meta = Meta::from_byte(0b1110_0001);
		assert_eq!(meta.version(), 2);
		assert!(!meta.is_collision());
	}

	#[test]
	fn rejects_out_of_range_versions() {
		assert!(matches!(Meta::new(0), Err(DbError::UnsupportedVersion(0))));
		assert!(matches!(Meta::new(17), Err(DbError::UnsupportedVersion(17))));
	}

	#[test]
	fn split_rejects_empty_value() {
		assert!(matches!(Meta::split(&[]), Err(DbError::Corrupted(_))));
		let (meta, payload) = Meta::split(&[0x00, 0x91, 0xa0]).unwrap();
		assert_eq!(meta.version(), 1);
		assert_eq!(payload, &[0x91, 0xa0]);
	}

	proptest! {
		#[test]
		fn header_roundtrips(version in 1u8..=16, collision in any::<bool>()) {
			let meta = Meta::new(version).unwrap().with_collision(collision);
			prop_assert_eq!(Meta::from_byte(meta.to_byte()), meta);
		}
	}
}
