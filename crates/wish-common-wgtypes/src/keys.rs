// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Curve25519 keys in the form WireGuard expects.
//!
//! Keys travel as standard, padded base64 (44 characters), which is what
//! `wg` prints in `show dump` and what `wg-quick` reads from config files.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

pub const KEY_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
	#[error("incorrect key size: {0}")]
	InvalidLength(usize),

	#[error("failed to parse base64-encoded key: {0}")]
	InvalidBase64(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, KeyError>;

fn decode_key(s: &str) -> Result<[u8; KEY_LEN]> {
	let bytes = Zeroizing::new(STANDARD.decode(s.trim())?);
	if bytes.len() != KEY_LEN {
		return Err(KeyError::InvalidLength(bytes.len()));
	}
	let mut arr = [0u8; KEY_LEN];
	arr.copy_from_slice(&bytes);
	Ok(arr)
}

/// Applies the X25519 scalar clamping rules in place.
pub fn clamp(bytes: &mut [u8; KEY_LEN]) {
	bytes[0] &= 248;
	bytes[31] &= 127;
	bytes[31] |= 64;
}

#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct WgPrivateKey {
	bytes: [u8; KEY_LEN],
}

impl WgPrivateKey {
	/// Generates a fresh, clamped private key from the OS RNG.
	pub fn generate() -> Self {
		let mut bytes = [0u8; KEY_LEN];
		OsRng.fill_bytes(&mut bytes);
		clamp(&mut bytes);
		Self { bytes }
	}

	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_key(s)?,
		})
	}

	pub fn to_base64(&self) -> Zeroizing<String> {
		Zeroizing::new(STANDARD.encode(self.bytes))
	}

	pub fn public_key(&self) -> WgPublicKey {
		let secret = StaticSecret::from(self.bytes);
		let public = PublicKey::from(&secret);
		WgPublicKey {
			bytes: *public.as_bytes(),
		}
	}

	pub fn expose_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}
}

impl fmt::Debug for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgPrivateKey")
			.field("bytes", &"[REDACTED]")
			.finish()
	}
}

impl fmt::Display for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("[REDACTED]")
	}
}

impl Serialize for WgPrivateKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str("[REDACTED]")
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WgPublicKey {
	bytes: [u8; KEY_LEN],
}

impl WgPublicKey {
	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_key(s)?,
		})
	}

	pub fn to_base64(&self) -> String {
		STANDARD.encode(self.bytes)
	}

	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}
}

impl FromStr for WgPublicKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self> {
		Self::from_base64(s)
	}
}

impl fmt::Debug for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let b64 = self.to_base64();
		f.debug_struct("WgPublicKey")
			.field("prefix", &format!("{}...", &b64[..8]))
			.finish()
	}
}

impl fmt::Display for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base64())
	}
}

impl Serialize for WgPublicKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for WgPublicKey {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Self::from_base64(&s).map_err(serde::de::Error::custom)
	}
}

#[derive(Clone)]
pub struct WgKeyPair {
	private: WgPrivateKey,
	public: WgPublicKey,
}

impl WgKeyPair {
	pub fn generate() -> Self {
		Self::from_private_key(WgPrivateKey::generate())
	}

	pub fn from_private_key(private: WgPrivateKey) -> Self {
		let public = private.public_key();
		Self { private, public }
	}

	pub fn private_key(&self) -> &WgPrivateKey {
		&self.private
	}

	pub fn public_key(&self) -> &WgPublicKey {
		&self.public
	}

	pub fn into_parts(self) -> (WgPrivateKey, WgPublicKey) {
		(self.private, self.public)
	}
}

impl fmt::Debug for WgKeyPair {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgKeyPair")
			.field("private", &self.private)
			.field("public", &self.public)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	const KNOWN_PRIVATE: &str = "YAnz9TxSObxB6MlT6ri5h3ASPkZ2ZlW5QiBCXsA1xHo=";

	#[test]
	fn generated_keys_are_clamped() {
		for _ in 0..32 {
			let key = WgPrivateKey::generate();
			let bytes = key.expose_bytes();
			assert_eq!(bytes[0] & 0b0000_0111, 0);
			assert_eq!(bytes[31] & 0b1000_0000, 0);
			assert_eq!(bytes[31] & 0b0100_0000, 0b0100_0000);
		}
	}

	#[test]
	fn clamp_matches_wireguard_rules() {
		let mut bytes = [0xffu8; KEY_LEN];
		clamp(&mut bytes);
		assert_eq!(bytes[0], 0xf8);
		assert_eq!(bytes[31], 0x7f);

		let mut zeros = [0u8; KEY_LEN];
		clamp(&mut zeros);
		assert_eq!(zeros[31], 0x40);
	}

	#[test]
	fn base64_is_padded() {
		let keypair = WgKeyPair::generate();
		let encoded = keypair.public_key().to_base64();
		assert_eq!(encoded.len(), 44);
		assert!(encoded.ends_with('='));
	}

	#[test]
	fn private_key_roundtrip_preserves_public_key() {
		let keypair = WgKeyPair::generate();
		let b64 = keypair.private_key().to_base64();
		let restored = WgPrivateKey::from_base64(&b64).unwrap();
		assert_eq!(keypair.public_key(), &restored.public_key());
	}

	#[test]
	fn known_private_key_parses() {
		let key = WgPrivateKey::from_base64(KNOWN_PRIVATE).unwrap();
		assert_eq!(key.to_base64().as_str(), KNOWN_PRIVATE);
	}

	#[test]
	fn rejects_short_key() {
		let err = WgPublicKey::from_base64("AAAA").unwrap_err();
		assert_eq!(err, KeyError::InvalidLength(3));
	}

	#[test]
	fn rejects_garbage() {
		assert!(matches!(
			WgPublicKey::from_base64("not base64!"),
			Err(KeyError::InvalidBase64(_))
		));
	}

	#[test]
	fn private_key_debug_and_display_are_redacted() {
		let private = WgPrivateKey::generate();
		let b64 = private.to_base64();
		assert!(!format!("{:?}", private).contains(b64.as_str()));
		assert_eq!(format!("{}", private), "[REDACTED]");
	}

	#[test]
	fn public_key_serde_roundtrip() {
		let keypair = WgKeyPair::generate();
		let json = serde_json::to_string(keypair.public_key()).unwrap();
		let restored: WgPublicKey = serde_json::from_str(&json).unwrap();
		assert_eq!(keypair.public_key(), &restored);
	}

	proptest! {
		#[test]
		fn private_key_display_never_leaks(seed in prop::array::uniform32(any::<u8>())) {
			let private = WgPrivateKey::from_bytes(seed);
			let b64 = STANDARD.encode(seed);
			let debug = format!("{private:?}");
			let json = serde_json::to_string(&private).unwrap();
			prop_assert!(!debug.contains(&b64));
			prop_assert!(!json.contains(&b64));
		}

		#[test]
		fn public_key_base64_roundtrip(seed in prop::array::uniform32(any::<u8>())) {
			let public = WgPublicKey::from_bytes(seed);
			let restored: WgPublicKey = public.to_base64().parse().unwrap();
			prop_assert_eq!(public, restored);
		}
	}
}
