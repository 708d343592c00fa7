// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! OpenSSH `authorized_keys` lines.
//!
//! Administrator credentials are keyed by the SSH wire-format blob, so two
//! lines that differ only in their comment identify the same administrator.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizedKeyError {
	#[error("empty authorized key line")]
	Empty,

	#[error("missing key data after {0}")]
	MissingBlob(String),

	#[error("invalid key data: {0}")]
	InvalidBase64(#[from] base64::DecodeError),

	#[error("key data is truncated")]
	Truncated,

	#[error("key type {declared} does not match encoded type {encoded}")]
	AlgorithmMismatch { declared: String, encoded: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthorizedKey {
	algorithm: String,
	blob: Vec<u8>,
	comment: String,
}

impl AuthorizedKey {
	/// Builds a key from a stored wire blob, reading the algorithm back out.
	pub fn from_blob(blob: Vec<u8>, comment: impl Into<String>) -> Result<Self, AuthorizedKeyError> {
		let algorithm = read_algorithm(&blob)?;
		Ok(Self {
			algorithm,
			blob,
			comment: comment.into(),
		})
	}

	pub fn algorithm(&self) -> &str {
		&self.algorithm
	}

	pub fn blob(&self) -> &[u8] {
		&self.blob
	}

	pub fn into_blob(self) -> Vec<u8> {
		self.blob
	}

	pub fn comment(&self) -> &str {
		&self.comment
	}
}

fn read_algorithm(blob: &[u8]) -> Result<String, AuthorizedKeyError> {
	let len_bytes: [u8; 4] = blob
		.get(..4)
		.and_then(|b| b.try_into().ok())
		.ok_or(AuthorizedKeyError::Truncated)?;
	let len = u32::from_be_bytes(len_bytes) as usize;
	let name = blob
		.get(4..4usize.saturating_add(len))
		.ok_or(AuthorizedKeyError::Truncated)?;
	Ok(String::from_utf8_lossy(name).into_owned())
}

fn is_key_type(token: &str) -> bool {
	token.starts_with("ssh-")
		|| token.starts_with("ecdsa-sha2-")
		|| token.starts_with("sk-ssh-")
		|| token.starts_with("sk-ecdsa-")
}

impl FromStr for AuthorizedKey {
	type Err = AuthorizedKeyError;

	/// Accepts `[options] type base64 [comment]`.
	fn from_str(line: &str) -> Result<Self, Self::Err> {
		let line = line.trim();
		if line.is_empty() || line.starts_with('#') {
			return Err(AuthorizedKeyError::Empty);
		}

		let mut fields = line.split_whitespace().peekable();
		while let Some(token) = fields.peek() {
			if is_key_type(token) {
				break;
			}
			fields.next();
		}

		let declared = fields.next().ok_or(AuthorizedKeyError::Empty)?;
		let data = fields
			.next()
			.ok_or_else(|| AuthorizedKeyError::MissingBlob(declared.to_string()))?;
		let comment = fields.collect::<Vec<_>>().join(" ");

		let blob = STANDARD.decode(data)?;
		let encoded = read_algorithm(&blob)?;
		if encoded != declared {
			return Err(AuthorizedKeyError::AlgorithmMismatch {
				declared: declared.to_string(),
				encoded,
			});
		}

		Ok(Self {
			algorithm: encoded,
			blob,
			comment,
		})
	}
}

impl fmt::Display for AuthorizedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}", self.algorithm, STANDARD.encode(&self.blob))?;
		if !self.comment.is_empty() {
			write!(f, " {}", self.comment)?;
		}
		Ok(())
	}
}
