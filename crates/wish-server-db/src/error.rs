// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Already exists: {0}")]
	AlreadyExists(String),

	#[error("write attempted in a read-only transaction")]
	ReadOnly,

	#[error("unsupported record version {0}")]
	UnsupportedVersion(u8),

	#[error("corrupted record: {0}")]
	Corrupted(String),

	#[error("Encoding error: {0}")]
	Encode(#[from] rmp_serde::encode::Error),

	#[error("Decoding error: {0}")]
	Decode(#[from] rmp_serde::decode::Error),

	#[error("Internal: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
