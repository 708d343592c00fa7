// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WgError {
	#[error("peer {0} already exists")]
	PeerExists(String),

	#[error("peer {0} not found")]
	PeerNotFound(String),

	#[error("interface configuration has not been loaded")]
	NotConfigured,

	#[error("{command} failed: {stderr}")]
	ToolFailure { command: String, stderr: String },

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("failed to parse status dump: {0}")]
	StatsParse(String),
}

pub type Result<T> = std::result::Result<T, WgError>;
