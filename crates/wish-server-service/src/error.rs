// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;
use wish_common_wgtypes::AddrError;
use wish_server_db::DbError;
use wish_server_wg::WgError;

/// Message shown for anything that is not caller-actionable.
pub const GENERIC_MESSAGE: &str = "internal error";

/// Coarse classification used by the access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	NotFound,
	AlreadyExists,
	Overlap,
	AllocationExhausted,
	ExternalToolFailure,
	Internal,
	Domain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
	PublicKey,
	WireGuard,
}

impl Domain {
	pub fn as_str(self) -> &'static str {
		match self {
			Domain::PublicKey => "pubkey",
			Domain::WireGuard => "wg",
		}
	}
}

impl fmt::Display for Domain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Error, Debug)]
pub enum ServiceError {
	#[error("{domain}: {message}")]
	NotFound { domain: Domain, message: &'static str },

	#[error("{domain}: {message}")]
	AlreadyExists { domain: Domain, message: &'static str },

	#[error("wg: wireguard client address {requested} overlaps with wireguard server address {server}")]
	Overlap { requested: IpNet, server: IpAddr },

	#[error("wg: no free addresses left in {subnet}")]
	AllocationExhausted { subnet: IpNet },

	#[error("failed to run {command:?}: {stderr}")]
	ExternalTool { command: String, stderr: String },

	#[error("{domain}: {message}")]
	Domain { domain: Domain, message: String },

	#[error("internal error: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
	pub fn public_key_exists() -> Self {
		Self::AlreadyExists {
			domain: Domain::PublicKey,
			message: "public key already exists",
		}
	}

	pub fn public_key_not_found() -> Self {
		Self::NotFound {
			domain: Domain::PublicKey,
			message: "public key not found",
		}
	}

	pub fn client_exists() -> Self {
		Self::AlreadyExists {
			domain: Domain::WireGuard,
			message: "wireguard client already exists",
		}
	}

	pub fn client_not_found() -> Self {
		Self::NotFound {
			domain: Domain::WireGuard,
			message: "wireguard client not found",
		}
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::NotFound { .. } => ErrorKind::NotFound,
			Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
			Self::Overlap { .. } => ErrorKind::Overlap,
			Self::AllocationExhausted { .. } => ErrorKind::AllocationExhausted,
			Self::ExternalTool { .. } => ErrorKind::ExternalToolFailure,
			Self::Domain { .. } => ErrorKind::Domain,
			Self::Internal(_) => ErrorKind::Internal,
		}
	}

	/// The domain tag for errors a caller can act on.
	pub fn domain(&self) -> Option<Domain> {
		match self {
			Self::NotFound { domain, .. }
			| Self::AlreadyExists { domain, .. }
			| Self::Domain { domain, .. } => Some(*domain),
			Self::Overlap { .. } | Self::AllocationExhausted { .. } => Some(Domain::WireGuard),
			Self::ExternalTool { .. } | Self::Internal(_) => None,
		}
	}

	/// What the administrator gets to see. Internal detail stays in logs.
	pub fn public_message(&self) -> String {
		match self {
			Self::NotFound { message, .. } | Self::AlreadyExists { message, .. } => {
				(*message).to_string()
			}
			Self::Overlap { .. } => {
				"wireguard client address overlaps with wireguard server address".to_string()
			}
			Self::AllocationExhausted { .. } => "no free wireguard client addresses left".to_string(),
			Self::Domain { message, .. } => message.clone(),
			Self::ExternalTool { .. } | Self::Internal(_) => GENERIC_MESSAGE.to_string(),
		}
	}
}

impl From<DbError> for ServiceError {
	fn from(e: DbError) -> Self {
		match e {
			DbError::AlreadyExists(what) if what == "public key" => Self::public_key_exists(),
			DbError::NotFound(what) if what == "public key" => Self::public_key_not_found(),
			DbError::AlreadyExists(what) if what.starts_with("peer ") => Self::client_exists(),
			DbError::NotFound(what) if what.starts_with("peer ") => Self::client_not_found(),
			// A missing server identity or a broken row is not the caller's to fix.
			other => Self::Internal(other.to_string()),
		}
	}
}

impl From<WgError> for ServiceError {
	fn from(e: WgError) -> Self {
		match e {
			WgError::ToolFailure { command, stderr } => Self::ExternalTool { command, stderr },
			// The controller disagreeing with the store is never the caller's fault.
			other => Self::Internal(other.to_string()),
		}
	}
}

impl From<AddrError> for ServiceError {
	fn from(e: AddrError) -> Self {
		Self::Internal(e.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn domain_errors_are_shown_verbatim() {
		let err = ServiceError::client_exists();
		assert_eq!(err.kind(), ErrorKind::AlreadyExists);
		assert_eq!(err.domain(), Some(Domain::WireGuard));
		assert_eq!(err.public_message(), "wireguard client already exists");

		let err = ServiceError::public_key_not_found();
		assert_eq!(err.domain().map(Domain::as_str), Some("pubkey"));
		assert_eq!(err.public_message(), "public key not found");
	}

	#[test]
	fn tool_failures_keep_stderr_out_of_public_message() {
		let err = ServiceError::from(WgError::ToolFailure {
			command: "wg-quick up /var/lib/wg-wish/wg0.conf".to_string(),
			stderr: "RTNETLINK answers: Operation not permitted".to_string(),
		});
		assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
		assert_eq!(err.domain(), None);
		assert_eq!(err.public_message(), GENERIC_MESSAGE);
		assert!(err.to_string().contains("RTNETLINK"));
	}

	#[test]
	fn controller_divergence_is_internal() {
		let err = ServiceError::from(WgError::PeerExists("alice".to_string()));
		assert_eq!(err.kind(), ErrorKind::Internal);
		assert_eq!(err.public_message(), GENERIC_MESSAGE);
	}

	#[test]
	fn store_errors_are_internal() {
		let err = ServiceError::from(DbError::Corrupted("short key".to_string()));
		assert_eq!(err.kind(), ErrorKind::Internal);

		let err = ServiceError::from(DbError::NotFound("server identity".to_string()));
		assert_eq!(err.kind(), ErrorKind::Internal);
		assert_eq!(err.public_message(), GENERIC_MESSAGE);
	}

	#[test]
	fn store_conflicts_keep_their_taxonomy() {
		let err = ServiceError::from(DbError::AlreadyExists("public key".to_string()));
		assert_eq!(err.kind(), ErrorKind::AlreadyExists);
		assert_eq!(err.domain(), Some(Domain::PublicKey));
		assert_eq!(err.public_message(), "public key already exists");

		let err = ServiceError::from(DbError::AlreadyExists("peer alice".to_string()));
		assert_eq!(err.kind(), ErrorKind::AlreadyExists);
		assert_eq!(err.domain(), Some(Domain::WireGuard));
		assert_eq!(err.public_message(), "wireguard client already exists");

		let err = ServiceError::from(DbError::NotFound("peer alice".to_string()));
		assert_eq!(err.kind(), ErrorKind::NotFound);
		assert_eq!(err.public_message(), "wireguard client not found");
	}
}
