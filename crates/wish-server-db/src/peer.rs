// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer identities keyed by name.

use sqlx::sqlite::SqliteConnection;

use crate::error::{DbError, Result};
use crate::kv::{Bucket, Kv};
use crate::records::PeerIdentity;

pub struct PeerRepo<'a> {
	kv: Kv<'a>,
}

impl<'a> PeerRepo<'a> {
	pub(crate) fn new(conn: &'a mut SqliteConnection, writable: bool) -> Self {
		Self {
			kv: Kv::new(conn, Bucket::WgClient, writable),
		}
	}

	#[tracing::instrument(skip(self, peer), fields(name = %peer.name, address = %peer.address))]
	pub async fn add(&mut self, peer: &PeerIdentity) -> Result<()> {
		let value = peer.encode_value()?;
		if !self.kv.insert(peer.name.as_bytes(), &value).await? {
			return Err(DbError::AlreadyExists(format!("peer {}", peer.name)));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn remove(&mut self, name: &str) -> Result<()> {
		if !self.kv.delete(name.as_bytes()).await? {
			return Err(DbError::NotFound(format!("peer {name}")));
		}
		Ok(())
	}

	pub async fn exists(&mut self, name: &str) -> Result<bool> {
		self.kv.exists(name.as_bytes()).await
	}

	#[tracing::instrument(skip(self))]
	pub async fn get(&mut self, name: &str) -> Result<PeerIdentity> {
		let value = self
			.kv
			.get(name.as_bytes())
			.await?
			.ok_or_else(|| DbError::NotFound(format!("peer {name}")))?;
		PeerIdentity::decode(name.to_string(), &value)
	}

	/// All peers in name order.
	pub async fn get_all(&mut self) -> Result<Vec<PeerIdentity>> {
		self.kv
			.all()
			.await?
			.into_iter()
			.map(|(key, value)| {
				let name = String::from_utf8(key)
					.map_err(|e| DbError::Corrupted(format!("peer name is not utf-8: {e}")))?;
				PeerIdentity::decode(name, &value)
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use crate::error::DbError;
	use crate::records::PeerIdentity;
	use crate::testing::create_test_store;
	use wish_common_wgtypes::WgKeyPair;

	fn peer(name: &str, address: &str) -> PeerIdentity {
		let (private_key, public_key) = WgKeyPair::generate().into_parts();
		PeerIdentity {
			name: name.to_string(),
			address: address.parse().unwrap(),
			private_key,
			public_key,
			dns: vec!["1.1.1.1".parse().unwrap()],
			allowed_ips: vec!["0.0.0.0/0".parse().unwrap()],
			persistent_keepalive: Some(25),
		}
	}

	#[tokio::test]
	async fn add_then_get() {
		let store = create_test_store().await;
		let alice = peer("alice", "10.9.8.2/24");

		let mut tx = store.update().await.unwrap();
		tx.peers().add(&alice).await.unwrap();
		tx.commit().await.unwrap().release();

		let mut view = store.view().await.unwrap();
		assert!(view.peers().exists("alice").await.unwrap());
		assert_eq!(view.peers().get("alice").await.unwrap(), alice);
	}

	#[tokio::test]
	async fn duplicate_name_is_rejected() {
		let store = create_test_store().await;
		let mut tx = store.update().await.unwrap();
		tx.peers().add(&peer("alice", "10.9.8.2/24")).await.unwrap();
		let err = tx.peers().add(&peer("alice", "10.9.8.3/24")).await.unwrap_err();
		assert!(matches!(err, DbError::AlreadyExists(_)));
	}

	#[tokio::test]
	async fn missing_peer_is_not_found() {
		let store = create_test_store().await;
		let mut tx = store.update().await.unwrap();
		assert!(matches!(tx.peers().get("ghost").await, Err(DbError::NotFound(_))));
		assert!(matches!(tx.peers().remove("ghost").await, Err(DbError::NotFound(_))));
	}

	#[tokio::test]
	async fn get_all_sorted_by_name() {
		let store = create_test_store().await;
		let mut tx = store.update().await.unwrap();
		for (name, addr) in [("carol", "10.9.8.4/24"), ("alice", "10.9.8.2/24"), ("bob", "10.9.8.3/24")] {
			tx.peers().add(&peer(name, addr)).await.unwrap();
		}
		let names: Vec<String> = tx
			.peers()
			.get_all()
			.await
			.unwrap()
			.into_iter()
			.map(|p| p.name)
			.collect();
		assert_eq!(names, ["alice", "bob", "carol"]);
	}
}
