// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::SqliteConnection;

use crate::error::{DbError, Result};
use crate::kv::{Bucket, Kv};
use crate::records::{ServerIdentity, SERVER_KEY};

/// The server's singleton identity record.
pub struct ServerRepo<'a> {
	kv: Kv<'a>,
}

impl<'a> ServerRepo<'a> {
	pub(crate) fn new(conn: &'a mut SqliteConnection, writable: bool) -> Self {
		Self {
			kv: Kv::new(conn, Bucket::WgServer, writable),
		}
	}

	#[tracing::instrument(skip_all)]
	pub async fn set(&mut self, identity: &ServerIdentity) -> Result<()> {
		let value = identity.encode_value()?;
		self.kv.put(SERVER_KEY, &value).await
	}

	pub async fn get(&mut self) -> Result<ServerIdentity> {
		let value = self
			.kv
			.get(SERVER_KEY)
			.await?
			.ok_or_else(|| DbError::NotFound("server identity".to_string()))?;
		ServerIdentity::decode(&value)
	}

	pub async fn exists(&mut self) -> Result<bool> {
		self.kv.exists(SERVER_KEY).await
	}
}

#[cfg(test)]
mod tests {
	use crate::error::DbError;
	use crate::records::ServerIdentity;
	use crate::testing::create_test_store;
	use wish_common_wgtypes::WgPrivateKey;

	#[tokio::test]
	async fn get_before_set_is_not_found() {
		let store = create_test_store().await;
		let mut view = store.view().await.unwrap();
		assert!(!view.server().exists().await.unwrap());
		assert!(matches!(view.server().get().await, Err(DbError::NotFound(_))));
	}

	#[tokio::test]
	async fn set_replaces_singleton() {
		let store = create_test_store().await;
		let first = ServerIdentity {
			private_key: WgPrivateKey::generate(),
		};
		let second = ServerIdentity {
			private_key: WgPrivateKey::generate(),
		};

		let mut tx = store.update().await.unwrap();
		tx.server().set(&first).await.unwrap();
		tx.server().set(&second).await.unwrap();
		assert_eq!(tx.server().get().await.unwrap(), second);
	}
}
