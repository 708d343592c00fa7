// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Administrator credentials keyed by SSH public-key blob.

use sqlx::sqlite::SqliteConnection;

use crate::error::{DbError, Result};
use crate::kv::{Bucket, Kv};
use crate::records::Credential;

pub struct CredentialRepo<'a> {
	kv: Kv<'a>,
}

impl<'a> CredentialRepo<'a> {
	pub(crate) fn new(conn: &'a mut SqliteConnection, writable: bool) -> Self {
		Self {
			kv: Kv::new(conn, Bucket::PublicKey, writable),
		}
	}

	#[tracing::instrument(skip(self, credential), fields(comment = %credential.comment))]
	pub async fn add(&mut self, credential: &Credential) -> Result<()> {
		let value = credential.encode_value()?;
		if !self.kv.insert(&credential.key, &value).await? {
			return Err(DbError::AlreadyExists("public key".to_string()));
		}
		Ok(())
	}

	/// Inserts or replaces.
	#[tracing::instrument(skip(self, credential), fields(comment = %credential.comment))]
	pub async fn set(&mut self, credential: &Credential) -> Result<()> {
		let value = credential.encode_value()?;
		self.kv.put(&credential.key, &value).await
	}

	pub async fn exists(&mut self, key: &[u8]) -> Result<bool> {
		self.kv.exists(key).await
	}

	/// Removing an absent key is not an error.
	#[tracing::instrument(skip(self, key))]
	pub async fn remove(&mut self, key: &[u8]) -> Result<()> {
		self.kv.delete(key).await?;
		Ok(())
	}

	pub async fn get_all(&mut self) -> Result<Vec<Credential>> {
		self.kv
			.all()
			.await?
			.into_iter()
			.map(|(key, value)| Credential::decode(key, &value))
			.collect()
	}

	/// Clears the collection and inserts `credentials`, all within the
	/// surrounding transaction.
	#[tracing::instrument(skip(self, credentials), fields(count = credentials.len()))]
	pub async fn replace_all(&mut self, credentials: &[Credential]) -> Result<()> {
		self.kv.clear().await?;
		for credential in credentials {
			let value = credential.encode_value()?;
			self.kv.put(&credential.key, &value).await?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::error::DbError;
	use crate::records::Credential;
	use crate::testing::create_test_store;

	fn cred(key: &[u8], comment: &str) -> Credential {
		Credential {
			key: key.to_vec(),
			comment: comment.to_string(),
		}
	}

	#[tokio::test]
	async fn add_rejects_duplicate_key() {
		let store = create_test_store().await;
		let mut tx = store.update().await.unwrap();
		tx.credentials().add(&cred(b"k", "first")).await.unwrap();
		let err = tx.credentials().add(&cred(b"k", "second")).await.unwrap_err();
		assert!(matches!(err, DbError::AlreadyExists(_)));
	}

	#[tokio::test]
	async fn set_overwrites_comment() {
		let store = create_test_store().await;
		let mut tx = store.update().await.unwrap();
		tx.credentials().set(&cred(b"k", "first")).await.unwrap();
		tx.credentials().set(&cred(b"k", "second")).await.unwrap();
		assert_eq!(
			tx.credentials().get_all().await.unwrap(),
			vec![cred(b"k", "second")]
		);
	}

	#[tokio::test]
	async fn get_all_is_in_key_order() {
		let store = create_test_store().await;
		let mut tx = store.update().await.unwrap();
		for key in [&b"c"[..], b"a", b"b\x00", b"b"] {
			tx.credentials().set(&cred(key, "")).await.unwrap();
		}
		let keys: Vec<Vec<u8>> = tx
			.credentials()
			.get_all()
			.await
			.unwrap()
			.into_iter()
			.map(|c| c.key)
			.collect();
		assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"b\x00".to_vec(), b"c".to_vec()]);
	}

	#[tokio::test]
	async fn replace_all_drops_previous_entries() {
		let store = create_test_store().await;
		let mut tx = store.update().await.unwrap();
		tx.credentials().set(&cred(b"old", "")).await.unwrap();
		tx.credentials()
			.replace_all(&[cred(b"new1", "x"), cred(b"new2", "y")])
			.await
			.unwrap();
		assert!(!tx.credentials().exists(b"old").await.unwrap());
		assert_eq!(tx.credentials().get_all().await.unwrap().len(), 2);
	}

	#[tokio::test]
	async fn remove_missing_key_is_ok() {
		let store = create_test_store().await;
		let mut tx = store.update().await.unwrap();
		tx.credentials().remove(b"absent").await.unwrap();
	}
}
