// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Administrator credentials.

use tracing::{info, instrument};
use wish_common_wgtypes::AuthorizedKey;
use wish_server_db::{Credential, DbError, Store};

use crate::error::{Result, ServiceError};

#[derive(Clone)]
pub struct PublicKeyService {
	store: Store,
}

fn to_credential(key: &AuthorizedKey) -> Credential {
	Credential {
		key: key.blob().to_vec(),
		comment: key.comment().to_string(),
	}
}

impl PublicKeyService {
	pub fn new(store: Store) -> Self {
		Self { store }
	}

	#[instrument(skip(self, key), fields(algorithm = key.algorithm(), comment = key.comment()))]
	pub async fn add_public_key(&self, key: &AuthorizedKey) -> Result<()> {
		let mut tx = self.store.update().await?;
		match tx.credentials().add(&to_credential(key)).await {
			Ok(()) => {}
			Err(DbError::AlreadyExists(_)) => return Err(ServiceError::public_key_exists()),
			Err(e) => return Err(e.into()),
		}
		tx.commit().await?.release();
		Ok(())
	}

	/// Whether the wire-format `blob` belongs to an administrator.
	pub async fn public_key_exists(&self, blob: &[u8]) -> Result<bool> {
		let mut view = self.store.view().await?;
		Ok(view.credentials().exists(blob).await?)
	}

	#[instrument(skip_all)]
	pub async fn remove_public_key(&self, blob: &[u8]) -> Result<()> {
		let mut tx = self.store.update().await?;
		if !tx.credentials().exists(blob).await? {
			return Err(ServiceError::public_key_not_found());
		}
		tx.credentials().remove(blob).await?;
		tx.commit().await?.release();
		Ok(())
	}

	pub async fn get_public_keys(&self) -> Result<Vec<AuthorizedKey>> {
		let credentials = {
			let mut view = self.store.view().await?;
			view.credentials().get_all().await?
		};
		credentials
			.into_iter()
			.map(|c| {
				AuthorizedKey::from_blob(c.key, c.comment)
					.map_err(|e| ServiceError::Internal(format!("stored public key: {e}")))
			})
			.collect()
	}

	/// Installs the administrator keys from configuration.
	///
	/// With `replace` set, keys not in `keys` are dropped; otherwise existing
	/// keys are kept and the given ones upserted.
	#[instrument(skip(self, keys), fields(count = keys.len()))]
	pub async fn sync_admin_keys(&self, keys: &[AuthorizedKey], replace: bool) -> Result<()> {
		let credentials: Vec<Credential> = keys.iter().map(to_credential).collect();
		self.store
			.batch(move |tx| {
				Box::pin(async move {
					if replace {
						tx.credentials().replace_all(&credentials).await
					} else {
						for credential in &credentials {
							tx.credentials().set(credential).await?;
						}
						Ok(())
					}
				})
			})
			.await?;
		info!(replace, "admin keys synced");
		Ok(())
	}
}
