// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Transactions over the record store.
//!
//! All writers serialise on one async write section. Update transactions
//! hold it exclusively, View transactions share it, and Batch calls are
//! coalesced into a single transaction that holds it once for the group.

use futures::future::BoxFuture;
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::Transaction;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::credential::CredentialRepo;
use crate::error::{DbError, Result};
use crate::peer::PeerRepo;
use crate::pool::{create_pool, prepare};
use crate::server::ServerRepo;

pub const MAX_BATCH_DELAY: Duration = Duration::from_millis(10);
pub const MAX_BATCH_SIZE: usize = 1000;

type BatchFn = Box<dyn for<'c> FnOnce(&'c mut StoreTx) -> BoxFuture<'c, Result<()>> + Send>;

struct BatchCall {
	run: BatchFn,
	done: oneshot::Sender<Result<()>>,
}

struct PendingBatch {
	id: u64,
	calls: Vec<BatchCall>,
}

#[derive(Default)]
struct BatchQueue {
	next_id: u64,
	pending: Option<PendingBatch>,
}

struct StoreInner {
	pool: SqlitePool,
	section: Arc<RwLock<()>>,
	batch: Mutex<BatchQueue>,
}

/// Handle to the record store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
	inner: Arc<StoreInner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
	Update,
	View,
}

enum Section {
	Write { _guard: OwnedRwLockWriteGuard<()> },
	Read { _guard: OwnedRwLockReadGuard<()> },
	/// Held by the batch runner on the transaction's behalf.
	Batch,
}

/// An open transaction. Dropping it without committing rolls it back.
pub struct StoreTx {
	// Declared before `section` so the rollback is queued before the
	// section is released.
	tx: Transaction<'static, Sqlite>,
	mode: TxMode,
	section: Section,
	pool: SqlitePool,
}

/// The write section of a committed Update, still held.
///
/// Dependent in-memory work runs while this is alive; [`reopen`] starts a
/// new transaction under the same section to undo the commit.
///
/// [`reopen`]: CommittedSection::reopen
pub struct CommittedSection {
	mode: TxMode,
	section: Section,
	pool: SqlitePool,
}

impl Store {
	/// Opens the store at `path`, creating the file and its collections.
	pub async fn open(path: &Path) -> Result<Self> {
		let pool = create_pool(path).await?;
		Self::from_pool(pool).await
	}

	pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
		prepare(&pool).await?;
		Ok(Self {
			inner: Arc::new(StoreInner {
				pool,
				section: Arc::new(RwLock::new(())),
				batch: Mutex::new(BatchQueue::default()),
			}),
		})
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.inner.pool
	}

	/// Begins a read-write transaction holding the write section exclusively.
	pub async fn update(&self) -> Result<StoreTx> {
		let guard = self.inner.section.clone().write_owned().await;
		let tx = self.inner.pool.begin().await?;
		Ok(StoreTx {
			tx,
			mode: TxMode::Update,
			section: Section::Write { _guard: guard },
			pool: self.inner.pool.clone(),
		})
	}

	/// Begins a read-only transaction. Views run concurrently with each other.
	pub async fn view(&self) -> Result<StoreTx> {
		let guard = self.inner.section.clone().read_owned().await;
		let tx = self.inner.pool.begin().await?;
		Ok(StoreTx {
			tx,
			mode: TxMode::View,
			section: Section::Read { _guard: guard },
			pool: self.inner.pool.clone(),
		})
	}

	/// Runs `f` in a transaction shared with other batch calls made within
	/// [`MAX_BATCH_DELAY`].
	///
	/// Each call runs inside its own savepoint, so an error rolls back only
	/// that call's writes and is returned to its caller. If the shared commit
	/// fails, every caller in the group gets an error.
	pub async fn batch<F>(&self, f: F) -> Result<()>
	where
		F: for<'c> FnOnce(&'c mut StoreTx) -> BoxFuture<'c, Result<()>> + Send + 'static,
	{
		let (done, rx) = oneshot::channel();
		let call = BatchCall {
			run: Box::new(f),
			done,
		};

		{
			let mut queue = self.inner.batch.lock().await;
			match queue.pending.as_mut() {
				Some(pending) => pending.calls.push(call),
				None => {
					let id = queue.next_id;
					queue.next_id = queue.next_id.wrapping_add(1);
					queue.pending = Some(PendingBatch {
						id,
						calls: vec![call],
					});

					let inner = self.inner.clone();
					tokio::spawn(async move {
						tokio::time::sleep(MAX_BATCH_DELAY).await;
						let calls = {
							let mut queue = inner.batch.lock().await;
							match queue.pending.take() {
								Some(pending) if pending.id == id => pending.calls,
								other => {
									queue.pending = other;
									return;
								}
							}
						};
						run_batch(inner, calls).await;
					});
				}
			}

			let full = queue
				.pending
				.as_ref()
				.is_some_and(|p| p.calls.len() >= MAX_BATCH_SIZE);
			if full {
				if let Some(pending) = queue.pending.take() {
					tokio::spawn(run_batch(self.inner.clone(), pending.calls));
				}
			}
		}

		rx.await
			.map_err(|_| DbError::Internal("batch dropped before completion".to_string()))?
	}
}

#[tracing::instrument(skip_all, fields(calls = calls.len()))]
async fn run_batch(inner: Arc<StoreInner>, calls: Vec<BatchCall>) {
	let _guard = inner.section.clone().write_owned().await;

	let tx = match inner.pool.begin().await {
		Ok(tx) => tx,
		Err(e) => {
			tracing::error!(error = %e, "failed to begin batch transaction");
			for call in calls {
				let _ = call
					.done
					.send(Err(DbError::Internal(format!("batch begin failed: {e}"))));
			}
			return;
		}
	};

	let mut stx = StoreTx {
		tx,
		mode: TxMode::Update,
		section: Section::Batch,
		pool: inner.pool.clone(),
	};

	let mut outcomes = Vec::with_capacity(calls.len());
	for (idx, call) in calls.into_iter().enumerate() {
		let savepoint = format!("batch_call_{idx}");
		let result = run_savepoint(&mut stx, &savepoint, call.run).await;
		outcomes.push((call.done, result));
	}

	match stx.tx.commit().await {
		Ok(()) => {
			for (done, result) in outcomes {
				let _ = done.send(result);
			}
		}
		Err(e) => {
			tracing::error!(error = %e, "batch commit failed");
			for (done, _) in outcomes {
				let _ = done.send(Err(DbError::Internal(format!("batch commit failed: {e}"))));
			}
		}
	}
}

async fn run_savepoint(stx: &mut StoreTx, savepoint: &str, run: BatchFn) -> Result<()> {
	sqlx::query(&format!("SAVEPOINT {savepoint}"))
		.execute(&mut *stx.tx)
		.await?;

	match run(stx).await {
		Ok(()) => {
			sqlx::query(&format!("RELEASE {savepoint}"))
				.execute(&mut *stx.tx)
				.await?;
			Ok(())
		}
		Err(e) => {
			tracing::debug!(error = %e, "batch call failed, rolling back its savepoint");
			sqlx::query(&format!("ROLLBACK TO {savepoint}"))
				.execute(&mut *stx.tx)
				.await?;
			sqlx::query(&format!("RELEASE {savepoint}"))
				.execute(&mut *stx.tx)
				.await?;
			Err(e)
		}
	}
}

impl StoreTx {
	pub fn mode(&self) -> TxMode {
		self.mode
	}

	pub fn is_writable(&self) -> bool {
		self.mode == TxMode::Update
	}

	pub fn credentials(&mut self) -> CredentialRepo<'_> {
		let writable = self.is_writable();
		CredentialRepo::new(&mut self.tx, writable)
	}

	pub fn peers(&mut self) -> PeerRepo<'_> {
		let writable = self.is_writable();
		PeerRepo::new(&mut self.tx, writable)
	}

	pub fn server(&mut self) -> ServerRepo<'_> {
		let writable = self.is_writable();
		ServerRepo::new(&mut self.tx, writable)
	}

	/// Commits and hands back the section, still held.
	pub async fn commit(self) -> Result<CommittedSection> {
		let StoreTx {
			tx,
			mode,
			section,
			pool,
		} = self;
		tx.commit().await?;
		Ok(CommittedSection {
			mode,
			section,
			pool,
		})
	}

	pub async fn rollback(self) -> Result<()> {
		self.tx.rollback().await?;
		Ok(())
	}
}

impl CommittedSection {
	/// Starts a new transaction under the section this commit kept.
	pub async fn reopen(self) -> Result<StoreTx> {
		let tx = self.pool.begin().await?;
		Ok(StoreTx {
			tx,
			mode: self.mode,
			section: self.section,
			pool: self.pool,
		})
	}

	/// Releases the section.
	pub fn release(self) {}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::records::Credential;
	use crate::testing::create_test_store;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn cred(key: &[u8], comment: &str) -> Credential {
		Credential {
			key: key.to_vec(),
			comment: comment.to_string(),
		}
	}

	#[tokio::test]
	async fn update_commit_is_visible_to_view() {
		let store = create_test_store().await;

		let mut tx = store.update().await.unwrap();
		tx.credentials().add(&cred(b"k1", "one")).await.unwrap();
		tx.commit().await.unwrap().release();

		let mut view = store.view().await.unwrap();
		assert!(view.credentials().exists(b"k1").await.unwrap());
	}

	#[tokio::test]
	async fn dropped_update_rolls_back() {
		let store = create_test_store().await;

		{
			let mut tx = store.update().await.unwrap();
			tx.credentials().add(&cred(b"k1", "one")).await.unwrap();
		}

		let mut view = store.view().await.unwrap();
		assert!(!view.credentials().exists(b"k1").await.unwrap());
	}

	#[tokio::test]
	async fn view_rejects_writes() {
		let store = create_test_store().await;
		let mut view = store.view().await.unwrap();
		assert!(matches!(
			view.credentials().set(&cred(b"k1", "one")).await,
			Err(DbError::ReadOnly)
		));
		assert!(matches!(
			view.peers().remove("alice").await,
			Err(DbError::ReadOnly)
		));
	}

	/// The committed section must keep other writers out until released, so
	/// an undo after commit cannot interleave with another Update.
	#[tokio::test]
	async fn committed_section_blocks_writers_until_released() {
		let store = create_test_store().await;

		let mut tx = store.update().await.unwrap();
		tx.credentials().add(&cred(b"k1", "one")).await.unwrap();
		let section = tx.commit().await.unwrap();

		let pending = tokio::time::timeout(Duration::from_millis(50), store.update()).await;
		assert!(pending.is_err(), "update acquired while section held");

		let mut undo = section.reopen().await.unwrap();
		undo.credentials().remove(b"k1").await.unwrap();
		undo.commit().await.unwrap().release();

		let mut view = store.view().await.unwrap();
		assert!(!view.credentials().exists(b"k1").await.unwrap());
	}

	#[tokio::test]
	async fn open_view_keeps_writers_out() {
		let store = create_test_store().await;

		let view = store.view().await.unwrap();
		let pending = tokio::time::timeout(Duration::from_millis(50), store.update()).await;
		assert!(pending.is_err(), "update acquired while view open");

		drop(view);
		let tx = tokio::time::timeout(Duration::from_secs(5), store.update())
			.await
			.expect("update after view closed")
			.unwrap();
		tx.rollback().await.unwrap();
	}

	#[tokio::test]
	async fn batch_commits_each_call() {
		let store = create_test_store().await;

		let mut handles = Vec::new();
		for i in 0..10u8 {
			let store = store.clone();
			handles.push(tokio::spawn(async move {
				store
					.batch(move |tx| {
						Box::pin(async move { tx.credentials().set(&cred(&[i], "batched")).await })
					})
					.await
			}));
		}
		for handle in handles {
			handle.await.unwrap().unwrap();
		}

		let mut view = store.view().await.unwrap();
		assert_eq!(view.credentials().get_all().await.unwrap().len(), 10);
	}

	/// A failing call must not take the rest of its batch down with it.
	#[tokio::test]
	async fn batch_isolates_failing_call() {
		let store = create_test_store().await;

		let ok_store = store.clone();
		let ok = tokio::spawn(async move {
			ok_store
				.batch(|tx| Box::pin(async move { tx.credentials().set(&cred(b"good", "")).await }))
				.await
		});
		let bad_store = store.clone();
		let bad = tokio::spawn(async move {
			bad_store
				.batch(|tx| {
					Box::pin(async move {
						tx.credentials().set(&cred(b"partial", "")).await?;
						Err(DbError::Internal("boom".to_string()))
					})
				})
				.await
		});

		ok.await.unwrap().unwrap();
		assert!(matches!(bad.await.unwrap(), Err(DbError::Internal(_))));

		let mut view = store.view().await.unwrap();
		assert!(view.credentials().exists(b"good").await.unwrap());
		assert!(!view.credentials().exists(b"partial").await.unwrap());
	}

	#[tokio::test]
	async fn batch_coalesces_concurrent_calls() {
		let store = create_test_store().await;
		let runs = Arc::new(AtomicUsize::new(0));

		let mut handles = Vec::new();
		for i in 0..5u8 {
			let store = store.clone();
			let runs = runs.clone();
			handles.push(tokio::spawn(async move {
				store
					.batch(move |tx| {
						Box::pin(async move {
							runs.fetch_add(1, Ordering::SeqCst);
							tx.credentials().set(&cred(&[b'c', i], "")).await
						})
					})
					.await
			}));
		}
		for handle in handles {
			handle.await.unwrap().unwrap();
		}
		assert_eq!(runs.load(Ordering::SeqCst), 5);
	}

	#[tokio::test]
	async fn file_backed_store_persists_across_reopen() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested").join("wish.db");

		{
			let store = Store::open(&path).await.unwrap();
			let mut tx = store.update().await.unwrap();
			tx.credentials().add(&cred(b"persist", "me")).await.unwrap();
			tx.commit().await.unwrap().release();
			store.pool().close().await;
		}

		let store = Store::open(&path).await.unwrap();
		let mut view = store.view().await.unwrap();
		let all = view.credentials().get_all().await.unwrap();
		assert_eq!(all, vec![cred(b"persist", "me")]);
	}
}
