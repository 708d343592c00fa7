// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::SqliteConnection;

use crate::error::{DbError, Result};

/// The three collections, each a `(key, value)` table ordered by key bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
	PublicKey,
	WgClient,
	WgServer,
}

impl Bucket {
	pub const ALL: [Bucket; 3] = [Bucket::PublicKey, Bucket::WgClient, Bucket::WgServer];

	pub fn name(self) -> &'static str {
		match self {
			Bucket::PublicKey => "publickey",
			Bucket::WgClient => "wgclient",
			Bucket::WgServer => "wgserver",
		}
	}
}

pub(crate) type Row = (Vec<u8>, Vec<u8>);

/// Raw key/value access to one bucket inside an open transaction.
pub(crate) struct Kv<'a> {
	conn: &'a mut SqliteConnection,
	bucket: Bucket,
	writable: bool,
}

impl<'a> Kv<'a> {
	pub(crate) fn new(conn: &'a mut SqliteConnection, bucket: Bucket, writable: bool) -> Self {
		Self {
			conn,
			bucket,
			writable,
		}
	}

	fn ensure_writable(&self) -> Result<()> {
		if self.writable {
			Ok(())
		} else {
			Err(DbError::ReadOnly)
		}
	}

	pub(crate) async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		let sql = format!("SELECT value FROM {} WHERE key = ?", self.bucket.name());
		let value: Option<Vec<u8>> = sqlx::query_scalar(&sql)
			.bind(key)
			.fetch_optional(&mut *self.conn)
			.await?;
		Ok(value)
	}

	pub(crate) async fn exists(&mut self, key: &[u8]) -> Result<bool> {
		let sql = format!("SELECT 1 FROM {} WHERE key = ?", self.bucket.name());
		let found: Option<i64> = sqlx::query_scalar(&sql)
			.bind(key)
			.fetch_optional(&mut *self.conn)
			.await?;
		Ok(found.is_some())
	}

	/// Inserts unless the key is present. Returns whether a row was written.
	pub(crate) async fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<bool> {
		self.ensure_writable()?;
		let sql = format!(
			"INSERT OR IGNORE INTO {} (key, value) VALUES (?, ?)",
			self.bucket.name()
		);
		let result = sqlx::query(&sql)
			.bind(key)
			.bind(value)
			.execute(&mut *self.conn)
			.await?;
		Ok(result.rows_affected() == 1)
	}

	pub(crate) async fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
		self.ensure_writable()?;
		let sql = format!(
			"INSERT INTO {} (key, value) VALUES (?, ?)
			 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
			self.bucket.name()
		);
		sqlx::query(&sql)
			.bind(key)
			.bind(value)
			.execute(&mut *self.conn)
			.await?;
		Ok(())
	}

	/// Returns whether a row was removed.
	pub(crate) async fn delete(&mut self, key: &[u8]) -> Result<bool> {
		self.ensure_writable()?;
		let sql = format!("DELETE FROM {} WHERE key = ?", self.bucket.name());
		let result = sqlx::query(&sql)
			.bind(key)
			.execute(&mut *self.conn)
			.await?;
		Ok(result.rows_affected() > 0)
	}

	pub(crate) async fn all(&mut self) -> Result<Vec<Row>> {
		let sql = format!("SELECT key, value FROM {} ORDER BY key", self.bucket.name());
		let rows: Vec<Row> = sqlx::query_as(&sql).fetch_all(&mut *self.conn).await?;
		Ok(rows)
	}

	pub(crate) async fn clear(&mut self) -> Result<()> {
		self.ensure_writable()?;
		let sql = format!("DELETE FROM {}", self.bucket.name());
		sqlx::query(&sql).execute(&mut *self.conn).await?;
		Ok(())
	}
}
