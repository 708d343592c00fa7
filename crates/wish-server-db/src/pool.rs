// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use std::path::Path;

use crate::error::DbError;

/// Opens (creating if needed) the database file with WAL journaling.
///
/// # Errors
/// Returns `DbError::Internal` if the parent directory cannot be created,
/// and `DbError::Sqlx` if the connection fails.
#[tracing::instrument(fields(path = %path.display()))]
pub async fn create_pool(path: &Path) -> Result<SqlitePool, DbError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		tokio::fs::create_dir_all(parent)
			.await
			.map_err(|e| DbError::Internal(format!("create {}: {e}", parent.display())))?;
	}

	let options = SqliteConnectOptions::new()
		.filename(path)
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Creates the three collections if they are missing.
#[tracing::instrument(skip(pool))]
pub async fn prepare(pool: &SqlitePool) -> Result<(), DbError> {
	for table in crate::Bucket::ALL {
		let ddl = format!(
			"CREATE TABLE IF NOT EXISTS {} (key BLOB PRIMARY KEY NOT NULL, value BLOB NOT NULL)",
			table.name()
		);
		sqlx::query(&ddl).execute(pool).await?;
	}
	Ok(())
}
