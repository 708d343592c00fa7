// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::SqlitePoolOptions;

use crate::store::Store;

/// An in-memory store on a single pinned connection, so every transaction
/// sees the same database.
pub async fn create_test_store() -> Store {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect("sqlite::memory:")
		.await
		.expect("in-memory sqlite pool");
	Store::from_pool(pool).await.expect("prepare test store")
}
