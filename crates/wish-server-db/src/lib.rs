// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Embedded record store for administrator credentials, peer identities and
//! the server's own key.

pub mod credential;
pub mod error;
mod kv;
pub mod meta;
pub mod peer;
pub mod pool;
pub mod records;
pub mod server;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use credential::CredentialRepo;
pub use error::{DbError, Result};
pub use kv::Bucket;
pub use meta::Meta;
pub use peer::PeerRepo;
pub use pool::{create_pool, prepare};
pub use records::{Credential, PeerIdentity, ServerIdentity, SERVER_KEY};
pub use server::ServerRepo;
pub use store::{CommittedSection, Store, StoreTx, TxMode, MAX_BATCH_DELAY, MAX_BATCH_SIZE};
