// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scriptable [`WgTools`] for tests that must not touch a real interface.

use async_trait::async_trait;
use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, WgError};
use crate::tools::WgTools;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolOp {
	BringUp,
	BringDown,
	Strip,
	Synchronize,
	StatusDump,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
	BringUp(PathBuf),
	BringDown(PathBuf),
	Strip(PathBuf),
	Synchronize(String, PathBuf),
	StatusDump(String),
}

/// What `synchronize` saw on disk when it was called.
#[derive(Debug, Clone)]
pub struct SyncedFile {
	pub path: PathBuf,
	pub contents: String,
	pub mode: u32,
}

#[derive(Default)]
struct State {
	calls: Vec<ToolCall>,
	failing: HashSet<ToolOp>,
	stripped: String,
	dump: String,
	synced: Option<SyncedFile>,
}

#[derive(Default)]
pub struct MockTools {
	state: Mutex<State>,
}

impl MockTools {
	fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		f(&mut state)
	}

	pub fn fail_on(&self, op: ToolOp) {
		self.with_state(|s| s.failing.insert(op));
	}

	pub fn succeed_on(&self, op: ToolOp) {
		self.with_state(|s| s.failing.remove(&op));
	}

	pub fn set_stripped(&self, text: impl Into<String>) {
		let text = text.into();
		self.with_state(|s| s.stripped = text);
	}

	pub fn set_dump(&self, text: impl Into<String>) {
		let text = text.into();
		self.with_state(|s| s.dump = text);
	}

	pub fn calls(&self) -> Vec<ToolCall> {
		self.with_state(|s| s.calls.clone())
	}

	pub fn last_synced(&self) -> Option<SyncedFile> {
		self.with_state(|s| s.synced.clone())
	}

	fn record(&self, op: ToolOp, call: ToolCall) -> Result<()> {
		let command = format!("{call:?}");
		self.with_state(|s| {
			s.calls.push(call);
			if s.failing.contains(&op) {
				Err(WgError::ToolFailure {
					command,
					stderr: "injected failure".to_string(),
				})
			} else {
				Ok(())
			}
		})
	}
}

#[async_trait]
impl WgTools for MockTools {
	async fn bring_up(&self, config_path: &Path) -> Result<()> {
		self.record(ToolOp::BringUp, ToolCall::BringUp(config_path.to_path_buf()))
	}

	async fn bring_down(&self, config_path: &Path) -> Result<()> {
		self.record(ToolOp::BringDown, ToolCall::BringDown(config_path.to_path_buf()))
	}

	async fn strip(&self, config_path: &Path) -> Result<String> {
		self.record(ToolOp::Strip, ToolCall::Strip(config_path.to_path_buf()))?;
		Ok(self.with_state(|s| s.stripped.clone()))
	}

	async fn synchronize(&self, interface: &str, stripped_path: &Path) -> Result<()> {
		let contents = tokio::fs::read_to_string(stripped_path).await?;
		let mode = tokio::fs::metadata(stripped_path).await?.permissions().mode();
		self.with_state(|s| {
			s.synced = Some(SyncedFile {
				path: stripped_path.to_path_buf(),
				contents,
				mode,
			})
		});
		self.record(
			ToolOp::Synchronize,
			ToolCall::Synchronize(interface.to_string(), stripped_path.to_path_buf()),
		)
	}

	async fn status_dump(&self, interface: &str) -> Result<String> {
		self.record(ToolOp::StatusDump, ToolCall::StatusDump(interface.to_string()))?;
		Ok(self.with_state(|s| s.dump.clone()))
	}
}
