// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The OS tools that act on the live interface.

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{trace, warn};

use crate::error::{Result, WgError};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations on the live interface. Implementations must be cancel-safe:
/// dropping a returned future must not leave a child process behind.
#[async_trait]
pub trait WgTools: Send + Sync {
	async fn bring_up(&self, config_path: &Path) -> Result<()>;

	async fn bring_down(&self, config_path: &Path) -> Result<()>;

	/// Returns the config with `wg-quick`-only keys removed.
	async fn strip(&self, config_path: &Path) -> Result<String>;

	async fn synchronize(&self, interface: &str, stripped_path: &Path) -> Result<()>;

	/// Raw output of `wg show <interface> dump`.
	async fn status_dump(&self, interface: &str) -> Result<String>;
}

/// [`WgTools`] backed by the `wg-quick` and `wg` binaries.
#[derive(Debug, Clone)]
pub struct WgQuickTools {
	wg_quick: PathBuf,
	wg: PathBuf,
	timeout: Duration,
}

impl Default for WgQuickTools {
	fn default() -> Self {
		Self::new(DEFAULT_TOOL_TIMEOUT)
	}
}

impl WgQuickTools {
	pub fn new(timeout: Duration) -> Self {
		Self {
			wg_quick: PathBuf::from("wg-quick"),
			wg: PathBuf::from("wg"),
			timeout,
		}
	}

	/// Overrides the binaries, e.g. to point at absolute paths.
	pub fn with_binaries(mut self, wg_quick: impl Into<PathBuf>, wg: impl Into<PathBuf>) -> Self {
		self.wg_quick = wg_quick.into();
		self.wg = wg.into();
		self
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}
}

#[async_trait]
impl WgTools for WgQuickTools {
	async fn bring_up(&self, config_path: &Path) -> Result<()> {
		run_tool(&self.wg_quick, &[OsStr::new("up"), config_path.as_os_str()], self.timeout).await?;
		Ok(())
	}

	async fn bring_down(&self, config_path: &Path) -> Result<()> {
		run_tool(&self.wg_quick, &[OsStr::new("down"), config_path.as_os_str()], self.timeout).await?;
		Ok(())
	}

	async fn strip(&self, config_path: &Path) -> Result<String> {
		run_tool(&self.wg_quick, &[OsStr::new("strip"), config_path.as_os_str()], self.timeout).await
	}

	async fn synchronize(&self, interface: &str, stripped_path: &Path) -> Result<()> {
		run_tool(
			&self.wg,
			&[OsStr::new("syncconf"), OsStr::new(interface), stripped_path.as_os_str()],
			self.timeout,
		)
		.await?;
		Ok(())
	}

	async fn status_dump(&self, interface: &str) -> Result<String> {
		run_tool(
			&self.wg,
			&[OsStr::new("show"), OsStr::new(interface), OsStr::new("dump")],
			self.timeout,
		)
		.await
	}
}

fn command_line(program: &Path, args: &[&OsStr]) -> String {
	let mut line = program.display().to_string();
	for arg in args {
		line.push(' ');
		line.push_str(&arg.to_string_lossy());
	}
	line
}

/// Runs `program` to completion and returns its stdout.
///
/// The child is killed if the timeout fires or the future is dropped.
pub(crate) async fn run_tool(program: &Path, args: &[&OsStr], timeout: Duration) -> Result<String> {
	let command = command_line(program, args);
	trace!(cmd = %command, "running tool");

	let mut cmd = Command::new(program);
	cmd.args(args)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true);

	let output = match tokio::time::timeout(timeout, cmd.output()).await {
		Ok(Ok(output)) => output,
		Ok(Err(e)) => {
			if e.kind() == std::io::ErrorKind::NotFound {
				warn!(program = %program.display(), "tool not found in PATH");
			}
			return Err(WgError::ToolFailure {
				command,
				stderr: e.to_string(),
			});
		}
		Err(_) => {
			warn!(cmd = %command, ?timeout, "tool timed out");
			return Err(WgError::ToolFailure {
				command,
				stderr: format!("timed out after {}s", timeout.as_secs_f64()),
			});
		}
	};

	if output.status.success() {
		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	} else {
		let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
		Err(WgError::ToolFailure { command, stderr })
	}
}
