// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! wg-wish server binary.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wish_server_config::{LogFormat, LoggingConfig};
use wish_server_wg::WgQuickTools;

/// wg-wish server - WireGuard peer management.
#[derive(Parser, Debug)]
#[command(name = "wish-server", about = "WireGuard peer management server", version)]
struct Args {
	/// Config file; defaults to /etc/wg-wish/server.toml when present.
	#[arg(short, long, env = "WGWISH_CONFIG")]
	config: Option<PathBuf>,
}

fn init_tracing(logging: &LoggingConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| logging.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);
	match logging.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
	use tokio::signal::unix::{signal, SignalKind};

	let mut terminate =
		signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
	tokio::select! {
		res = tokio::signal::ctrl_c() => res.context("failed to listen for ctrl-c")?,
		_ = terminate.recv() => {}
	}
	Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
	tokio::signal::ctrl_c()
		.await
		.context("failed to listen for ctrl-c")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let config =
		wish_server_config::load_config(args.config).context("failed to load configuration")?;
	init_tracing(&config.logging);

	let tools = Arc::new(WgQuickTools::new(config.wireguard.tool_timeout));
	let services = wish_server::bootstrap(&config, tools).await?;

	services
		.wireguard
		.start_server()
		.await
		.context("failed to start wireguard interface")?;
	tracing::info!(
		interface = %config.wireguard.interface,
		port = config.wireguard.port,
		"wg-wish server running"
	);
	tracing::debug!(
		ssh_port = config.ssh.port,
		host_key = %config.ssh.host_key_path.display(),
		"ssh listener settings left to the access layer"
	);

	let waited = shutdown_signal().await;
	tracing::info!("received shutdown signal");

	if let Err(e) = services.wireguard.stop_server().await {
		tracing::error!(error = %e, "failed to stop wireguard interface");
	}

	waited
}
