// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! gstash: purges the IAM analytics queue into the configured gstashs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gstash_config::{GstashConfig, GstashConfigLayer, LogConfigLayer, LogFormat};
use gstash_server::{serve_health, PurgeOptions, PurgeScheduler, ShutdownSignal};
use gstash_sinks::SinkRegistry;
use gstash_storage::{redis_store, RedisAnalyticsStore, RedisMutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod version;

/// Analytics purger for the IAM authorization service.
#[derive(Parser, Debug)]
#[command(name = "gstash", about = "Purges the analytics queue into the configured gstashs", version)]
struct Args {
	/// Path to the TOML configuration file
	#[arg(long, env = "GSTASH_CONFIG")]
	config: Option<PathBuf>,

	/// Seconds between purge cycles
	#[arg(long)]
	purge_delay: Option<u64>,

	/// Blank policies and deciders before delivery
	#[arg(long)]
	omit_detailed_recording: bool,

	/// Log level or filter directive, e.g. `info` or `gstash_server=debug`
	#[arg(long)]
	log_level: Option<String>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
}

impl Args {
	fn overrides(&self) -> GstashConfigLayer {
		GstashConfigLayer {
			purge_delay: self.purge_delay,
			omit_detailed_recording: self.omit_detailed_recording.then_some(true),
			log: self.log_level.as_ref().map(|level| LogConfigLayer {
				level: Some(level.clone()),
				format: None,
			}),
			..Default::default()
		}
	}
}

fn init_tracing(config: &GstashConfig) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);

	match config.log.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	let config = gstash_config::load_config_with_overrides(args.config.clone(), args.overrides())
		.context("failed to load configuration")?;
	init_tracing(&config);

	tracing::info!(
		redis = %format!("{}:{}", config.redis.host, config.redis.port),
		purge_delay_secs = config.purge_delay,
		lock = %config.lock.name,
		"starting gstash"
	);

	let conn = redis_store::connect(&config.redis)
		.await
		.context("failed to connect to redis")?;
	let store = Arc::new(RedisAnalyticsStore::new(conn.clone()));
	let lock = Arc::new(RedisMutex::new(conn, config.lock.name.clone(), config.lock.expiry()));

	let mut scheduler = PurgeScheduler::new(store, lock, PurgeOptions::from_config(&config));
	let registry = SinkRegistry::builtin();
	let active = scheduler.initialize_sinks(&registry, &config.gstashs).await;
	if active == 0 {
		tracing::warn!("no gstash initialized, drained records will be dropped");
	}

	let listener = tokio::net::TcpListener::bind(&config.health_check_address)
		.await
		.with_context(|| format!("failed to bind health check on {}", config.health_check_address))?;

	let mut signal = ShutdownSignal::install().context("failed to install signal handlers")?;
	let shutdown = CancellationToken::new();
	let scheduler = Arc::new(scheduler);

	let purger = {
		let scheduler = Arc::clone(&scheduler);
		let shutdown = shutdown.clone();
		tokio::spawn(async move { scheduler.run(shutdown).await })
	};

	let health_route = config.health_route();
	tokio::select! {
		result = serve_health(listener, &health_route, shutdown.clone()) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "health check server error");
			}
		}
		received = signal.recv() => {
			tracing::info!(signal = received, "received shutdown signal");
		}
	}

	shutdown.cancel();
	if let Err(e) = purger.await {
		tracing::error!(error = %e, "purge scheduler task failed");
	}

	tracing::info!("gstash shutdown complete");
	Ok(())
}
