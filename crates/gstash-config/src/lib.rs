// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the gstash analytics purger.
//!
//! Layers are read from built-in defaults, a TOML file, `GSTASH_*`
//! environment variables and finally command line flags, each overriding the
//! previous one.
//!
//! ```toml
//! purge-delay = 10
//! omit-detailed-recording = false
//!
//! [redis]
//! host = "127.0.0.1"
//!
//! [gstashs.csv]
//! meta = { csv_dir = "./analytics-data" }
//!
//! [gstashs.internal-syslog]
//! type = "syslog"
//! timeout = 2
//! filters = { skip_usernames = ["svc-internal"] }
//! meta = { network_addr = "localhost:5140" }
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigError, Result};
pub use layer::GstashConfigLayer;
pub use sections::*;
pub use sources::{
	ConfigSource, DefaultsSource, EnvSource, OverrideSource, Precedence, TomlSource,
	SYSTEM_CONFIG_PATH,
};

use tracing::{debug, info};

pub const DEFAULT_PURGE_DELAY_SECS: u64 = 10;
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "healthz";
pub const DEFAULT_HEALTH_CHECK_ADDRESS: &str = "0.0.0.0:7070";

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct GstashConfig {
	pub purge_delay: u64,
	pub omit_detailed_recording: bool,
	pub health_check_path: String,
	pub health_check_address: String,
	pub redis: RedisConfig,
	pub lock: LockConfig,
	pub log: LogConfig,
	pub gstashs: BTreeMap<String, SinkConfig>,
}

impl GstashConfig {
	pub fn purge_interval(&self) -> Duration {
		Duration::from_secs(self.purge_delay)
	}

	/// Health route with exactly one leading slash.
	pub fn health_route(&self) -> String {
		format!("/{}", self.health_check_path.trim_start_matches('/'))
	}
}

impl Default for GstashConfig {
	fn default() -> Self {
		resolve(GstashConfigLayer::default())
	}
}

/// Load from defaults, `/etc/gstash/gstash.toml` and the environment.
pub fn load_config() -> Result<GstashConfig> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<GstashConfig> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Same as [`load_config_with_file`], with command line flags on top.
pub fn load_config_with_overrides(
	config_path: Option<PathBuf>,
	overrides: GstashConfigLayer,
) -> Result<GstashConfig> {
	let toml = match config_path {
		Some(path) => TomlSource::new(path),
		None => TomlSource::system(),
	};

	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(toml),
		Box::new(EnvSource),
		Box::new(OverrideSource(overrides)),
	])
}

pub fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<GstashConfig> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = GstashConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	let config = finalize(merged)?;

	info!(
		purge_delay = config.purge_delay,
		omit_detailed_recording = config.omit_detailed_recording,
		redis_host = %config.redis.host,
		redis_port = config.redis.port,
		lock = %config.lock.name,
		sinks = config.gstashs.len(),
		"gstash configuration loaded"
	);

	Ok(config)
}

fn finalize(layer: GstashConfigLayer) -> Result<GstashConfig> {
	let config = resolve(layer);
	validate_config(&config)?;
	Ok(config)
}

fn resolve(layer: GstashConfigLayer) -> GstashConfig {
	GstashConfig {
		purge_delay: layer.purge_delay.unwrap_or(DEFAULT_PURGE_DELAY_SECS),
		omit_detailed_recording: layer.omit_detailed_recording.unwrap_or(false),
		health_check_path: layer
			.health_check_path
			.unwrap_or_else(|| DEFAULT_HEALTH_CHECK_PATH.to_string()),
		health_check_address: layer
			.health_check_address
			.unwrap_or_else(|| DEFAULT_HEALTH_CHECK_ADDRESS.to_string()),
		redis: layer.redis.unwrap_or_default().finalize(),
		lock: layer.lock.unwrap_or_default().finalize(),
		log: layer.log.unwrap_or_default().finalize(),
		gstashs: layer.gstashs.unwrap_or_else(default_sinks),
	}
}

fn validate_config(config: &GstashConfig) -> Result<()> {
	if config.purge_delay == 0 {
		return Err(ConfigError::Validation(
			"purge-delay must be greater than zero".to_string(),
		));
	}

	if config.lock.expiry_secs == 0 {
		return Err(ConfigError::Validation(
			"lock.expiry-secs must be greater than zero".to_string(),
		));
	}

	Ok(())
}
