// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML files, environment and command line.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::GstashConfigLayer;
use crate::sections::{LockConfigLayer, LogConfigLayer, LogFormat, RedisConfigLayer};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/gstash/gstash.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
	CommandLine = 100,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<GstashConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<GstashConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(GstashConfigLayer::default())
	}
}

/// TOML file source. A missing file is not an error.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<GstashConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(GstashConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: GstashConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: GSTASH_<SECTION>_<FIELD>. Sink tables are TOML only.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<GstashConfigLayer, ConfigError> {
		debug!("loading environment variables");
		layer_from_env(|name| std::env::var(name).ok())
	}
}

/// A pre-built layer, used for command line flags.
pub struct OverrideSource(pub GstashConfigLayer);

impl ConfigSource for OverrideSource {
	fn name(&self) -> &'static str {
		"command-line"
	}

	fn precedence(&self) -> Precedence {
		Precedence::CommandLine
	}

	fn load(&self) -> Result<GstashConfigLayer, ConfigError> {
		Ok(self.0.clone())
	}
}

pub(crate) fn layer_from_env<F>(lookup: F) -> Result<GstashConfigLayer, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	let env = EnvReader { lookup };

	Ok(GstashConfigLayer {
		purge_delay: env.parse("GSTASH_PURGE_DELAY")?,
		omit_detailed_recording: env.bool("GSTASH_OMIT_DETAILED_RECORDING"),
		health_check_path: env.var("GSTASH_HEALTH_CHECK_PATH"),
		health_check_address: env.var("GSTASH_HEALTH_CHECK_ADDRESS"),
		redis: Some(RedisConfigLayer {
			host: env.var("GSTASH_REDIS_HOST"),
			port: env.parse("GSTASH_REDIS_PORT")?,
			username: env.var("GSTASH_REDIS_USERNAME"),
			password: env.var("GSTASH_REDIS_PASSWORD"),
			database: env.parse("GSTASH_REDIS_DATABASE")?,
			analytics_key: env.var("GSTASH_REDIS_ANALYTICS_KEY"),
		}),
		lock: Some(LockConfigLayer {
			name: env.var("GSTASH_LOCK_NAME"),
			expiry_secs: env.parse("GSTASH_LOCK_EXPIRY_SECS")?,
		}),
		log: Some(LogConfigLayer {
			level: env.var("GSTASH_LOG_LEVEL"),
			format: env.parse::<LogFormat>("GSTASH_LOG_FORMAT")?,
		}),
		gstashs: None,
	})
}

struct EnvReader<F> {
	lookup: F,
}

impl<F> EnvReader<F>
where
	F: Fn(&str) -> Option<String>,
{
	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self.var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parse<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
	where
		T: FromStr,
		T::Err: std::fmt::Display,
	{
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|e| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid value '{v}': {e}"),
			}),
			None => Ok(None),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn test_env_layer() {
		let layer = layer_from_env(env(&[
			("GSTASH_PURGE_DELAY", "30"),
			("GSTASH_OMIT_DETAILED_RECORDING", "true"),
			("GSTASH_REDIS_PORT", "6380"),
			("GSTASH_LOG_FORMAT", "json"),
			("GSTASH_LOCK_NAME", ""),
		]))
		.unwrap();

		assert_eq!(layer.purge_delay, Some(30));
		assert_eq!(layer.omit_detailed_recording, Some(true));
		assert_eq!(layer.redis.unwrap().port, Some(6380));
		assert_eq!(layer.log.unwrap().format, Some(LogFormat::Json));
		assert_eq!(layer.lock.unwrap().name, None);
		assert!(layer.gstashs.is_none());
	}

	#[test]
	fn test_env_invalid_number() {
		let err = layer_from_env(env(&[("GSTASH_PURGE_DELAY", "soon")])).unwrap_err();
		match err {
			ConfigError::InvalidValue { key, .. } => assert_eq!(key, "GSTASH_PURGE_DELAY"),
			other => panic!("unexpected error: {other}"),
		}
	}

	#[test]
	fn test_missing_toml_is_empty_layer() {
		let dir = tempfile::tempdir().unwrap();
		let layer = TomlSource::new(dir.path().join("absent.toml")).load().unwrap();
		assert_eq!(layer, GstashConfigLayer::default());
	}

	#[test]
	fn test_invalid_toml_is_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("gstash.toml");
		std::fs::write(&path, "purge-delay = [").unwrap();

		assert!(matches!(
			TomlSource::new(&path).load(),
			Err(ConfigError::TomlParse { .. })
		));
	}

	#[test]
	fn test_precedence_order() {
		assert!(Precedence::Defaults < Precedence::ConfigFile);
		assert!(Precedence::ConfigFile < Precedence::Environment);
		assert!(Precedence::Environment < Precedence::CommandLine);
	}
}
