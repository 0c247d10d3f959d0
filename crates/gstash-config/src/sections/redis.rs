// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Queue store connection section.

use gstash_analytics::ANALYTICS_KEY_NAME;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RedisConfigLayer {
	pub host: Option<String>,
	pub port: Option<u16>,
	pub username: Option<String>,
	pub password: Option<String>,
	pub database: Option<i64>,
	pub analytics_key: Option<String>,
}

impl RedisConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.username.is_some() {
			self.username = other.username;
		}
		if other.password.is_some() {
			self.password = other.password;
		}
		if other.database.is_some() {
			self.database = other.database;
		}
		if other.analytics_key.is_some() {
			self.analytics_key = other.analytics_key;
		}
	}

	pub fn finalize(self) -> RedisConfig {
		RedisConfig {
			host: self.host.unwrap_or_else(|| "127.0.0.1".to_string()),
			port: self.port.unwrap_or(6379),
			username: self.username,
			password: self.password,
			database: self.database.unwrap_or(0),
			analytics_key: self
				.analytics_key
				.unwrap_or_else(|| ANALYTICS_KEY_NAME.to_string()),
		}
	}
}

#[derive(Clone, PartialEq)]
pub struct RedisConfig {
	pub host: String,
	pub port: u16,
	pub username: Option<String>,
	pub password: Option<String>,
	pub database: i64,
	pub analytics_key: String,
}

impl Default for RedisConfig {
	fn default() -> Self {
		RedisConfigLayer::default().finalize()
	}
}

impl std::fmt::Debug for RedisConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RedisConfig")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("username", &self.username)
			.field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
			.field("database", &self.database)
			.field("analytics_key", &self.analytics_key)
			.finish()
	}
}
