// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![cfg(feature = "redis")]

//! Redis backed queue store and lease lock.

use std::time::Duration;

use async_trait::async_trait;
use gstash_config::RedisConfig;
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, Script};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{LockError, StorageError};
use crate::lock::DistributedLock;
use crate::store::AnalyticsStore;

/// Deletes the key only while it still carries our token.
const UNLOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
	return redis.call("DEL", KEYS[1])
else
	return 0
end
"#;

fn connection_info(config: &RedisConfig) -> ConnectionInfo {
	ConnectionInfo {
		addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
		redis: RedisConnectionInfo {
			db: config.database,
			username: config.username.clone(),
			password: config.password.clone(),
			..Default::default()
		},
	}
}

/// Opens a reconnecting connection shared by the store and the lock.
pub async fn connect(config: &RedisConfig) -> Result<ConnectionManager, StorageError> {
	let client = Client::open(connection_info(config))?;
	let manager = ConnectionManager::new(client).await?;
	info!(host = %config.host, port = config.port, db = config.database, "connected to redis");
	Ok(manager)
}

#[derive(Clone)]
pub struct RedisAnalyticsStore {
	conn: ConnectionManager,
}

impl RedisAnalyticsStore {
	pub fn new(conn: ConnectionManager) -> Self {
		Self { conn }
	}
}

#[async_trait]
impl AnalyticsStore for RedisAnalyticsStore {
	fn name(&self) -> &str {
		"redis"
	}

	async fn get_and_delete_set(&self, key: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		let mut conn = self.conn.clone();
		let (entries,): (Vec<Vec<u8>>,) = redis::pipe()
			.atomic()
			.lrange(key, 0, -1)
			.del(key)
			.ignore()
			.query_async(&mut conn)
			.await?;

		debug!(key, entries = entries.len(), "drained analytics list");
		Ok(entries)
	}
}

pub struct RedisMutex {
	conn: ConnectionManager,
	name: String,
	expiry: Duration,
	token: Mutex<Option<String>>,
}

impl RedisMutex {
	pub fn new(conn: ConnectionManager, name: impl Into<String>, expiry: Duration) -> Self {
		Self {
			conn,
			name: name.into(),
			expiry,
			token: Mutex::new(None),
		}
	}

	fn new_token() -> String {
		format!("{:016x}{:016x}", fastrand::u64(..), fastrand::u64(..))
	}
}

#[async_trait]
impl DistributedLock for RedisMutex {
	fn name(&self) -> &str {
		&self.name
	}

	async fn lock(&self) -> Result<(), LockError> {
		let mut conn = self.conn.clone();
		let token = Self::new_token();
		let expiry_ms = u64::try_from(self.expiry.as_millis()).unwrap_or(u64::MAX);

		let reply: Option<String> = redis::cmd("SET")
			.arg(&self.name)
			.arg(&token)
			.arg("NX")
			.arg("PX")
			.arg(expiry_ms)
			.query_async(&mut conn)
			.await?;

		if reply.is_none() {
			return Err(LockError::AlreadyHeld(self.name.clone()));
		}

		*self.token.lock().await = Some(token);
		Ok(())
	}

	async fn unlock(&self) -> Result<bool, LockError> {
		let Some(token) = self.token.lock().await.take() else {
			return Ok(false);
		};

		let mut conn = self.conn.clone();
		let deleted: i64 = Script::new(UNLOCK_SCRIPT)
			.key(&self.name)
			.arg(token)
			.invoke_async(&mut conn)
			.await?;

		Ok(deleted == 1)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_connection_info_from_config() {
		let config = RedisConfig {
			host: "redis.internal".to_string(),
			port: 6380,
			username: Some("gstash".to_string()),
			password: Some("secret".to_string()),
			database: 2,
			analytics_key: "iam-system-analytics".to_string(),
		};

		let info = connection_info(&config);
		assert!(matches!(
			info.addr,
			ConnectionAddr::Tcp(ref host, 6380) if host == "redis.internal"
		));
		assert_eq!(info.redis.db, 2);
		assert_eq!(info.redis.username.as_deref(), Some("gstash"));
		assert_eq!(info.redis.password.as_deref(), Some("secret"));
	}

	#[test]
	fn test_tokens_are_unique() {
		assert_ne!(RedisMutex::new_token(), RedisMutex::new_token());
		assert_eq!(RedisMutex::new_token().len(), 32);
	}
}
