// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
	#[cfg(feature = "redis")]
	#[error("redis error: {0}")]
	Redis(#[from] redis::RedisError),
}

#[derive(Debug, Error)]
pub enum LockError {
	/// Another holder owns an unexpired lease.
	#[error("lock {0} is already held")]
	AlreadyHeld(String),

	#[error("lock backend error: {0}")]
	Backend(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for LockError {
	fn from(e: redis::RedisError) -> Self {
		LockError::Backend(e.to_string())
	}
}
