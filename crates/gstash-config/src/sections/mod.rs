// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod lock;
mod logging;
mod redis;
mod sink;

pub use lock::{LockConfig, LockConfigLayer, DEFAULT_LOCK_EXPIRY_SECS, DEFAULT_LOCK_NAME};
pub use logging::{LogConfig, LogConfigLayer, LogFormat};
pub use redis::{RedisConfig, RedisConfigLayer};
pub use sink::{default_sinks, SinkConfig, DEFAULT_CSV_DIR};
