// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared-state collaborators of the purger: the queue the authorization
//! service pushes records onto, and the lease lock that keeps purge cycles
//! exclusive across instances.

pub mod error;
pub mod lock;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod store;

pub use error::{LockError, StorageError};
pub use lock::DistributedLock;
pub use memory::{MemoryAnalyticsStore, MemoryLock, MemoryLockTable};
#[cfg(feature = "redis")]
pub use redis_store::{RedisAnalyticsStore, RedisMutex};
pub use store::AnalyticsStore;
