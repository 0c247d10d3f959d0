// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::error::LockError;

/// Cluster-wide mutual exclusion backed by an expiring lease.
///
/// A crashed holder's lease lapses on its own, so the worst case after a crash
/// is one missed lease period.
#[async_trait]
pub trait DistributedLock: Send + Sync {
	fn name(&self) -> &str;

	/// Single attempt. Contention is reported as [`LockError::AlreadyHeld`].
	async fn lock(&self) -> Result<(), LockError>;

	/// Releases the lease if this handle still owns it. Returns `false` when the
	/// lease had already expired or was never taken.
	async fn unlock(&self) -> Result<bool, LockError>;
}
