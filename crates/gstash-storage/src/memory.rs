// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process store and lock, for single-instance deployments and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{LockError, StorageError};
use crate::lock::DistributedLock;
use crate::store::AnalyticsStore;

#[derive(Default)]
pub struct MemoryAnalyticsStore {
	lists: Mutex<HashMap<String, Vec<Vec<u8>>>>,
	fetches: AtomicUsize,
}

impl MemoryAnalyticsStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn push(&self, key: &str, entry: Vec<u8>) {
		self.lists
			.lock()
			.await
			.entry(key.to_string())
			.or_default()
			.push(entry);
	}

	pub async fn extend<I>(&self, key: &str, entries: I)
	where
		I: IntoIterator<Item = Vec<u8>>,
	{
		self.lists
			.lock()
			.await
			.entry(key.to_string())
			.or_default()
			.extend(entries);
	}

	pub async fn len(&self, key: &str) -> usize {
		self.lists.lock().await.get(key).map_or(0, Vec::len)
	}

	/// Number of `get_and_delete_set` calls served so far.
	pub fn fetch_count(&self) -> usize {
		self.fetches.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl AnalyticsStore for MemoryAnalyticsStore {
	fn name(&self) -> &str {
		"memory"
	}

	async fn get_and_delete_set(&self, key: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		self.fetches.fetch_add(1, Ordering::SeqCst);
		Ok(self.lists.lock().await.remove(key).unwrap_or_default())
	}
}

struct Lease {
	token: u64,
	expires_at: Instant,
}

/// Lease table shared by every [`MemoryLock`] handle created from it.
#[derive(Clone, Default)]
pub struct MemoryLockTable {
	leases: Arc<Mutex<HashMap<String, Lease>>>,
}

impl MemoryLockTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// A new handle, as a separate purger instance would hold.
	pub fn new_mutex(&self, name: impl Into<String>, expiry: Duration) -> MemoryLock {
		MemoryLock {
			table: self.clone(),
			name: name.into(),
			expiry,
			token: fastrand::u64(..),
		}
	}

	pub async fn is_held(&self, name: &str) -> bool {
		self.leases
			.lock()
			.await
			.get(name)
			.is_some_and(|lease| lease.expires_at > Instant::now())
	}
}

pub struct MemoryLock {
	table: MemoryLockTable,
	name: String,
	expiry: Duration,
	token: u64,
}

impl MemoryLock {
	pub fn new(name: impl Into<String>, expiry: Duration) -> Self {
		MemoryLockTable::new().new_mutex(name, expiry)
	}
}

#[async_trait]
impl DistributedLock for MemoryLock {
	fn name(&self) -> &str {
		&self.name
	}

	async fn lock(&self) -> Result<(), LockError> {
		let now = Instant::now();
		let mut leases = self.table.leases.lock().await;

		if leases.get(&self.name).is_some_and(|lease| lease.expires_at > now) {
			return Err(LockError::AlreadyHeld(self.name.clone()));
		}

		leases.insert(
			self.name.clone(),
			Lease {
				token: self.token,
				expires_at: now + self.expiry,
			},
		);
		Ok(())
	}

	async fn unlock(&self) -> Result<bool, LockError> {
		let now = Instant::now();
		let mut leases = self.table.leases.lock().await;

		match leases.get(&self.name) {
			Some(lease) if lease.token == self.token => {
				let live = lease.expires_at > now;
				leases.remove(&self.name);
				Ok(live)
			}
			_ => Ok(false),
		}
	}
}
