// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::error::StorageError;

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
	fn name(&self) -> &str;

	/// Returns every entry under `key` and removes them in the same atomic step.
	///
	/// Two concurrent callers never receive the same entry.
	async fn get_and_delete_set(&self, key: &str) -> Result<Vec<Vec<u8>>, StorageError>;
}
