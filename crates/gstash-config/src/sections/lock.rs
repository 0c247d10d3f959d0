// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_LOCK_NAME: &str = "leona-gstash";
pub const DEFAULT_LOCK_EXPIRY_SECS: u64 = 600;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct LockConfigLayer {
	pub name: Option<String>,
	pub expiry_secs: Option<u64>,
}

impl LockConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.name.is_some() {
			self.name = other.name;
		}
		if other.expiry_secs.is_some() {
			self.expiry_secs = other.expiry_secs;
		}
	}

	pub fn finalize(self) -> LockConfig {
		LockConfig {
			name: self.name.unwrap_or_else(|| DEFAULT_LOCK_NAME.to_string()),
			expiry_secs: self.expiry_secs.unwrap_or(DEFAULT_LOCK_EXPIRY_SECS),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockConfig {
	pub name: String,
	pub expiry_secs: u64,
}

impl LockConfig {
	pub fn expiry(&self) -> Duration {
		Duration::from_secs(self.expiry_secs)
	}
}

impl Default for LockConfig {
	fn default() -> Self {
		LockConfigLayer::default().finalize()
	}
}
