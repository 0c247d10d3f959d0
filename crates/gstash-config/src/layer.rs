// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sections::{LockConfigLayer, LogConfigLayer, RedisConfigLayer, SinkConfig};

/// One partially specified configuration, as produced by a single source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct GstashConfigLayer {
	pub purge_delay: Option<u64>,
	pub omit_detailed_recording: Option<bool>,
	pub health_check_path: Option<String>,
	pub health_check_address: Option<String>,
	pub redis: Option<RedisConfigLayer>,
	pub lock: Option<LockConfigLayer>,
	pub log: Option<LogConfigLayer>,
	pub gstashs: Option<BTreeMap<String, SinkConfig>>,
}

impl GstashConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.purge_delay.is_some() {
			self.purge_delay = other.purge_delay;
		}
		if other.omit_detailed_recording.is_some() {
			self.omit_detailed_recording = other.omit_detailed_recording;
		}
		if other.health_check_path.is_some() {
			self.health_check_path = other.health_check_path;
		}
		if other.health_check_address.is_some() {
			self.health_check_address = other.health_check_address;
		}
		merge_section(&mut self.redis, other.redis, RedisConfigLayer::merge);
		merge_section(&mut self.lock, other.lock, LockConfigLayer::merge);
		merge_section(&mut self.log, other.log, LogConfigLayer::merge);
		// Sink tables are replaced wholesale, never merged key by key.
		if other.gstashs.is_some() {
			self.gstashs = other.gstashs;
		}
	}
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
	let Some(other) = other else {
		return;
	};

	if let Some(existing) = base.as_mut() {
		merge(existing, other);
	} else {
		*base = Some(other);
	}
}
