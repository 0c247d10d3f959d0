// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use gstash_analytics::AnalyticsFilters;
use gstash_config::SinkConfig;

/// Settings every sink carries regardless of its back-end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonSinkConfig {
	pub filters: AnalyticsFilters,
	/// Seconds; zero means no hard deadline.
	pub timeout: u64,
	pub omit_detailed_recording: bool,
}

impl CommonSinkConfig {
	pub fn timeout_duration(&self) -> Option<Duration> {
		(self.timeout > 0).then(|| Duration::from_secs(self.timeout))
	}

	/// True when records can be forwarded without a per-sink copy.
	pub fn is_passthrough(&self) -> bool {
		!self.filters.has_filter() && !self.omit_detailed_recording
	}
}

impl From<&SinkConfig> for CommonSinkConfig {
	fn from(config: &SinkConfig) -> Self {
		Self {
			filters: config.filters.clone(),
			timeout: config.timeout,
			omit_detailed_recording: config.omit_detailed_recording,
		}
	}
}
