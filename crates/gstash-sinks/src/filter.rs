// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use gstash_analytics::AnalyticsRecord;

use crate::common::CommonSinkConfig;

/// Per-sink view of a batch: filtered records, redacted when the sink asks
/// for it. The shared batch is never modified; a sink with neither filter nor
/// redaction gets the same allocation back.
pub fn filter_batch(
	records: &Arc<[AnalyticsRecord]>,
	common: &CommonSinkConfig,
) -> Arc<[AnalyticsRecord]> {
	if common.is_passthrough() {
		return Arc::clone(records);
	}

	records
		.iter()
		.filter(|record| !common.filters.should_filter(record))
		.map(|record| {
			if common.omit_detailed_recording {
				record.redacted()
			} else {
				record.clone()
			}
		})
		.collect()
}
