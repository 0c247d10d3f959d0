// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::record::AnalyticsRecord;

/// Per-sink username filter.
///
/// `skip_usernames` is checked first and always wins. A non-empty `usernames`
/// turns the filter into an allow-list. Both empty means no filtering at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsFilters {
	pub usernames: BTreeSet<String>,
	pub skip_usernames: BTreeSet<String>,
}

impl AnalyticsFilters {
	pub fn new<A, S>(usernames: A, skip_usernames: S) -> Self
	where
		A: IntoIterator,
		A::Item: Into<String>,
		S: IntoIterator,
		S::Item: Into<String>,
	{
		Self {
			usernames: usernames.into_iter().map(Into::into).collect(),
			skip_usernames: skip_usernames.into_iter().map(Into::into).collect(),
		}
	}

	/// Returns `true` when the record must be excluded.
	pub fn should_filter(&self, record: &AnalyticsRecord) -> bool {
		if !self.skip_usernames.is_empty() && self.skip_usernames.contains(&record.username) {
			return true;
		}

		!self.usernames.is_empty() && !self.usernames.contains(&record.username)
	}

	pub fn has_filter(&self) -> bool {
		!self.usernames.is_empty() || !self.skip_usernames.is_empty()
	}
}
