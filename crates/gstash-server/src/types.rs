// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

/// Result of one purge cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeOutcome {
	/// Another instance holds the purge lock.
	LockHeld,
	/// The lock backend could not be reached.
	LockFailed,
	/// The queue was empty; no sink was called.
	Empty,
	/// The queue could not be drained.
	QueueError,
	Completed {
		records: usize,
		decode_failures: usize,
		reports: Vec<SinkWriteReport>,
	},
}

impl PurgeOutcome {
	pub fn reports(&self) -> &[SinkWriteReport] {
		match self {
			PurgeOutcome::Completed { reports, .. } => reports,
			_ => &[],
		}
	}

	pub fn report(&self, sink: &str) -> Option<&SinkWriteReport> {
		self.reports().iter().find(|r| r.name == sink)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkWriteReport {
	/// Configured name of the sink.
	pub name: String,
	/// Records handed to the sink after filtering.
	pub records: usize,
	pub elapsed: Duration,
	pub outcome: SinkWriteOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkWriteOutcome {
	Completed,
	Failed(String),
	/// Abandoned at the sink's timeout. The write task is detached, not stopped.
	TimedOut,
	Cancelled,
	Panicked,
}

impl SinkWriteOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, SinkWriteOutcome::Completed)
	}
}
