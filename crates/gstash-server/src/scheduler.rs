// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gstash_analytics::{decode_record, AnalyticsRecord, ANALYTICS_KEY_NAME};
use gstash_config::{GstashConfig, SinkConfig, DEFAULT_PURGE_DELAY_SECS};
use gstash_sinks::{CommonSinkConfig, Sink, SinkRegistry};
use gstash_storage::{AnalyticsStore, DistributedLock, LockError};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::fanout::supervise_write;
use crate::types::{PurgeOutcome, SinkWriteOutcome, SinkWriteReport};

#[derive(Debug, Clone)]
pub struct PurgeOptions {
	pub purge_delay: Duration,
	/// Blank policies and deciders on every record before any sink sees it.
	pub omit_detailed_recording: bool,
	pub analytics_key: String,
}

impl PurgeOptions {
	pub fn from_config(config: &GstashConfig) -> Self {
		Self {
			purge_delay: config.purge_interval(),
			omit_detailed_recording: config.omit_detailed_recording,
			analytics_key: config.redis.analytics_key.clone(),
		}
	}
}

impl Default for PurgeOptions {
	fn default() -> Self {
		Self {
			purge_delay: Duration::from_secs(DEFAULT_PURGE_DELAY_SECS),
			omit_detailed_recording: false,
			analytics_key: ANALYTICS_KEY_NAME.to_string(),
		}
	}
}

struct ActiveSink {
	name: String,
	sink: Arc<dyn Sink>,
}

/// Drains the analytics queue on a fixed cadence and fans each batch out to
/// the active sinks.
///
/// Only one instance across the cluster purges at a time; the others find the
/// lock held and skip the tick.
pub struct PurgeScheduler {
	store: Arc<dyn AnalyticsStore>,
	lock: Arc<dyn DistributedLock>,
	sinks: Vec<ActiveSink>,
	options: PurgeOptions,
}

impl PurgeScheduler {
	pub fn new(
		store: Arc<dyn AnalyticsStore>,
		lock: Arc<dyn DistributedLock>,
		options: PurgeOptions,
	) -> Self {
		Self {
			store,
			lock,
			sinks: Vec::new(),
			options,
		}
	}

	pub fn options(&self) -> &PurgeOptions {
		&self.options
	}

	/// Adds an already initialized sink under its configured name.
	pub fn add_sink(&mut self, name: impl Into<String>, sink: Box<dyn Sink>) {
		self.sinks.push(ActiveSink {
			name: name.into(),
			sink: Arc::from(sink),
		});
	}

	pub fn sink_names(&self) -> Vec<&str> {
		self.sinks.iter().map(|s| s.name.as_str()).collect()
	}

	/// Instantiates and initializes every configured sink.
	///
	/// A sink whose type is unknown or whose `init` fails is logged and left
	/// out; the rest still start. Returns the number of sinks that came up.
	pub async fn initialize_sinks(
		&mut self,
		registry: &SinkRegistry,
		configs: &BTreeMap<String, SinkConfig>,
	) -> usize {
		let mut initialized = 0;

		for (name, config) in configs {
			let sink_type = config.type_name(name);
			let prototype = match registry.get_by_name(sink_type) {
				Ok(prototype) => prototype,
				Err(e) => {
					error!(gstash = %name, sink_type, error = %e, "unknown gstash type, skipping");
					continue;
				}
			};

			let mut sink = prototype.new_instance();
			if let Err(e) = sink.init(&config.meta()).await {
				error!(gstash = %name, sink_type, error = %e, "failed to initialize gstash, skipping");
				continue;
			}

			*sink.common_mut() = CommonSinkConfig::from(config);

			info!(
				gstash = %name,
				sink_type,
				timeout_secs = config.timeout,
				has_filter = config.filters.has_filter(),
				"gstash initialized"
			);
			self.add_sink(name.clone(), sink);
			initialized += 1;
		}

		initialized
	}

	/// Ticks every `purge_delay` until `shutdown` fires.
	///
	/// A cycle is awaited before the next tick is taken, so one process never
	/// runs two cycles at once; a slow cycle delays the following tick.
	pub async fn run(&self, shutdown: CancellationToken) {
		let mut interval = tokio::time::interval(self.options.purge_delay);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
		// The first tick completes immediately.
		interval.tick().await;

		info!(
			purge_delay_secs = self.options.purge_delay.as_secs(),
			gstashs = self.sinks.len(),
			"purge scheduler started"
		);

		loop {
			tokio::select! {
				_ = interval.tick() => {
					self.cycle(&shutdown).await;
				}
				_ = shutdown.cancelled() => {
					info!("purge scheduler shutting down");
					break;
				}
			}
		}
	}

	/// Runs one cycle outside of the tick loop.
	pub async fn purge_cycle(&self) -> PurgeOutcome {
		self.cycle(&CancellationToken::new()).await
	}

	#[instrument(skip_all, fields(lock = %self.lock.name()))]
	async fn cycle(&self, shutdown: &CancellationToken) -> PurgeOutcome {
		match self.lock.lock().await {
			Ok(()) => {}
			Err(LockError::AlreadyHeld(name)) => {
				info!(lock = %name, "cannot obtain lock, another instance is purging");
				return PurgeOutcome::LockHeld;
			}
			Err(e) => {
				error!(error = %e, "failed to acquire purge lock");
				return PurgeOutcome::LockFailed;
			}
		}

		let outcome = self.drain_and_deliver(shutdown).await;

		match self.lock.unlock().await {
			Ok(true) => {}
			Ok(false) => warn!("purge lock expired before it was released"),
			Err(e) => error!(error = %e, "failed to release purge lock"),
		}

		outcome
	}

	async fn drain_and_deliver(&self, shutdown: &CancellationToken) -> PurgeOutcome {
		let entries = match self.store.get_and_delete_set(&self.options.analytics_key).await {
			Ok(entries) => entries,
			Err(e) => {
				error!(store = self.store.name(), error = %e, "failed to fetch analytics records");
				return PurgeOutcome::QueueError;
			}
		};

		if entries.is_empty() {
			debug!("analytics queue is empty");
			return PurgeOutcome::Empty;
		}

		let mut decode_failures = 0;
		let mut records = Vec::with_capacity(entries.len());
		for entry in &entries {
			match decode_record(entry) {
				Ok(mut record) => {
					if self.options.omit_detailed_recording {
						record.redact();
					}
					records.push(record);
				}
				Err(e) => {
					decode_failures += 1;
					error!(error = %e, "failed to decode analytics record, skipping it");
				}
			}
		}
		let records: Arc<[AnalyticsRecord]> = records.into();

		if self.sinks.is_empty() {
			warn!(records = records.len(), "no gstash defined, dropping drained records");
			return PurgeOutcome::Completed {
				records: records.len(),
				decode_failures,
				reports: Vec::new(),
			};
		}

		let reports = if records.is_empty() {
			Vec::new()
		} else {
			self.fan_out(&records, shutdown).await
		};

		let failed = reports.iter().filter(|r| !r.outcome.is_success()).count();
		info!(
			records = records.len(),
			decode_failures,
			gstashs = reports.len(),
			failed,
			"purge cycle complete"
		);

		PurgeOutcome::Completed {
			records: records.len(),
			decode_failures,
			reports,
		}
	}

	/// Writes the batch to every sink concurrently and waits for each one to
	/// finish, fail or be abandoned.
	async fn fan_out(
		&self,
		records: &Arc<[AnalyticsRecord]>,
		shutdown: &CancellationToken,
	) -> Vec<SinkWriteReport> {
		let mut writes = JoinSet::new();

		for (index, active) in self.sinks.iter().enumerate() {
			let write = supervise_write(
				active.name.clone(),
				Arc::clone(&active.sink),
				Arc::clone(records),
				shutdown.child_token(),
				self.options.purge_delay,
			);
			writes.spawn(async move { (index, write.await) });
		}

		let mut reports: Vec<Option<SinkWriteReport>> = vec![None; self.sinks.len()];
		while let Some(joined) = writes.join_next().await {
			match joined {
				Ok((index, report)) => reports[index] = Some(report),
				Err(e) => error!(error = %e, "gstash supervisor task failed"),
			}
		}

		reports
			.into_iter()
			.zip(&self.sinks)
			.map(|(report, active)| {
				report.unwrap_or_else(|| SinkWriteReport {
					name: active.name.clone(),
					records: 0,
					elapsed: Duration::ZERO,
					outcome: SinkWriteOutcome::Panicked,
				})
			})
			.collect()
	}
}
