// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gstash_analytics::{encode_record, AnalyticsFilters, AnalyticsRecord, ANALYTICS_KEY_NAME};
use gstash_config::SinkConfig;
use gstash_server::{PurgeOptions, PurgeOutcome, PurgeScheduler, SinkWriteOutcome};
use gstash_sinks::{CommonSinkConfig, Sink, SinkError, SinkRegistry, WriteContext};
use gstash_storage::{
	AnalyticsStore, DistributedLock, LockError, MemoryAnalyticsStore, MemoryLock, MemoryLockTable,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

const LOCK_NAME: &str = "leona-gstash";

#[derive(Clone, Copy)]
enum Behavior {
	Succeed,
	Fail,
	/// Sleeps but gives up once its context is done.
	Cooperative(Duration),
	/// Sleeps without ever looking at its context.
	Hang(Duration),
}

#[derive(Clone, Default)]
struct Tally {
	batches: Arc<Mutex<Vec<Vec<AnalyticsRecord>>>>,
	finished: Arc<AtomicUsize>,
}

impl Tally {
	fn calls(&self) -> usize {
		self.batches.lock().unwrap().len()
	}

	fn last_batch(&self) -> Vec<AnalyticsRecord> {
		self.batches.lock().unwrap().last().cloned().unwrap_or_default()
	}

	fn finished(&self) -> usize {
		self.finished.load(Ordering::SeqCst)
	}
}

struct RecordingSink {
	common: CommonSinkConfig,
	behavior: Behavior,
	tally: Tally,
}

impl RecordingSink {
	fn new(behavior: Behavior) -> (Box<dyn Sink>, Tally) {
		Self::with_common(behavior, CommonSinkConfig::default())
	}

	fn with_common(behavior: Behavior, common: CommonSinkConfig) -> (Box<dyn Sink>, Tally) {
		let tally = Tally::default();
		let sink = Self {
			common,
			behavior,
			tally: tally.clone(),
		};
		(Box::new(sink), tally)
	}
}

#[async_trait]
impl Sink for RecordingSink {
	fn name(&self) -> &str {
		"recording"
	}

	fn new_instance(&self) -> Box<dyn Sink> {
		Box::new(Self {
			common: CommonSinkConfig::default(),
			behavior: self.behavior,
			tally: Tally::default(),
		})
	}

	async fn init(&mut self, _meta: &Value) -> Result<(), SinkError> {
		Ok(())
	}

	async fn write_data(
		&self,
		ctx: WriteContext,
		records: Arc<[AnalyticsRecord]>,
	) -> Result<(), SinkError> {
		self.tally.batches.lock().unwrap().push(records.to_vec());

		let result = match self.behavior {
			Behavior::Succeed => Ok(()),
			Behavior::Fail => Err(SinkError::Transient("connection refused".to_string())),
			Behavior::Cooperative(d) => {
				ctx.run(async {
					tokio::time::sleep(d).await;
					Ok(())
				})
				.await
			}
			Behavior::Hang(d) => {
				tokio::time::sleep(d).await;
				Ok(())
			}
		};

		self.tally.finished.fetch_add(1, Ordering::SeqCst);
		result
	}

	fn common(&self) -> &CommonSinkConfig {
		&self.common
	}

	fn common_mut(&mut self) -> &mut CommonSinkConfig {
		&mut self.common
	}
}

/// Counts lock traffic on top of a shared in-memory lease table.
struct CountingLock {
	inner: MemoryLock,
	locks: AtomicUsize,
	unlocks: AtomicUsize,
}

impl CountingLock {
	fn new(table: &MemoryLockTable) -> Arc<Self> {
		Arc::new(Self {
			inner: table.new_mutex(LOCK_NAME, Duration::from_secs(600)),
			locks: AtomicUsize::new(0),
			unlocks: AtomicUsize::new(0),
		})
	}

	fn unlocks(&self) -> usize {
		self.unlocks.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl DistributedLock for CountingLock {
	fn name(&self) -> &str {
		self.inner.name()
	}

	async fn lock(&self) -> Result<(), LockError> {
		self.inner.lock().await?;
		self.locks.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn unlock(&self) -> Result<bool, LockError> {
		self.unlocks.fetch_add(1, Ordering::SeqCst);
		self.inner.unlock().await
	}
}

struct Harness {
	store: Arc<MemoryAnalyticsStore>,
	table: MemoryLockTable,
	lock: Arc<CountingLock>,
}

impl Harness {
	fn new() -> Self {
		let table = MemoryLockTable::new();
		let lock = CountingLock::new(&table);
		Self {
			store: Arc::new(MemoryAnalyticsStore::new()),
			table,
			lock,
		}
	}

	fn scheduler(&self, options: PurgeOptions) -> PurgeScheduler {
		PurgeScheduler::new(
			Arc::clone(&self.store) as Arc<dyn AnalyticsStore>,
			Arc::clone(&self.lock) as Arc<dyn DistributedLock>,
			options,
		)
	}

	async fn seed(&self, records: &[AnalyticsRecord]) {
		for record in records {
			self.store
				.push(ANALYTICS_KEY_NAME, encode_record(record).unwrap())
				.await;
		}
	}
}

fn detailed(username: &str) -> AnalyticsRecord {
	AnalyticsRecord::builder(username)
		.timestamp(1_700_000_000)
		.conclusion("policy matched")
		.request(r#"{"action":"get"}"#)
		.policies(r#"[{"name":"read-only"}]"#)
		.deciders(r#"[{"name":"read-only","effect":"allow"}]"#)
		.build()
}

fn batch() -> Vec<AnalyticsRecord> {
	vec![detailed("alice"), detailed("svc-internal"), detailed("bob")]
}

#[tokio::test]
async fn test_empty_queue_is_noop() {
	let harness = Harness::new();
	let mut scheduler = harness.scheduler(PurgeOptions::default());
	let (sink, tally) = RecordingSink::new(Behavior::Succeed);
	scheduler.add_sink("recording", sink);

	assert_eq!(scheduler.purge_cycle().await, PurgeOutcome::Empty);
	assert_eq!(tally.calls(), 0);
	assert_eq!(harness.lock.unlocks(), 1);
	assert!(!harness.table.is_held(LOCK_NAME).await);
}

#[tokio::test]
async fn test_drain_is_at_most_once() {
	let harness = Harness::new();
	harness.seed(&batch()).await;

	assert_eq!(
		harness
			.store
			.get_and_delete_set(ANALYTICS_KEY_NAME)
			.await
			.unwrap()
			.len(),
		3
	);
	assert!(harness
		.store
		.get_and_delete_set(ANALYTICS_KEY_NAME)
		.await
		.unwrap()
		.is_empty());
}

#[tokio::test]
async fn test_second_instance_sees_drained_queue() {
	let harness = Harness::new();
	harness.seed(&batch()).await;

	let mut first = harness.scheduler(PurgeOptions::default());
	let (sink, first_tally) = RecordingSink::new(Behavior::Succeed);
	first.add_sink("recording", sink);

	let mut second = PurgeScheduler::new(
		Arc::clone(&harness.store) as Arc<dyn AnalyticsStore>,
		Arc::new(harness.table.new_mutex(LOCK_NAME, Duration::from_secs(600))),
		PurgeOptions::default(),
	);
	let (sink, second_tally) = RecordingSink::new(Behavior::Succeed);
	second.add_sink("recording", sink);

	assert!(matches!(
		first.purge_cycle().await,
		PurgeOutcome::Completed { records: 3, .. }
	));
	assert_eq!(second.purge_cycle().await, PurgeOutcome::Empty);
	assert_eq!(first_tally.calls(), 1);
	assert_eq!(second_tally.calls(), 0);
}

#[tokio::test]
async fn test_one_failing_sink_is_isolated() {
	let harness = Harness::new();
	harness.seed(&batch()).await;

	let mut scheduler = harness.scheduler(PurgeOptions::default());
	let (csv, csv_tally) = RecordingSink::new(Behavior::Succeed);
	let (kafka, kafka_tally) = RecordingSink::new(Behavior::Fail);
	let (syslog, syslog_tally) = RecordingSink::new(Behavior::Succeed);
	scheduler.add_sink("csv", csv);
	scheduler.add_sink("kafka", kafka);
	scheduler.add_sink("syslog", syslog);

	let outcome = scheduler.purge_cycle().await;
	assert!(matches!(outcome, PurgeOutcome::Completed { records: 3, .. }));

	assert_eq!(outcome.report("csv").unwrap().outcome, SinkWriteOutcome::Completed);
	assert_eq!(outcome.report("syslog").unwrap().outcome, SinkWriteOutcome::Completed);
	assert!(matches!(
		outcome.report("kafka").unwrap().outcome,
		SinkWriteOutcome::Failed(_)
	));

	assert_eq!(csv_tally.last_batch().len(), 3);
	assert_eq!(syslog_tally.last_batch().len(), 3);
	assert_eq!(kafka_tally.calls(), 1);
	assert_eq!(harness.lock.unlocks(), 1);
}

#[tokio::test]
async fn test_timeout_abandons_hung_sink() {
	let harness = Harness::new();
	harness.seed(&batch()).await;

	let mut scheduler = harness.scheduler(PurgeOptions::default());
	let (slow, slow_tally) = RecordingSink::with_common(
		Behavior::Hang(Duration::from_secs(5)),
		CommonSinkConfig {
			timeout: 1,
			..Default::default()
		},
	);
	let (fast, fast_tally) = RecordingSink::new(Behavior::Succeed);
	scheduler.add_sink("slow", slow);
	scheduler.add_sink("fast", fast);

	let started = std::time::Instant::now();
	let outcome = scheduler.purge_cycle().await;
	let wall = started.elapsed();

	let slow_report = outcome.report("slow").unwrap();
	assert_eq!(slow_report.outcome, SinkWriteOutcome::TimedOut);
	assert!(slow_report.elapsed >= Duration::from_millis(900));
	assert!(slow_report.elapsed < Duration::from_secs(2));
	assert!(wall < Duration::from_millis(2500), "cycle took {wall:?}");

	assert_eq!(outcome.report("fast").unwrap().outcome, SinkWriteOutcome::Completed);
	assert_eq!(fast_tally.last_batch().len(), 3);

	// Abandoned, not killed: the write is still running in the background.
	assert_eq!(slow_tally.calls(), 1);
	assert_eq!(slow_tally.finished(), 0);
}

#[tokio::test]
async fn test_global_redaction() {
	let harness = Harness::new();
	harness.seed(&batch()).await;

	let mut scheduler = harness.scheduler(PurgeOptions {
		omit_detailed_recording: true,
		..Default::default()
	});
	let (sink, tally) = RecordingSink::new(Behavior::Succeed);
	scheduler.add_sink("recording", sink);
	scheduler.purge_cycle().await;

	let delivered = tally.last_batch();
	assert_eq!(delivered.len(), 3);
	for (got, sent) in delivered.iter().zip(batch()) {
		assert_eq!(got.policies, "");
		assert_eq!(got.deciders, "");
		assert_eq!(got.timestamp, sent.timestamp);
		assert_eq!(got.username, sent.username);
		assert_eq!(got.effect, sent.effect);
		assert_eq!(got.request, sent.request);
	}
}

#[tokio::test]
async fn test_per_sink_redaction() {
	let harness = Harness::new();
	harness.seed(&batch()).await;

	let mut scheduler = harness.scheduler(PurgeOptions::default());
	let (private, private_tally) = RecordingSink::with_common(
		Behavior::Succeed,
		CommonSinkConfig {
			omit_detailed_recording: true,
			..Default::default()
		},
	);
	let (full, full_tally) = RecordingSink::new(Behavior::Succeed);
	scheduler.add_sink("private", private);
	scheduler.add_sink("full", full);
	scheduler.purge_cycle().await;

	for record in private_tally.last_batch() {
		assert_eq!(record.policies, "");
		assert_eq!(record.deciders, "");
		assert_eq!(record.timestamp, 1_700_000_000);
	}
	for record in full_tally.last_batch() {
		assert!(!record.policies.is_empty());
		assert!(!record.deciders.is_empty());
	}
}

#[tokio::test]
async fn test_dummy_and_filtered_sink_end_to_end() {
	let harness = Harness::new();
	harness.seed(&batch()).await;

	let mut scheduler = harness.scheduler(PurgeOptions::default());
	let mut configs = BTreeMap::new();
	configs.insert("dummy".to_string(), SinkConfig::default());
	assert_eq!(
		scheduler
			.initialize_sinks(&SinkRegistry::builtin(), &configs)
			.await,
		1
	);

	let (mut filtered, tally) = RecordingSink::new(Behavior::Succeed);
	filtered.set_filters(AnalyticsFilters::new(
		Vec::<String>::new(),
		vec!["svc-internal".to_string()],
	));
	scheduler.add_sink("filtered", filtered);

	let outcome = scheduler.purge_cycle().await;

	let dummy = outcome.report("dummy").unwrap();
	assert_eq!(dummy.records, 3);
	assert_eq!(dummy.outcome, SinkWriteOutcome::Completed);

	let filtered = outcome.report("filtered").unwrap();
	assert_eq!(filtered.records, 2);
	assert_eq!(filtered.outcome, SinkWriteOutcome::Completed);
	assert!(tally
		.last_batch()
		.iter()
		.all(|record| record.username != "svc-internal"));

	assert_eq!(harness.lock.locks.load(Ordering::SeqCst), 1);
	assert_eq!(harness.lock.unlocks(), 1);
	assert!(!harness.table.is_held(LOCK_NAME).await);
}

#[tokio::test]
async fn test_lock_held_elsewhere_skips_fetch() {
	let harness = Harness::new();
	harness.seed(&batch()).await;

	let other_instance = harness.table.new_mutex(LOCK_NAME, Duration::from_secs(600));
	other_instance.lock().await.unwrap();

	let mut scheduler = harness.scheduler(PurgeOptions::default());
	let (sink, tally) = RecordingSink::new(Behavior::Succeed);
	scheduler.add_sink("recording", sink);

	assert_eq!(scheduler.purge_cycle().await, PurgeOutcome::LockHeld);
	assert_eq!(harness.store.fetch_count(), 0);
	assert_eq!(harness.store.len(ANALYTICS_KEY_NAME).await, 3);
	assert_eq!(tally.calls(), 0);
	assert_eq!(harness.lock.unlocks(), 0);
}

/// A sink without a timeout holds the cycle, and the lock, for as long as it
/// runs. The purge-delay overrun only produces a warning.
#[tokio::test(start_paused = true)]
async fn test_timeoutless_sink_stalls_cycle() {
	let harness = Harness::new();
	harness.seed(&batch()).await;

	let mut scheduler = harness.scheduler(PurgeOptions::default());
	let (sink, tally) = RecordingSink::new(Behavior::Hang(Duration::from_secs(60)));
	scheduler.add_sink("stuck", sink);
	let scheduler = Arc::new(scheduler);

	let cycle = {
		let scheduler = Arc::clone(&scheduler);
		tokio::spawn(async move { scheduler.purge_cycle().await })
	};

	tokio::time::sleep(Duration::from_secs(30)).await;
	assert!(!cycle.is_finished());
	assert!(harness.table.is_held(LOCK_NAME).await);

	let outcome = cycle.await.unwrap();
	let report = outcome.report("stuck").unwrap();
	assert_eq!(report.outcome, SinkWriteOutcome::Completed);
	assert!(report.elapsed >= Duration::from_secs(60));
	assert_eq!(tally.finished(), 1);
	assert!(!harness.table.is_held(LOCK_NAME).await);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_in_flight_write() {
	let harness = Harness::new();
	harness.seed(&batch()).await;

	let mut scheduler = harness.scheduler(PurgeOptions::default());
	let (sink, tally) = RecordingSink::new(Behavior::Cooperative(Duration::from_secs(300)));
	scheduler.add_sink("slow", sink);
	let scheduler = Arc::new(scheduler);

	let shutdown = CancellationToken::new();
	let run = {
		let scheduler = Arc::clone(&scheduler);
		let shutdown = shutdown.clone();
		tokio::spawn(async move { scheduler.run(shutdown).await })
	};

	// First cycle starts at the 10s tick.
	tokio::time::sleep(Duration::from_secs(15)).await;
	assert_eq!(tally.calls(), 1);

	shutdown.cancel();
	run.await.unwrap();

	assert_eq!(harness.lock.unlocks(), 1);
	assert!(!harness.table.is_held(LOCK_NAME).await);
}
