// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery of one batch to one sink.
//!
//! The write itself runs on its own task so a sink that panics or ignores its
//! [`WriteContext`] cannot take the cycle down with it. When the sink's
//! timeout passes, the child token is cancelled and the task is detached: the
//! cycle moves on, and a sink that never checks its context keeps running in
//! the background until it returns on its own.

use std::sync::Arc;
use std::time::Duration;

use gstash_analytics::AnalyticsRecord;
use gstash_sinks::{filter_batch, Sink, SinkError, WriteContext};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::types::{SinkWriteOutcome, SinkWriteReport};

#[instrument(skip_all, fields(gstash = %name))]
pub(crate) async fn supervise_write(
	name: String,
	sink: Arc<dyn Sink>,
	records: Arc<[AnalyticsRecord]>,
	token: CancellationToken,
	purge_delay: Duration,
) -> SinkWriteReport {
	let batch = filter_batch(&records, sink.common());
	let delivered = batch.len();
	let timeout_secs = sink.timeout();
	let ctx = WriteContext::with_timeout(token.clone(), sink.common().timeout_duration());
	let deadline = ctx.deadline();
	let started = Instant::now();

	let writer = {
		let sink = Arc::clone(&sink);
		tokio::spawn(async move { sink.write_data(ctx, batch).await })
	};

	let outcome = await_write(writer, &name, &token, deadline, timeout_secs, purge_delay).await;
	let elapsed = started.elapsed();

	match &outcome {
		SinkWriteOutcome::Completed => {
			info!(records = delivered, elapsed_ms = elapsed.as_millis() as u64, "gstash write completed");
		}
		SinkWriteOutcome::Failed(error) => {
			warn!(records = delivered, error = %error, "gstash write failed");
		}
		SinkWriteOutcome::TimedOut => {
			warn!(timeout_secs, "gstash write timed out, abandoning it");
		}
		SinkWriteOutcome::Cancelled => {
			warn!("gstash write cancelled");
		}
		SinkWriteOutcome::Panicked => {
			warn!("gstash write panicked");
		}
	}

	SinkWriteReport {
		name,
		records: delivered,
		elapsed,
		outcome,
	}
}

async fn await_write(
	mut writer: JoinHandle<Result<(), SinkError>>,
	name: &str,
	token: &CancellationToken,
	deadline: Option<Instant>,
	timeout_secs: u64,
	purge_delay: Duration,
) -> SinkWriteOutcome {
	let expired = async {
		match deadline {
			Some(deadline) => tokio::time::sleep_until(deadline).await,
			None => std::future::pending().await,
		}
	};
	tokio::pin!(expired);

	let advisory = tokio::time::sleep(purge_delay);
	tokio::pin!(advisory);
	let mut advised = false;

	loop {
		tokio::select! {
			biased;

			joined = &mut writer => {
				return match joined {
					Ok(Ok(())) => SinkWriteOutcome::Completed,
					Ok(Err(SinkError::Cancelled)) => {
						if deadline.is_some_and(|d| Instant::now() >= d) {
							token.cancel();
							SinkWriteOutcome::TimedOut
						} else {
							SinkWriteOutcome::Cancelled
						}
					}
					Ok(Err(e)) => SinkWriteOutcome::Failed(e.to_string()),
					Err(e) if e.is_panic() => SinkWriteOutcome::Panicked,
					Err(_) => SinkWriteOutcome::Cancelled,
				};
			}
			_ = &mut expired => {
				token.cancel();
				return SinkWriteOutcome::TimedOut;
			}
			_ = token.cancelled() => {
				return SinkWriteOutcome::Cancelled;
			}
			_ = &mut advisory, if !advised => {
				advised = true;
				advise_slow_write(name, timeout_secs, purge_delay);
			}
		}
	}
}

/// Advice for a write that outlived the purge delay, if its timeout is to blame.
pub(crate) fn advisory_message(timeout_secs: u64, purge_delay: Duration) -> Option<&'static str> {
	if timeout_secs == 0 {
		Some("gstash is taking more time than purge_delay, you should try to set a timeout")
	} else if timeout_secs > purge_delay.as_secs() {
		Some("gstash is taking more time than purge_delay, you should try lowering the timeout")
	} else {
		None
	}
}

/// Warns once when a write outlives the purge delay. Never stops the write.
fn advise_slow_write(name: &str, timeout_secs: u64, purge_delay: Duration) {
	if let Some(advice) = advisory_message(timeout_secs, purge_delay) {
		warn!(
			gstash = %name,
			timeout_secs,
			purge_delay_secs = purge_delay.as_secs(),
			"{advice}"
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use gstash_sinks::CommonSinkConfig;
	use serde_json::Value;

	enum Mode {
		Ok,
		Fail,
		Panic,
		Cooperative(Duration),
	}

	struct ScriptedSink {
		common: CommonSinkConfig,
		mode: Mode,
	}

	impl ScriptedSink {
		fn new(mode: Mode, timeout: u64) -> Arc<dyn Sink> {
			let common = CommonSinkConfig {
				timeout,
				..Default::default()
			};
			Arc::new(Self { common, mode })
		}
	}

	#[async_trait]
	impl Sink for ScriptedSink {
		fn name(&self) -> &str {
			"scripted"
		}

		fn new_instance(&self) -> Box<dyn Sink> {
			unimplemented!()
		}

		async fn init(&mut self, _meta: &Value) -> Result<(), SinkError> {
			Ok(())
		}

		async fn write_data(
			&self,
			ctx: WriteContext,
			_records: Arc<[AnalyticsRecord]>,
		) -> Result<(), SinkError> {
			match &self.mode {
				Mode::Ok => Ok(()),
				Mode::Fail => Err(SinkError::Transient("broker down".to_string())),
				Mode::Panic => panic!("sink bug"),
				Mode::Cooperative(d) => {
					ctx.run(async {
						tokio::time::sleep(*d).await;
						Ok(())
					})
					.await
				}
			}
		}

		fn common(&self) -> &CommonSinkConfig {
			&self.common
		}

		fn common_mut(&mut self) -> &mut CommonSinkConfig {
			&mut self.common
		}
	}

	fn records() -> Arc<[AnalyticsRecord]> {
		vec![AnalyticsRecord::builder("alice").build()].into()
	}

	async fn supervise(sink: Arc<dyn Sink>, token: CancellationToken) -> SinkWriteReport {
		supervise_write(
			"test".to_string(),
			sink,
			records(),
			token,
			Duration::from_secs(10),
		)
		.await
	}

	#[test]
	fn test_advisory_without_timeout() {
		assert_eq!(
			advisory_message(0, Duration::from_secs(10)),
			Some("gstash is taking more time than purge_delay, you should try to set a timeout")
		);
	}

	#[test]
	fn test_advisory_timeout_longer_than_delay() {
		assert_eq!(
			advisory_message(30, Duration::from_secs(10)),
			Some("gstash is taking more time than purge_delay, you should try lowering the timeout")
		);
	}

	#[test]
	fn test_advisory_timeout_within_delay() {
		assert_eq!(advisory_message(5, Duration::from_secs(10)), None);
		assert_eq!(advisory_message(10, Duration::from_secs(10)), None);
	}

	#[tokio::test]
	async fn test_completed_and_failed() {
		let ok = supervise(ScriptedSink::new(Mode::Ok, 0), CancellationToken::new()).await;
		assert_eq!(ok.outcome, SinkWriteOutcome::Completed);
		assert_eq!(ok.records, 1);

		let failed = supervise(ScriptedSink::new(Mode::Fail, 0), CancellationToken::new()).await;
		assert!(matches!(failed.outcome, SinkWriteOutcome::Failed(ref e) if e.contains("broker down")));
	}

	#[tokio::test]
	async fn test_panic_is_contained() {
		let report = supervise(ScriptedSink::new(Mode::Panic, 0), CancellationToken::new()).await;
		assert_eq!(report.outcome, SinkWriteOutcome::Panicked);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cooperative_sink_times_out() {
		let token = CancellationToken::new();
		let report = supervise(
			ScriptedSink::new(Mode::Cooperative(Duration::from_secs(30)), 2),
			token.clone(),
		)
		.await;

		assert_eq!(report.outcome, SinkWriteOutcome::TimedOut);
		assert!(report.elapsed >= Duration::from_secs(2));
		assert!(report.elapsed < Duration::from_secs(3));
		assert!(token.is_cancelled());
	}

	#[tokio::test(start_paused = true)]
	async fn test_shutdown_cancels_write() {
		let token = CancellationToken::new();
		let canceller = token.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(1)).await;
			canceller.cancel();
		});

		let report = supervise(
			ScriptedSink::new(Mode::Cooperative(Duration::from_secs(30)), 0),
			token,
		)
		.await;
		assert_eq!(report.outcome, SinkWriteOutcome::Cancelled);
	}
}
