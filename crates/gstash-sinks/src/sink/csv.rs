// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![cfg(feature = "sink-csv")]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gstash_analytics::AnalyticsRecord;
use gstash_config::DEFAULT_CSV_DIR;
use serde::Deserialize;
use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::common::CommonSinkConfig;
use crate::context::WriteContext;
use crate::error::SinkError;
use crate::sink::{decode_meta, Sink};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CsvMeta {
	#[serde(default = "default_csv_dir")]
	csv_dir: String,
}

fn default_csv_dir() -> String {
	DEFAULT_CSV_DIR.to_string()
}

struct FileHandle {
	path: PathBuf,
	file: tokio::fs::File,
}

/// Appends records to one CSV file per hour under `csv_dir`.
#[derive(Default)]
pub struct CsvSink {
	common: CommonSinkConfig,
	dir: PathBuf,
	handle: Mutex<Option<FileHandle>>,
}

impl CsvSink {
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// The hourly file a write at `now` lands in.
	pub fn file_path(&self, now: DateTime<Utc>) -> PathBuf {
		self.dir.join(file_name(now))
	}
}

pub fn file_name(now: DateTime<Utc>) -> String {
	now.format("%Y-%B-%-d-%-H.csv").to_string()
}

/// RFC 4180 rows, `\n` terminated, optionally led by the header.
pub fn encode_batch(records: &[AnalyticsRecord], with_header: bool) -> Result<Vec<u8>, SinkError> {
	let encode_err = |e: ::csv::Error| SinkError::Permanent(format!("csv encoding failed: {e}"));

	let mut writer = ::csv::WriterBuilder::new()
		.has_headers(false)
		.terminator(::csv::Terminator::Any(b'\n'))
		.from_writer(Vec::new());

	if with_header {
		writer
			.write_record(AnalyticsRecord::FIELD_NAMES)
			.map_err(encode_err)?;
	}
	for record in records {
		writer
			.write_record(record.line_values())
			.map_err(encode_err)?;
	}

	writer
		.into_inner()
		.map_err(|e| SinkError::Permanent(format!("csv encoding failed: {}", e.error())))
}

async fn append(file: &mut tokio::fs::File, buffer: &[u8]) -> Result<(), SinkError> {
	file.write_all(buffer)
		.await
		.map_err(|e| SinkError::Transient(format!("failed to write csv file: {e}")))?;
	file.flush()
		.await
		.map_err(|e| SinkError::Transient(format!("failed to flush csv file: {e}")))
}

#[async_trait]
impl Sink for CsvSink {
	fn name(&self) -> &str {
		"csv"
	}

	fn new_instance(&self) -> Box<dyn Sink> {
		Box::new(Self::default())
	}

	async fn init(&mut self, meta: &Value) -> Result<(), SinkError> {
		let meta: CsvMeta = decode_meta(meta)?;
		self.dir = PathBuf::from(meta.csv_dir);

		tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
			SinkError::Config(format!(
				"failed to create csv directory {}: {e}",
				self.dir.display()
			))
		})?;

		info!(dir = %self.dir.display(), "csv gstash initialized");
		Ok(())
	}

	async fn write_data(
		&self,
		ctx: WriteContext,
		records: Arc<[AnalyticsRecord]>,
	) -> Result<(), SinkError> {
		if records.is_empty() {
			return Ok(());
		}

		let path = self.file_path(Utc::now());
		let mut guard = self.handle.lock().await;

		let needs_reopen = match &*guard {
			Some(handle) => handle.path != path,
			None => true,
		};

		if needs_reopen {
			let file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(&path)
				.await
				.map_err(|e| SinkError::Transient(format!("failed to open csv file: {e}")))?;
			*guard = Some(FileHandle {
				path: path.clone(),
				file,
			});
		}

		let handle = guard
			.as_mut()
			.ok_or_else(|| SinkError::Permanent("csv file handle not initialized".to_string()))?;

		let start_len = handle
			.file
			.metadata()
			.await
			.map_err(|e| SinkError::Transient(format!("failed to stat csv file: {e}")))?
			.len();

		let buffer = encode_batch(&records, start_len == 0)?;

		// Once started the append runs to completion, so the file only ever
		// holds whole rows.
		ctx.check()?;

		if let Err(e) = append(&mut handle.file, &buffer).await {
			if let Err(truncate_err) = handle.file.set_len(start_len).await {
				warn!(path = %path.display(), error = %truncate_err, "failed to roll back partial csv append");
			}
			*guard = None;
			return Err(e);
		}

		debug!(path = %path.display(), records = records.len(), "wrote csv records");
		Ok(())
	}

	fn common(&self) -> &CommonSinkConfig {
		&self.common
	}

	fn common_mut(&mut self) -> &mut CommonSinkConfig {
		&mut self.common
	}
}
