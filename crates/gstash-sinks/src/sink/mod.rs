// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use gstash_analytics::{AnalyticsFilters, AnalyticsRecord};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::common::CommonSinkConfig;
use crate::context::WriteContext;
use crate::error::SinkError;

pub mod dummy;

#[cfg(feature = "sink-csv")]
pub mod csv;

#[cfg(feature = "sink-elasticsearch")]
pub mod elasticsearch;

#[cfg(feature = "sink-kafka")]
pub mod kafka;

#[cfg(feature = "sink-prometheus")]
pub mod prometheus;

#[cfg(feature = "sink-syslog")]
pub mod syslog;

/// A named output destination for analytics records.
///
/// Lifecycle: a registry prototype hands out a fresh instance via
/// [`Sink::new_instance`], which is initialized once with [`Sink::init`] and
/// then written to on every purge cycle. Instances are never torn down.
#[async_trait]
pub trait Sink: Send + Sync {
	/// Stable identity used in logs and registry lookups.
	fn name(&self) -> &str;

	/// An uninitialized instance of the same kind.
	fn new_instance(&self) -> Box<dyn Sink>;

	/// Decodes the sink-specific `meta` table and sets up long-lived resources.
	async fn init(&mut self, meta: &Value) -> Result<(), SinkError>;

	/// Delivers one already filtered batch.
	///
	/// Must return promptly once `ctx` is done. Errors are logged by the caller
	/// and never retried.
	async fn write_data(
		&self,
		ctx: WriteContext,
		records: Arc<[AnalyticsRecord]>,
	) -> Result<(), SinkError>;

	fn common(&self) -> &CommonSinkConfig;

	fn common_mut(&mut self) -> &mut CommonSinkConfig;

	fn filters(&self) -> &AnalyticsFilters {
		&self.common().filters
	}

	fn set_filters(&mut self, filters: AnalyticsFilters) {
		self.common_mut().filters = filters;
	}

	fn timeout(&self) -> u64 {
		self.common().timeout
	}

	fn set_timeout(&mut self, timeout_secs: u64) {
		self.common_mut().timeout = timeout_secs;
	}

	fn omit_detailed_recording(&self) -> bool {
		self.common().omit_detailed_recording
	}

	fn set_omit_detailed_recording(&mut self, omit: bool) {
		self.common_mut().omit_detailed_recording = omit;
	}
}

/// Decodes a sink's `meta` table into its typed settings. `null` reads as `{}`.
pub fn decode_meta<T: DeserializeOwned>(meta: &Value) -> Result<T, SinkError> {
	let meta = match meta {
		Value::Null => Value::Object(Map::new()),
		other => other.clone(),
	};

	serde_json::from_value(meta).map_err(|e| SinkError::Config(e.to_string()))
}
