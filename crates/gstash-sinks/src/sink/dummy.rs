// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use gstash_analytics::AnalyticsRecord;
use serde_json::Value;
use tracing::info;

use crate::common::CommonSinkConfig;
use crate::context::WriteContext;
use crate::error::SinkError;
use crate::sink::Sink;

/// Logs how many records it was handed. Useful to verify a deployment end to end.
#[derive(Debug, Default)]
pub struct DummySink {
	common: CommonSinkConfig,
}

#[async_trait]
impl Sink for DummySink {
	fn name(&self) -> &str {
		"dummy"
	}

	fn new_instance(&self) -> Box<dyn Sink> {
		Box::new(Self::default())
	}

	async fn init(&mut self, _meta: &Value) -> Result<(), SinkError> {
		info!("dummy gstash initialized");
		Ok(())
	}

	async fn write_data(
		&self,
		_ctx: WriteContext,
		records: Arc<[AnalyticsRecord]>,
	) -> Result<(), SinkError> {
		info!(records = records.len(), "dummy gstash received records");
		Ok(())
	}

	fn common(&self) -> &CommonSinkConfig {
		&self.common
	}

	fn common_mut(&mut self) -> &mut CommonSinkConfig {
		&mut self.common
	}
}
