// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![cfg(feature = "sink-prometheus")]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use gstash_analytics::AnalyticsRecord;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::common::CommonSinkConfig;
use crate::context::WriteContext;
use crate::error::SinkError;
use crate::sink::{decode_meta, Sink};

pub const STATUS_METRIC_NAME: &str = "iam_user_authorization_status_total";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PrometheusMeta {
	listen_address: Option<String>,
	#[serde(default = "default_path")]
	path: String,
}

fn default_path() -> String {
	"/metrics".to_string()
}

/// Counts authorization decisions per user and exposes them for scraping.
///
/// Each instance owns its registry and listener, so two prometheus sinks in
/// one process do not collide.
pub struct PrometheusSink {
	common: CommonSinkConfig,
	registry: Registry,
	status_total: Option<IntCounterVec>,
	local_addr: Option<SocketAddr>,
}

impl Default for PrometheusSink {
	fn default() -> Self {
		Self {
			common: CommonSinkConfig::default(),
			registry: Registry::new(),
			status_total: None,
			local_addr: None,
		}
	}
}

impl PrometheusSink {
	/// Address the exposition listener is bound to, once initialized.
	pub fn local_addr(&self) -> Option<SocketAddr> {
		self.local_addr
	}

	pub fn encode(&self) -> Result<String, SinkError> {
		encode_registry(&self.registry)
	}
}

/// `0` for allowed requests, `1` for everything else.
pub fn status_code(record: &AnalyticsRecord) -> &'static str {
	if record.is_allowed() {
		"0"
	} else {
		"1"
	}
}

fn encode_registry(registry: &Registry) -> Result<String, SinkError> {
	let encoder = TextEncoder::new();
	let mut buffer = Vec::new();
	encoder
		.encode(&registry.gather(), &mut buffer)
		.map_err(|e| SinkError::Permanent(format!("failed to encode metrics: {e}")))?;
	String::from_utf8(buffer)
		.map_err(|e| SinkError::Permanent(format!("metrics are not valid utf-8: {e}")))
}

async fn metrics_handler(State(registry): State<Registry>) -> impl IntoResponse {
	match encode_registry(&registry) {
		Ok(body) => (
			StatusCode::OK,
			[(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
			body,
		)
			.into_response(),
		Err(e) => {
			error!(error = %e, "failed to render metrics");
			StatusCode::INTERNAL_SERVER_ERROR.into_response()
		}
	}
}

#[async_trait]
impl Sink for PrometheusSink {
	fn name(&self) -> &str {
		"prometheus"
	}

	fn new_instance(&self) -> Box<dyn Sink> {
		Box::new(Self::default())
	}

	async fn init(&mut self, meta: &Value) -> Result<(), SinkError> {
		let meta: PrometheusMeta = decode_meta(meta)?;
		let listen_address = meta
			.listen_address
			.filter(|addr| !addr.is_empty())
			.ok_or_else(|| SinkError::Config("prometheus listen_address not set".to_string()))?;
		let path = format!("/{}", meta.path.trim_start_matches('/'));

		let status_total = IntCounterVec::new(
			Opts::new(STATUS_METRIC_NAME, "authorization effect per user"),
			&["code", "username"],
		)
		.map_err(|e| SinkError::Config(format!("failed to create counter: {e}")))?;
		self.registry
			.register(Box::new(status_total.clone()))
			.map_err(|e| SinkError::Config(format!("failed to register counter: {e}")))?;

		let listener = TcpListener::bind(&listen_address).await.map_err(|e| {
			SinkError::Config(format!("failed to bind {listen_address}: {e}"))
		})?;
		let local_addr = listener
			.local_addr()
			.map_err(|e| SinkError::Config(format!("failed to read listener address: {e}")))?;

		let app = Router::new()
			.route(&path, get(metrics_handler))
			.with_state(self.registry.clone());

		tokio::spawn(async move {
			if let Err(e) = axum::serve(listener, app).await {
				error!(error = %e, "prometheus listener stopped");
			}
		});

		info!(address = %local_addr, path = %path, "prometheus gstash listening");
		self.status_total = Some(status_total);
		self.local_addr = Some(local_addr);
		Ok(())
	}

	async fn write_data(
		&self,
		_ctx: WriteContext,
		records: Arc<[AnalyticsRecord]>,
	) -> Result<(), SinkError> {
		let status_total = self
			.status_total
			.as_ref()
			.ok_or_else(|| SinkError::Permanent("prometheus gstash not initialized".to_string()))?;

		debug!(records = records.len(), "updating prometheus counters");
		for record in records.iter() {
			status_total
				.with_label_values(&[status_code(record), record.username.as_str()])
				.inc();
		}

		Ok(())
	}

	fn common(&self) -> &CommonSinkConfig {
		&self.common
	}

	fn common_mut(&mut self) -> &mut CommonSinkConfig {
		&mut self.common
	}
}
