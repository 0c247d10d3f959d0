// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![cfg(feature = "sink-syslog")]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use gstash_analytics::AnalyticsRecord;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::common::CommonSinkConfig;
use crate::context::WriteContext;
use crate::error::SinkError;
use crate::sink::{decode_meta, Sink};

pub const DEFAULT_TAG: &str = "syslog-gstash";
pub const DEFAULT_NETWORK_ADDR: &str = "localhost:5140";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyslogTransport {
	#[default]
	Udp,
	Tcp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct SyslogMeta {
	#[serde(default)]
	transport: SyslogTransport,
	#[serde(default = "default_network_addr")]
	network_addr: String,
	/// Raw syslog priority (facility * 8 + severity).
	#[serde(default)]
	log_level: u8,
	#[serde(default = "default_tag")]
	tag: String,
}

fn default_network_addr() -> String {
	DEFAULT_NETWORK_ADDR.to_string()
}

fn default_tag() -> String {
	DEFAULT_TAG.to_string()
}

struct Connection {
	transport: SyslogTransport,
	target_addr: SocketAddr,
	priority: u8,
	tag: String,
	hostname: String,
	udp_socket: Option<UdpSocket>,
	stream: Mutex<Option<TcpStream>>,
}

/// One syslog line per record, the record itself as a JSON object.
#[derive(Default)]
pub struct SyslogSink {
	common: CommonSinkConfig,
	connection: Option<Connection>,
}

impl Connection {
	async fn send(&self, message: &[u8]) -> Result<(), SinkError> {
		match self.transport {
			SyslogTransport::Udp => self.send_udp(message).await,
			SyslogTransport::Tcp => self.send_tcp(message).await,
		}
	}

	async fn send_udp(&self, message: &[u8]) -> Result<(), SinkError> {
		let socket = self
			.udp_socket
			.as_ref()
			.ok_or_else(|| SinkError::Permanent("UDP socket not initialized".to_string()))?;

		socket
			.send_to(message, self.target_addr)
			.await
			.map_err(|e| SinkError::Transient(format!("failed to send UDP message: {e}")))?;

		Ok(())
	}

	async fn send_tcp(&self, message: &[u8]) -> Result<(), SinkError> {
		let framed_message = frame_message(message)?;
		let mut stream_guard = self.stream.lock().await;

		// Out of the slot while writing: a write abandoned halfway drops the
		// connection instead of leaving a truncated frame on it.
		let mut stream = match stream_guard.take() {
			Some(stream) => stream,
			None => TcpStream::connect(self.target_addr)
				.await
				.map_err(|e| SinkError::Transient(format!("TCP connect failed: {e}")))?,
		};

		if let Err(e) = stream.write_all(&framed_message).await {
			return Err(SinkError::Transient(format!(
				"TCP write failed (will reconnect): {e}"
			)));
		}

		*stream_guard = Some(stream);
		Ok(())
	}
}

/// Octet-counting frame for stream transports.
fn frame_message(message: &[u8]) -> Result<Vec<u8>, SinkError> {
	let mut framed_message = Vec::with_capacity(message.len() + 10);
	write!(&mut framed_message, "{} ", message.len())
		.map_err(|e| SinkError::Transient(format!("framing error: {e}")))?;
	framed_message.extend_from_slice(message);
	Ok(framed_message)
}

/// `<PRI>TIMESTAMP HOST TAG[PID]: {json}`
pub fn format_line(
	record: &AnalyticsRecord,
	priority: u8,
	hostname: &str,
	tag: &str,
) -> Result<String, SinkError> {
	let message = serde_json::to_string(&record.to_message())
		.map_err(|e| SinkError::Permanent(format!("JSON serialization failed: {e}")))?;

	Ok(format!(
		"<{priority}>{} {hostname} {tag}[{}]: {message}\n",
		Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
		std::process::id(),
	))
}

async fn resolve(addr: &str) -> Result<SocketAddr, SinkError> {
	tokio::net::lookup_host(addr)
		.await
		.map_err(|e| SinkError::Config(format!("failed to resolve syslog address {addr}: {e}")))?
		.next()
		.ok_or_else(|| SinkError::Config(format!("syslog address {addr} resolved to nothing")))
}

#[async_trait]
impl Sink for SyslogSink {
	fn name(&self) -> &str {
		"syslog"
	}

	fn new_instance(&self) -> Box<dyn Sink> {
		Box::new(Self::default())
	}

	async fn init(&mut self, meta: &Value) -> Result<(), SinkError> {
		let meta: SyslogMeta = decode_meta(meta)?;
		if meta.log_level == 0 {
			warn!("using priority 0 (kern.emerg) for syslog gstash");
		}

		let target_addr = resolve(&meta.network_addr).await?;

		let udp_socket = if meta.transport == SyslogTransport::Udp {
			let bind_addr = if target_addr.is_ipv4() {
				"0.0.0.0:0"
			} else {
				"[::]:0"
			};
			let socket = UdpSocket::bind(bind_addr)
				.await
				.map_err(|e| SinkError::Transient(format!("failed to bind UDP socket: {e}")))?;
			Some(socket)
		} else {
			None
		};

		let hostname = hostname::get()
			.ok()
			.and_then(|h| h.into_string().ok())
			.unwrap_or_else(|| "localhost".to_string());

		info!(
			transport = ?meta.transport,
			address = %target_addr,
			tag = %meta.tag,
			"syslog gstash initialized"
		);

		self.connection = Some(Connection {
			transport: meta.transport,
			target_addr,
			priority: meta.log_level,
			tag: meta.tag,
			hostname,
			udp_socket,
			stream: Mutex::new(None),
		});
		Ok(())
	}

	async fn write_data(
		&self,
		ctx: WriteContext,
		records: Arc<[AnalyticsRecord]>,
	) -> Result<(), SinkError> {
		let connection = self
			.connection
			.as_ref()
			.ok_or_else(|| SinkError::Permanent("syslog gstash not initialized".to_string()))?;

		for record in records.iter() {
			ctx.check()?;
			let line = format_line(record, connection.priority, &connection.hostname, &connection.tag)?;
			ctx.run(connection.send(line.as_bytes())).await?;
		}

		debug!(records = records.len(), "wrote syslog records");
		Ok(())
	}

	fn common(&self) -> &CommonSinkConfig {
		&self.common
	}

	fn common_mut(&mut self) -> &mut CommonSinkConfig {
		&mut self.common
	}
}
