// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![cfg(feature = "sink-kafka")]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gstash_analytics::AnalyticsRecord;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::{ClientBuilder, Credentials, SaslConfig};
use rskafka::record::Record;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::ClientConfig as TlsClientConfig;
use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::common::CommonSinkConfig;
use crate::context::WriteContext;
use crate::error::SinkError;
use crate::sink::{decode_meta, Sink};

const DEFAULT_CLIENT_ID: &str = "gstash";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct KafkaMeta {
	#[serde(default)]
	broker: Vec<String>,
	#[serde(default)]
	client_id: Option<String>,
	#[serde(default)]
	topic: String,
	#[serde(default)]
	partition: i32,
	/// Seconds allowed for connecting plus producing one batch.
	#[serde(default)]
	timeout: u64,
	#[serde(default)]
	meta_data: Map<String, Value>,
	#[serde(default)]
	compressed: bool,
	#[serde(default)]
	use_ssl: bool,
	#[serde(default)]
	ssl_insecure_skip_verify: bool,
	#[serde(default)]
	ssl_cert_file: String,
	#[serde(default)]
	ssl_key_file: String,
	#[serde(default)]
	sasl_mechanism: Option<String>,
	/// SCRAM hash, `sha-256` unless `sha-512` is asked for.
	#[serde(default)]
	sasl_algorithm: String,
	#[serde(default)]
	sasl_username: String,
	#[serde(default)]
	sasl_password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaslMechanism {
	Plain,
	ScramSha256,
	ScramSha512,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SaslSettings {
	mechanism: SaslMechanism,
	username: String,
	password: String,
}

impl SaslSettings {
	fn to_config(&self) -> SaslConfig {
		let credentials = Credentials::new(self.username.clone(), self.password.clone());
		match self.mechanism {
			SaslMechanism::Plain => SaslConfig::Plain(credentials),
			SaslMechanism::ScramSha256 => SaslConfig::ScramSha256(credentials),
			SaslMechanism::ScramSha512 => SaslConfig::ScramSha512(credentials),
		}
	}
}

struct Settings {
	brokers: Vec<String>,
	client_id: String,
	topic: String,
	partition: i32,
	timeout: Duration,
	meta_data: Map<String, Value>,
	compression: Compression,
	tls: Option<Arc<TlsClientConfig>>,
	sasl: Option<SaslSettings>,
}

/// Publishes one JSON message per record to a single topic partition.
#[derive(Default)]
pub struct KafkaSink {
	common: CommonSinkConfig,
	settings: Option<Settings>,
	client: Mutex<Option<Arc<PartitionClient>>>,
}

/// The JSON payload for one record, with `meta_data` entries layered on top.
pub fn build_message(record: &AnalyticsRecord, meta_data: &Map<String, Value>) -> Map<String, Value> {
	let mut message = record.to_message();
	for (key, value) in meta_data {
		message.insert(key.clone(), value.clone());
	}
	message
}

impl Settings {
	fn from_meta(meta: KafkaMeta) -> Result<Self, SinkError> {
		let brokers: Vec<String> = meta
			.broker
			.into_iter()
			.map(|b| b.trim().to_string())
			.filter(|b| !b.is_empty())
			.collect();
		if brokers.is_empty() {
			return Err(SinkError::Config("kafka gstash requires at least one broker".to_string()));
		}
		if meta.topic.is_empty() {
			return Err(SinkError::Config("kafka gstash requires a topic".to_string()));
		}

		let tls = if meta.use_ssl {
			Some(Arc::new(tls_config(
				&meta.ssl_cert_file,
				&meta.ssl_key_file,
				meta.ssl_insecure_skip_verify,
			)?))
		} else {
			None
		};

		let mechanism = match meta.sasl_mechanism.as_deref().map(str::to_ascii_lowercase) {
			None => None,
			Some(mechanism) if mechanism.is_empty() => None,
			Some(mechanism) if mechanism == "plain" => Some(SaslMechanism::Plain),
			Some(mechanism) if mechanism == "scram" => {
				if meta.sasl_algorithm.eq_ignore_ascii_case("sha-512") {
					Some(SaslMechanism::ScramSha512)
				} else {
					Some(SaslMechanism::ScramSha256)
				}
			}
			Some(other) => {
				return Err(SinkError::Config(format!(
					"unsupported sasl_mechanism '{other}', expected 'plain' or 'scram'"
				)))
			}
		};

		match mechanism {
			Some(SaslMechanism::Plain) if tls.is_none() => {
				return Err(SinkError::Config(
					"sasl_mechanism 'plain' sends the password in clear text and requires use_ssl".to_string(),
				));
			}
			Some(_) if tls.is_none() => {
				warn!("sasl_mechanism is set but use_ssl is false");
			}
			_ => {}
		}

		let sasl = mechanism.map(|mechanism| SaslSettings {
			mechanism,
			username: meta.sasl_username,
			password: meta.sasl_password,
		});

		Ok(Self {
			brokers,
			client_id: meta
				.client_id
				.filter(|id| !id.is_empty())
				.unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
			topic: meta.topic,
			partition: meta.partition,
			timeout: Duration::from_secs(match meta.timeout {
				0 => DEFAULT_TIMEOUT_SECS,
				n => n,
			}),
			meta_data: meta.meta_data,
			compression: if meta.compressed {
				Compression::Snappy
			} else {
				Compression::NoCompression
			},
			tls,
			sasl,
		})
	}
}

fn tls_provider() -> Arc<CryptoProvider> {
	Arc::new(rustls::crypto::ring::default_provider())
}

/// Client TLS settings: webpki roots, an optional client certificate for
/// mTLS, and optionally no server verification at all.
fn tls_config(cert_file: &str, key_file: &str, insecure_skip_verify: bool) -> Result<TlsClientConfig, SinkError> {
	let provider = tls_provider();
	let builder = TlsClientConfig::builder_with_provider(Arc::clone(&provider))
		.with_safe_default_protocol_versions()
		.map_err(|e| SinkError::Config(format!("kafka TLS setup failed: {e}")))?;

	let builder = if insecure_skip_verify {
		warn!("kafka server certificate verification is disabled");
		builder
			.dangerous()
			.with_custom_certificate_verifier(Arc::new(SkipServerVerification {
				algorithms: provider.signature_verification_algorithms,
			}))
	} else {
		let root_store = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
		builder.with_root_certificates(root_store)
	};

	match (cert_file.is_empty(), key_file.is_empty()) {
		(true, true) => Ok(builder.with_no_client_auth()),
		(false, false) => {
			debug!(cert = %cert_file, "loading kafka mTLS certificate");
			let (certs, key) = load_client_identity(Path::new(cert_file), Path::new(key_file))?;
			builder
				.with_client_auth_cert(certs, key)
				.map_err(|e| SinkError::Config(format!("invalid kafka mTLS certificate: {e}")))
		}
		_ => Err(SinkError::Config(
			"ssl_cert_file and ssl_key_file must both be set to enable mTLS".to_string(),
		)),
	}
}

fn load_client_identity(
	cert_file: &Path,
	key_file: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), SinkError> {
	let certs = CertificateDer::pem_file_iter(cert_file)
		.and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
		.map_err(|e| SinkError::Config(format!("failed to read {}: {e}", cert_file.display())))?;
	if certs.is_empty() {
		return Err(SinkError::Config(format!(
			"no certificate found in {}",
			cert_file.display()
		)));
	}
	let key = PrivateKeyDer::from_pem_file(key_file)
		.map_err(|e| SinkError::Config(format!("failed to read {}: {e}", key_file.display())))?;
	Ok((certs, key))
}

/// Accepts any server certificate. Handshake signatures are still checked.
#[derive(Debug)]
struct SkipServerVerification {
	algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for SkipServerVerification {
	fn verify_server_cert(
		&self,
		_end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_server_name: &ServerName<'_>,
		_ocsp_response: &[u8],
		_now: UnixTime,
	) -> Result<ServerCertVerified, rustls::Error> {
		Ok(ServerCertVerified::assertion())
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
	}

	fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
		self.algorithms.supported_schemes()
	}
}

impl KafkaSink {
	async fn partition_client(&self, settings: &Settings) -> Result<Arc<PartitionClient>, SinkError> {
		let mut guard = self.client.lock().await;
		if let Some(client) = guard.as_ref() {
			return Ok(Arc::clone(client));
		}

		let mut builder = ClientBuilder::new(settings.brokers.clone()).client_id(settings.client_id.clone());
		if let Some(tls) = &settings.tls {
			builder = builder.tls_config(Arc::clone(tls));
		}
		if let Some(sasl) = &settings.sasl {
			builder = builder.sasl_config(sasl.to_config());
		}

		let client = builder
			.build()
			.await
			.map_err(|e| SinkError::Transient(format!("kafka connect failed: {e}")))?;
		let partition = client
			.partition_client(settings.topic.clone(), settings.partition, UnknownTopicHandling::Retry)
			.await
			.map_err(|e| SinkError::Transient(format!("kafka partition client failed: {e}")))?;

		debug!(topic = %settings.topic, partition = settings.partition, "kafka client connected");
		let partition = Arc::new(partition);
		*guard = Some(Arc::clone(&partition));
		Ok(partition)
	}

	async fn produce(&self, settings: &Settings, batch: Vec<Record>) -> Result<(), SinkError> {
		let client = self.partition_client(settings).await?;
		if let Err(e) = client.produce(batch, settings.compression).await {
			// Drop the cached client so the next cycle reconnects.
			*self.client.lock().await = None;
			return Err(SinkError::Transient(format!("kafka produce failed: {e}")));
		}
		Ok(())
	}
}

#[async_trait]
impl Sink for KafkaSink {
	fn name(&self) -> &str {
		"kafka"
	}

	fn new_instance(&self) -> Box<dyn Sink> {
		Box::new(Self::default())
	}

	async fn init(&mut self, meta: &Value) -> Result<(), SinkError> {
		let settings = Settings::from_meta(decode_meta(meta)?)?;
		info!(
			brokers = ?settings.brokers,
			topic = %settings.topic,
			tls = settings.tls.is_some(),
			"kafka gstash configured"
		);
		self.settings = Some(settings);
		Ok(())
	}

	async fn write_data(
		&self,
		ctx: WriteContext,
		records: Arc<[AnalyticsRecord]>,
	) -> Result<(), SinkError> {
		let settings = self
			.settings
			.as_ref()
			.ok_or_else(|| SinkError::Permanent("kafka gstash not initialized".to_string()))?;

		if records.is_empty() {
			return Ok(());
		}

		let now = Utc::now();
		let mut batch = Vec::with_capacity(records.len());
		for record in records.iter() {
			let value = serde_json::to_vec(&build_message(record, &settings.meta_data))
				.map_err(|e| SinkError::Permanent(format!("JSON serialization failed: {e}")))?;
			batch.push(Record {
				key: None,
				value: Some(value),
				headers: BTreeMap::new(),
				timestamp: now,
			});
		}

		info!(records = batch.len(), topic = %settings.topic, "writing records to kafka");
		ctx.check()?;
		ctx.run(async {
			tokio::time::timeout(settings.timeout, self.produce(settings, batch))
				.await
				.map_err(|_| SinkError::Transient("kafka write timed out".to_string()))?
		})
		.await
	}

	fn common(&self) -> &CommonSinkConfig {
		&self.common
	}

	fn common_mut(&mut self) -> &mut CommonSinkConfig {
		&mut self.common
	}
}
