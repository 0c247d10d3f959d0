// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `[gstashs.<name>]` tables: one entry per configured sink.

use std::collections::BTreeMap;

use gstash_analytics::AnalyticsFilters;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_CSV_DIR: &str = "./analytics-data";

const SECRET_KEY_MARKERS: [&str; 4] = ["password", "secret", "token", "api_key"];

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SinkConfig {
	/// Registry name of the implementation. Empty means "same as the table name".
	#[serde(rename = "type")]
	pub sink_type: String,
	pub filters: AnalyticsFilters,
	/// Hard per-write deadline in seconds. Zero disables it.
	pub timeout: u64,
	pub omit_detailed_recording: bool,
	/// Sink-specific settings, decoded by the sink itself.
	pub meta: Value,
}

impl SinkConfig {
	pub fn new(sink_type: impl Into<String>) -> Self {
		Self {
			sink_type: sink_type.into(),
			..Default::default()
		}
	}

	pub fn with_meta(mut self, meta: Value) -> Self {
		self.meta = meta;
		self
	}

	pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
		self.timeout = timeout_secs;
		self
	}

	/// Implementation name, falling back to the configured table name.
	pub fn type_name<'a>(&'a self, configured_name: &'a str) -> &'a str {
		if self.sink_type.is_empty() {
			configured_name
		} else {
			&self.sink_type
		}
	}

	/// `meta` with a `null` normalised to an empty object.
	pub fn meta(&self) -> Value {
		match &self.meta {
			Value::Null => Value::Object(Map::new()),
			other => other.clone(),
		}
	}
}

impl std::fmt::Debug for SinkConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SinkConfig")
			.field("sink_type", &self.sink_type)
			.field("filters", &self.filters)
			.field("timeout", &self.timeout)
			.field("omit_detailed_recording", &self.omit_detailed_recording)
			.field("meta", &redact_meta(&self.meta))
			.finish()
	}
}

fn redact_meta(value: &Value) -> Value {
	match value {
		Value::Object(map) => Value::Object(
			map.iter()
				.map(|(key, value)| {
					let lowered = key.to_ascii_lowercase();
					if SECRET_KEY_MARKERS.iter().any(|m| lowered.contains(m)) {
						(key.clone(), Value::from("[REDACTED]"))
					} else {
						(key.clone(), redact_meta(value))
					}
				})
				.collect(),
		),
		Value::Array(items) => Value::Array(items.iter().map(redact_meta).collect()),
		other => other.clone(),
	}
}

/// The sink set used when the configuration names none.
pub fn default_sinks() -> BTreeMap<String, SinkConfig> {
	let mut meta = Map::new();
	meta.insert("csv_dir".to_string(), Value::from(DEFAULT_CSV_DIR));

	let mut sinks = BTreeMap::new();
	sinks.insert(
		"csv".to_string(),
		SinkConfig::new("csv").with_meta(Value::Object(meta)),
	);
	sinks
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_type_name_falls_back_to_table_name() {
		let config = SinkConfig::default();
		assert_eq!(config.type_name("syslog"), "syslog");

		let config = SinkConfig::new("kafka");
		assert_eq!(config.type_name("audit-stream"), "kafka");
	}

	#[test]
	fn test_null_meta_is_empty_object() {
		assert_eq!(SinkConfig::default().meta(), json!({}));
	}

	#[test]
	fn test_debug_redacts_credentials() {
		let config = SinkConfig::new("elasticsearch").with_meta(json!({
			"elasticsearch_url": "http://es:9200",
			"auth_basic_password": "s3cret",
			"auth_api_key": "abc123",
			"nested": { "sasl_password": "p" },
		}));

		let debug = format!("{config:?}");
		assert!(debug.contains("http://es:9200"));
		assert!(!debug.contains("s3cret"));
		assert!(!debug.contains("abc123"));
		assert!(!debug.contains("\"p\""));
	}

	#[test]
	fn test_default_sinks_is_single_csv() {
		let sinks = default_sinks();
		assert_eq!(sinks.len(), 1);
		assert_eq!(sinks["csv"].meta()["csv_dir"], json!(DEFAULT_CSV_DIR));
	}

	#[test]
	fn test_parse_from_toml() {
		let config: SinkConfig = toml::from_str(
			r#"
			type = "syslog"
			timeout = 2
			omit-detailed-recording = true

			[filters]
			skip_usernames = ["svc-internal"]

			[meta]
			transport = "tcp"
			network_addr = "syslog:514"
			"#,
		)
		.unwrap();

		assert_eq!(config.sink_type, "syslog");
		assert_eq!(config.timeout, 2);
		assert!(config.omit_detailed_recording);
		assert!(config.filters.skip_usernames.contains("svc-internal"));
		assert_eq!(config.meta["transport"], json!("tcp"));
	}
}
