// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Queue key the authorization service pushes encoded records onto.
pub const ANALYTICS_KEY_NAME: &str = "iam-system-analytics";

pub const EFFECT_ALLOW: &str = "allow";
pub const EFFECT_DENY: &str = "deny";

/// One authorization decision.
///
/// `policies` and `deciders` may be blanked by [`AnalyticsRecord::redact`] but
/// are never removed, so every downstream schema keeps the same columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
	/// Seconds since the Unix epoch.
	pub timestamp: i64,
	pub username: String,
	pub effect: String,
	#[serde(default)]
	pub conclusion: String,
	#[serde(default)]
	pub request: String,
	#[serde(default)]
	pub policies: String,
	#[serde(default)]
	pub deciders: String,
	#[serde(rename = "expireAt", default)]
	pub expire_at: DateTime<Utc>,
}

impl AnalyticsRecord {
	/// CSV header, in the order produced by [`AnalyticsRecord::line_values`].
	pub const FIELD_NAMES: [&'static str; 8] = [
		"timestamp",
		"username",
		"effect",
		"conclusion",
		"request",
		"policies",
		"deciders",
		"expireAt",
	];

	pub fn builder(username: impl Into<String>) -> AnalyticsRecordBuilder {
		AnalyticsRecordBuilder::new(username)
	}

	pub fn is_allowed(&self) -> bool {
		self.effect == EFFECT_ALLOW
	}

	/// Blanks the detailed decision trace.
	pub fn redact(&mut self) {
		self.policies.clear();
		self.deciders.clear();
	}

	pub fn redacted(&self) -> Self {
		let mut record = self.clone();
		record.redact();
		record
	}

	pub fn line_values(&self) -> Vec<String> {
		vec![
			self.timestamp.to_string(),
			self.username.clone(),
			self.effect.clone(),
			self.conclusion.clone(),
			self.request.clone(),
			self.policies.clone(),
			self.deciders.clone(),
			self.expire_at.to_rfc3339(),
		]
	}

	/// JSON object form used by message-oriented sinks.
	pub fn to_message(&self) -> Map<String, Value> {
		let mut message = Map::new();
		message.insert("timestamp".into(), Value::from(self.timestamp));
		message.insert("username".into(), Value::from(self.username.as_str()));
		message.insert("effect".into(), Value::from(self.effect.as_str()));
		message.insert("conclusion".into(), Value::from(self.conclusion.as_str()));
		message.insert("request".into(), Value::from(self.request.as_str()));
		message.insert("policies".into(), Value::from(self.policies.as_str()));
		message.insert("deciders".into(), Value::from(self.deciders.as_str()));
		message.insert("expireAt".into(), Value::from(self.expire_at.to_rfc3339()));
		message
	}

	pub fn event_time(&self) -> DateTime<Utc> {
		DateTime::from_timestamp(self.timestamp, 0).unwrap_or_default()
	}
}

pub struct AnalyticsRecordBuilder {
	record: AnalyticsRecord,
}

impl AnalyticsRecordBuilder {
	pub fn new(username: impl Into<String>) -> Self {
		let now = Utc::now();
		Self {
			record: AnalyticsRecord {
				timestamp: now.timestamp(),
				username: username.into(),
				effect: EFFECT_ALLOW.to_string(),
				conclusion: String::new(),
				request: String::new(),
				policies: String::new(),
				deciders: String::new(),
				expire_at: now + chrono::Duration::days(7),
			},
		}
	}

	pub fn timestamp(mut self, timestamp: i64) -> Self {
		self.record.timestamp = timestamp;
		self
	}

	pub fn effect(mut self, effect: impl Into<String>) -> Self {
		self.record.effect = effect.into();
		self
	}

	pub fn deny(self) -> Self {
		self.effect(EFFECT_DENY)
	}

	pub fn conclusion(mut self, conclusion: impl Into<String>) -> Self {
		self.record.conclusion = conclusion.into();
		self
	}

	pub fn request(mut self, request: impl Into<String>) -> Self {
		self.record.request = request.into();
		self
	}

	pub fn policies(mut self, policies: impl Into<String>) -> Self {
		self.record.policies = policies.into();
		self
	}

	pub fn deciders(mut self, deciders: impl Into<String>) -> Self {
		self.record.deciders = deciders.into();
		self
	}

	pub fn expire_at(mut self, expire_at: DateTime<Utc>) -> Self {
		self.record.expire_at = expire_at;
		self
	}

	pub fn build(self) -> AnalyticsRecord {
		self.record
	}
}
