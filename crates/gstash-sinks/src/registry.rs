// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use crate::error::SinkError;
use crate::sink::dummy::DummySink;
use crate::sink::Sink;

/// Type name → uninitialized prototype.
///
/// Built once at startup and handed to the purger. Prototypes are only ever
/// asked for fresh instances, never written to.
#[derive(Default)]
pub struct SinkRegistry {
	prototypes: BTreeMap<String, Box<dyn Sink>>,
}

impl SinkRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every sink compiled into this build.
	pub fn builtin() -> Self {
		let mut registry = Self::new();
		registry.register(Box::new(DummySink::default()));

		#[cfg(feature = "sink-csv")]
		registry.register(Box::new(crate::sink::csv::CsvSink::default()));

		#[cfg(feature = "sink-elasticsearch")]
		registry.register(Box::new(crate::sink::elasticsearch::ElasticsearchSink::default()));

		#[cfg(feature = "sink-kafka")]
		registry.register(Box::new(crate::sink::kafka::KafkaSink::default()));

		#[cfg(feature = "sink-prometheus")]
		registry.register(Box::new(crate::sink::prometheus::PrometheusSink::default()));

		#[cfg(feature = "sink-syslog")]
		registry.register(Box::new(crate::sink::syslog::SyslogSink::default()));

		registry
	}

	/// Registers `prototype` under its own name, replacing any previous entry.
	pub fn register(&mut self, prototype: Box<dyn Sink>) {
		self.prototypes
			.insert(prototype.name().to_string(), prototype);
	}

	pub fn get_by_name(&self, name: &str) -> Result<&dyn Sink, SinkError> {
		self.prototypes
			.get(name)
			.map(|prototype| prototype.as_ref())
			.ok_or_else(|| SinkError::NotFound(name.to_string()))
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.prototypes.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.prototypes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.prototypes.is_empty()
	}
}
