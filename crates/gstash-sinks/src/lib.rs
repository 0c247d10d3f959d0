// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Output destinations ("gstashs") for drained analytics records.
//!
//! Every sink implements [`Sink`]. The [`SinkRegistry`] maps configured type
//! names to uninitialized prototypes; the purger asks a prototype for a fresh
//! instance, initializes it with the sink's `meta` table and keeps it for the
//! life of the process.

pub mod common;
pub mod context;
pub mod error;
pub mod filter;
pub mod registry;
pub mod sink;

pub use common::CommonSinkConfig;
pub use context::WriteContext;
pub use error::{Result, SinkError};
pub use filter::filter_batch;
pub use registry::SinkRegistry;
pub use sink::{decode_meta, Sink};

pub use sink::dummy::DummySink;

#[cfg(feature = "sink-csv")]
pub use sink::csv::CsvSink;

#[cfg(feature = "sink-elasticsearch")]
pub use sink::elasticsearch::ElasticsearchSink;

#[cfg(feature = "sink-kafka")]
pub use sink::kafka::KafkaSink;

#[cfg(feature = "sink-prometheus")]
pub use sink::prometheus::PrometheusSink;

#[cfg(feature = "sink-syslog")]
pub use sink::syslog::SyslogSink;
