// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization analytics records as they travel from the shared queue to
//! the gstash sinks.
//!
//! This crate owns the record model, the per-sink username filters and the
//! queue wire codec. It has no I/O of its own.

pub mod codec;
pub mod error;
pub mod filter;
pub mod record;

pub use codec::{decode_record, encode_record};
pub use error::{CodecError, Result};
pub use filter::AnalyticsFilters;
pub use record::{AnalyticsRecord, AnalyticsRecordBuilder, ANALYTICS_KEY_NAME, EFFECT_ALLOW, EFFECT_DENY};
