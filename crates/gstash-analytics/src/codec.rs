// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Queue wire format.
//!
//! Producers push MessagePack maps keyed by the JSON field names of
//! [`AnalyticsRecord`]. Unknown keys are ignored so producers can add fields
//! ahead of consumers.

use crate::error::{CodecError, Result};
use crate::record::AnalyticsRecord;

pub fn decode_record(raw: &[u8]) -> Result<AnalyticsRecord> {
	let record: AnalyticsRecord = rmp_serde::from_slice(raw)?;

	if record.username.is_empty() {
		return Err(CodecError::InvalidRecord("username is empty".to_string()));
	}

	Ok(record)
}

pub fn encode_record(record: &AnalyticsRecord) -> Result<Vec<u8>> {
	Ok(rmp_serde::to_vec_named(record)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde::Serialize;

	#[test]
	fn test_decode_producer_payload() {
		let record = AnalyticsRecord::builder("alice")
			.timestamp(1_700_000_000)
			.policies("[]")
			.build();
		let raw = encode_record(&record).unwrap();

		assert_eq!(decode_record(&raw).unwrap(), record);
	}

	#[test]
	fn test_decode_garbage_fails() {
		let err = decode_record(b"\xc1not msgpack").unwrap_err();
		assert!(matches!(err, CodecError::Decode(_)));
	}

	#[test]
	fn test_decode_rejects_empty_username() {
		let record = AnalyticsRecord::builder("").build();
		let raw = encode_record(&record).unwrap();

		assert!(matches!(
			decode_record(&raw),
			Err(CodecError::InvalidRecord(_))
		));
	}

	#[derive(Serialize)]
	struct SparseRecord<'a> {
		timestamp: i64,
		username: &'a str,
		effect: &'a str,
		extra: u32,
	}

	#[test]
	fn test_decode_tolerates_missing_detail_and_unknown_keys() {
		let raw = rmp_serde::to_vec_named(&SparseRecord {
			timestamp: 42,
			username: "bob",
			effect: "deny",
			extra: 7,
		})
		.unwrap();

		let record = decode_record(&raw).unwrap();
		assert_eq!(record.timestamp, 42);
		assert_eq!(record.username, "bob");
		assert!(!record.is_allowed());
		assert!(record.policies.is_empty());
		assert!(record.deciders.is_empty());
	}
}
