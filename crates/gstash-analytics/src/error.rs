// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
	#[error("failed to decode analytics record: {0}")]
	Decode(#[from] rmp_serde::decode::Error),

	#[error("failed to encode analytics record: {0}")]
	Encode(#[from] rmp_serde::encode::Error),

	#[error("invalid analytics record: {0}")]
	InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
