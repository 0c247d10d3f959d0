// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
	#[error("no sink registered under '{0}'")]
	NotFound(String),

	#[error("invalid sink configuration: {0}")]
	Config(String),

	/// Back-end unavailable or a write failed; a later cycle may succeed.
	#[error("transient sink error: {0}")]
	Transient(String),

	#[error("permanent sink error: {0}")]
	Permanent(String),

	#[error("write cancelled")]
	Cancelled,
}

pub type Result<T> = std::result::Result<T, SinkError>;
