// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SinkError;

/// Cancellation scope of one sink write.
///
/// The purger cancels `token` on shutdown or when the write outlives the sink's
/// timeout. Sinks are expected to observe it between units of work; nothing
/// can stop a write that never looks.
#[derive(Debug, Clone)]
pub struct WriteContext {
	token: CancellationToken,
	deadline: Option<Instant>,
}

impl WriteContext {
	pub fn new(token: CancellationToken, deadline: Option<Instant>) -> Self {
		Self { token, deadline }
	}

	/// A context that is never cancelled.
	pub fn background() -> Self {
		Self::new(CancellationToken::new(), None)
	}

	pub fn with_timeout(token: CancellationToken, timeout: Option<Duration>) -> Self {
		Self::new(token, timeout.map(|t| Instant::now() + t))
	}

	pub fn token(&self) -> &CancellationToken {
		&self.token
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	pub fn is_done(&self) -> bool {
		self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
	}

	/// `Err(Cancelled)` once the context is done.
	pub fn check(&self) -> Result<(), SinkError> {
		if self.is_done() {
			Err(SinkError::Cancelled)
		} else {
			Ok(())
		}
	}

	/// Resolves when the token is cancelled or the deadline passes.
	pub async fn done(&self) {
		match self.deadline {
			Some(deadline) => {
				tokio::select! {
					_ = self.token.cancelled() => {}
					_ = tokio::time::sleep_until(deadline) => {}
				}
			}
			None => self.token.cancelled().await,
		}
	}

	/// Runs `fut`, giving up with `Cancelled` when the context finishes first.
	pub async fn run<F, T>(&self, fut: F) -> Result<T, SinkError>
	where
		F: Future<Output = Result<T, SinkError>>,
	{
		tokio::select! {
			biased;
			_ = self.done() => Err(SinkError::Cancelled),
			result = fut => result,
		}
	}
}
