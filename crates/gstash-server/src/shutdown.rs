// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process termination signals.

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// SIGTERM and SIGINT, registered up front so a signal that arrives while the
/// purger is starting is not lost.
pub struct ShutdownSignal {
	#[cfg(unix)]
	terminate: Signal,
	#[cfg(unix)]
	interrupt: Signal,
}

impl ShutdownSignal {
	pub fn install() -> std::io::Result<Self> {
		#[cfg(unix)]
		{
			Ok(Self {
				terminate: signal(SignalKind::terminate())?,
				interrupt: signal(SignalKind::interrupt())?,
			})
		}

		#[cfg(not(unix))]
		{
			Ok(Self {})
		}
	}

	/// Resolves with the name of the first signal received.
	pub async fn recv(&mut self) -> &'static str {
		#[cfg(unix)]
		{
			tokio::select! {
				_ = self.terminate.recv() => "SIGTERM",
				_ = self.interrupt.recv() => "SIGINT",
			}
		}

		#[cfg(not(unix))]
		{
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "failed to listen for ctrl-c");
				std::future::pending::<()>().await;
			}
			"ctrl-c"
		}
	}
}
