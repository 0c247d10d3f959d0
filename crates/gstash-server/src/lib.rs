// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The analytics purger: a lock-coordinated tick loop that drains the shared
//! analytics queue and hands every batch to the configured gstashs.

mod fanout;
pub mod health;
pub mod scheduler;
pub mod shutdown;
pub mod types;

pub use health::{health_router, serve_health};
pub use scheduler::{PurgeOptions, PurgeScheduler};
pub use shutdown::ShutdownSignal;
pub use types::{PurgeOutcome, SinkWriteOutcome, SinkWriteReport};
