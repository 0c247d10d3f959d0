// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub fn format_version_info() -> String {
	let registry = gstash_sinks::SinkRegistry::builtin();
	let sinks: Vec<&str> = registry.names().collect();
	format!(
		"gstash version: {}\n\
		 Platform:       {}-{}\n\
		 Gstashs:        {}",
		env!("CARGO_PKG_VERSION"),
		std::env::consts::OS,
		std::env::consts::ARCH,
		sinks.join(", "),
	)
}
