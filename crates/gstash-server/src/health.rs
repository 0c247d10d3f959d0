// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn health_router(route: &str) -> Router {
	let route = format!("/{}", route.trim_start_matches('/'));
	Router::new().route(&route, get(health_handler))
}

async fn health_handler() -> Json<Value> {
	Json(json!({ "status": "ok" }))
}

/// Serves the health check until `shutdown` fires.
pub async fn serve_health(
	listener: TcpListener,
	route: &str,
	shutdown: CancellationToken,
) -> std::io::Result<()> {
	if let Ok(addr) = listener.local_addr() {
		info!(%addr, route, "health check listening");
	}

	axum::serve(listener, health_router(route))
		.with_graceful_shutdown(async move { shutdown.cancelled().await })
		.await
}
