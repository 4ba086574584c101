// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tabfleet daemon
//!
//! Polls the control plane and drives browser sessions through the session
//! host bridge until interrupted or logged out.

use std::sync::Arc;
use tracing::{info, warn};

use tabfleet::config::{Config, WorkflowTimings};
use tabfleet::runtime::OrchestratorRuntime;
use tabfleet::session::{BridgeHost, SessionHost};
use tabfleet::state::StateStore;
use tabfleet_protocol::HttpControlPlane;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabfleet=info,tabfleet_protocol=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        control_plane = %config.control_plane.api_url(),
        host_url = %config.host_url,
        data_dir = %config.data_dir.display(),
        "Starting tabfleet"
    );

    let state = Arc::new(StateStore::open(config.state_path()).await?);
    let host = Arc::new(BridgeHost::new(
        &config.host_url,
        config.control_plane.request_timeout,
    )?);
    info!(host_type = host.host_type(), "Session host initialized");
    let control_plane = Arc::new(HttpControlPlane::new(config.control_plane.clone())?);

    let runtime = OrchestratorRuntime::builder()
        .config(&config)
        .host(host)
        .control_plane(control_plane)
        .state(state)
        .timings(WorkflowTimings::default())
        .build()?
        .start()
        .await?;

    info!(instance_id = %runtime.instance_id(), "Orchestrator ready");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received");
        }
        _ = runtime.halted() => {
            info!("Polling halted by logout");
        }
    }

    runtime.shutdown().await;

    info!("tabfleet shut down");

    Ok(())
}
