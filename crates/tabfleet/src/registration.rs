// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registration and heartbeat worker.
//!
//! Until the profile is registered each tick attempts `autoRegister`; once
//! registered, each tick sends a heartbeat carrying whether a workflow run
//! is active. All failures are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tabfleet_protocol::ControlPlane;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::guard::RunGuard;
use crate::state::{StateStore, default_profile_name};

/// Registration worker configuration.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Delay before the first tick.
    pub initial_delay: Duration,
    /// Interval between ticks.
    pub interval: Duration,
    /// Profile name override; derived from the instance id when unset.
    pub profile_name: Option<String>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            interval: Duration::from_secs(5),
            profile_name: None,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Heartbeat delivered.
    Heartbeat,
    /// Registration succeeded and the first heartbeat was sent.
    Registered {
        /// Profile id assigned by the control plane.
        profile_id: String,
    },
    /// The control plane declined the registration.
    Rejected,
    /// A call failed.
    Failed(String),
}

/// Background registration/heartbeat worker.
pub struct RegistrationWorker {
    control_plane: Arc<dyn ControlPlane>,
    state: Arc<StateStore>,
    guard: RunGuard,
    config: RegistrationConfig,
    shutdown: Arc<Notify>,
}

impl RegistrationWorker {
    /// Create a new worker.
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        state: Arc<StateStore>,
        guard: RunGuard,
        config: RegistrationConfig,
    ) -> Self {
        Self {
            control_plane,
            state,
            guard,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run until shutdown.
    pub async fn run(self) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "Registration worker started"
        );

        let mut delay = self.config.initial_delay;
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    info!("Registration worker shutting down");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    self.tick().await;
                }
            }
            delay = self.config.interval;
        }
    }

    /// Register or heartbeat once.
    pub async fn tick(&self) -> TickOutcome {
        let snapshot = self.state.snapshot().await;
        let instance_id = match snapshot.instance_id.clone() {
            Some(id) => id,
            None => match self.state.ensure_instance_id().await {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "Failed to ensure instance id");
                    return TickOutcome::Failed(e.to_string());
                }
            },
        };

        if snapshot.is_registered() {
            return self.heartbeat(&instance_id).await;
        }

        let profile_name = self
            .config
            .profile_name
            .clone()
            .unwrap_or_else(|| default_profile_name(&instance_id));

        let response = match self
            .control_plane
            .auto_register(&instance_id, &profile_name)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Auto-registration failed");
                return TickOutcome::Failed(e.to_string());
            }
        };

        let Some(profile_id) = response.profile_id().filter(|_| response.success) else {
            debug!(message = ?response.message, "Auto-registration declined");
            return TickOutcome::Rejected;
        };

        if let Err(e) = self
            .state
            .record_registration(profile_id.clone(), profile_name.clone())
            .await
        {
            warn!(error = %e, "Failed to persist registration");
            return TickOutcome::Failed(e.to_string());
        }
        info!(profile_id = %profile_id, profile_name = %profile_name, "Instance registered");

        match self.heartbeat(&instance_id).await {
            TickOutcome::Heartbeat => TickOutcome::Registered { profile_id },
            other => other,
        }
    }

    async fn heartbeat(&self, instance_id: &str) -> TickOutcome {
        let is_running = self.guard.is_held();
        match self.control_plane.heartbeat(instance_id, is_running).await {
            Ok(()) => {
                debug!(is_running, "Heartbeat sent");
                TickOutcome::Heartbeat
            }
            Err(e) => {
                warn!(error = %e, "Heartbeat failed");
                TickOutcome::Failed(e.to_string())
            }
        }
    }
}
