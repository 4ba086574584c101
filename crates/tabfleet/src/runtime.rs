// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable orchestrator runtime.
//!
//! [`OrchestratorRuntime`] wires a session host, a control plane and the
//! state store into a running orchestrator: the command poller, the
//! registration worker and the status reporter each run as a tokio task.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tabfleet::runtime::OrchestratorRuntime;
//! use tabfleet::session::BridgeHost;
//! use tabfleet_protocol::{ClientConfig, HttpControlPlane};
//!
//! let host = Arc::new(BridgeHost::new("http://127.0.0.1:9333", timeout)?);
//! let control_plane = Arc::new(HttpControlPlane::new(ClientConfig::default())?);
//!
//! let runtime = OrchestratorRuntime::builder()
//!     .host(host)
//!     .control_plane(control_plane)
//!     .build()?
//!     .start()
//!     .await?;
//!
//! runtime.halted().await;
//! runtime.shutdown().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tabfleet_protocol::ControlPlane;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigError, WorkflowTimings};
use crate::engine::WorkflowEngine;
use crate::error::Result;
use crate::executor::ActionExecutor;
use crate::extraction::Extractor;
use crate::extraction::question::QuestionLookupExtractor;
use crate::guard::RunGuard;
use crate::poller::{CommandPoller, PollerConfig};
use crate::pool::{WorkerPool, WorkerRegistry};
use crate::progress::{ProgressHub, ProgressObserver, SessionBroadcastObserver, TracingObserver};
use crate::registration::{RegistrationConfig, RegistrationWorker};
use crate::reporter::StatusReporter;
use crate::session::SessionHost;
use crate::state::StateStore;
use crate::workflows::ResubscribeTargets;

/// Builder for [`OrchestratorRuntime`].
pub struct OrchestratorRuntimeBuilder {
    host: Option<Arc<dyn SessionHost>>,
    control_plane: Option<Arc<dyn ControlPlane>>,
    state: Option<Arc<StateStore>>,
    extractor: Option<Arc<dyn Extractor>>,
    observers: Vec<Arc<dyn ProgressObserver>>,
    timings: WorkflowTimings,
    poller: PollerConfig,
    registration: RegistrationConfig,
    extension_id: String,
    resubscribe: ResubscribeTargets,
}

impl Default for OrchestratorRuntimeBuilder {
    fn default() -> Self {
        Self {
            host: None,
            control_plane: None,
            state: None,
            extractor: None,
            observers: Vec::new(),
            timings: WorkflowTimings::default(),
            poller: PollerConfig::default(),
            registration: RegistrationConfig::default(),
            extension_id: "tabfleet".to_string(),
            resubscribe: ResubscribeTargets::default(),
        }
    }
}

impl OrchestratorRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply intervals, identity and lookup settings from `config`.
    pub fn config(mut self, config: &Config) -> Self {
        self.poller = PollerConfig {
            poll_interval: config.poll_interval,
            initial_delay: config.initial_poll_delay,
        };
        self.registration = RegistrationConfig {
            initial_delay: config.register_delay,
            interval: config.heartbeat_interval,
            profile_name: config.profile_name.clone(),
        };
        self.extension_id = config.control_plane.extension_id.clone();
        self.extractor = Some(Arc::new(QuestionLookupExtractor::new(
            config.question_lookup.clone(),
        )));
        self
    }

    /// Set the session host (required).
    pub fn host(mut self, host: Arc<dyn SessionHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Set the control plane (required).
    pub fn control_plane(mut self, control_plane: Arc<dyn ControlPlane>) -> Self {
        self.control_plane = Some(control_plane);
        self
    }

    /// Set the state store.
    ///
    /// Default: in-memory, nothing persisted.
    pub fn state(mut self, state: Arc<StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// Set the workflow timings.
    pub fn timings(mut self, timings: WorkflowTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Set the command poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poller.poll_interval = interval;
        self
    }

    /// Set the delay before the first poll.
    pub fn initial_poll_delay(mut self, delay: Duration) -> Self {
        self.poller.initial_delay = delay;
        self
    }

    /// Set the registration worker configuration.
    pub fn registration(mut self, config: RegistrationConfig) -> Self {
        self.registration = config;
        self
    }

    /// Set the identifier polled with before an instance id exists.
    pub fn extension_id(mut self, extension_id: impl Into<String>) -> Self {
        self.extension_id = extension_id.into();
        self
    }

    /// Set the extractor used by document extraction commands.
    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Register an additional progress observer.
    pub fn observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Set the resubscribe destinations and targets.
    pub fn resubscribe_targets(mut self, targets: ResubscribeTargets) -> Self {
        self.resubscribe = targets;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<OrchestratorRuntimeConfig> {
        let host = self.host.ok_or(ConfigError::Missing("host"))?;
        let control_plane = self
            .control_plane
            .ok_or(ConfigError::Missing("control_plane"))?;

        Ok(OrchestratorRuntimeConfig {
            host,
            control_plane,
            state: self
                .state
                .unwrap_or_else(|| Arc::new(StateStore::in_memory())),
            extractor: self
                .extractor
                .unwrap_or_else(|| Arc::new(QuestionLookupExtractor::default())),
            observers: self.observers,
            timings: self.timings,
            poller: self.poller,
            registration: self.registration,
            extension_id: self.extension_id,
            resubscribe: self.resubscribe,
        })
    }
}

/// Configuration for an [`OrchestratorRuntime`].
pub struct OrchestratorRuntimeConfig {
    host: Arc<dyn SessionHost>,
    control_plane: Arc<dyn ControlPlane>,
    state: Arc<StateStore>,
    extractor: Arc<dyn Extractor>,
    observers: Vec<Arc<dyn ProgressObserver>>,
    timings: WorkflowTimings,
    poller: PollerConfig,
    registration: RegistrationConfig,
    extension_id: String,
    resubscribe: ResubscribeTargets,
}

impl OrchestratorRuntimeConfig {
    /// Start the runtime, spawning the poller, registration and reporter
    /// tasks.
    pub async fn start(self) -> Result<OrchestratorRuntime> {
        let instance_id = self.state.ensure_instance_id().await?;
        info!(instance_id = %instance_id, host = self.host.host_type(), "Starting orchestrator");

        let (reporter, reporter_handle) = StatusReporter::spawn(self.control_plane.clone());

        let registry = WorkerRegistry::new();
        let pool = WorkerPool::new(self.host.clone(), registry.clone())
            .with_state_store(self.state.clone());

        let progress = ProgressHub::new();
        let builtin: [Arc<dyn ProgressObserver>; 2] = [
            Arc::new(TracingObserver),
            Arc::new(SessionBroadcastObserver::new(self.host.clone(), registry)),
        ];
        for observer in builtin.into_iter().chain(self.observers) {
            let name = observer.name().to_string();
            if let Err(e) = progress.register(observer) {
                warn!(observer = %name, error = %e, "Progress observer not registered");
            }
        }

        let guard = RunGuard::new();
        let executor = ActionExecutor::new(self.host.clone(), self.timings.action_timeout);
        let engine = WorkflowEngine::new(pool, executor, progress, guard.clone())
            .with_reporter(reporter.clone())
            .with_instance_id(instance_id.clone())
            .with_keep_alive_period(self.timings.keep_alive_period);

        let poller = CommandPoller::new(
            self.control_plane.clone(),
            engine.clone(),
            reporter.clone(),
            self.state.clone(),
            self.poller,
        )
        .with_extension_id(self.extension_id)
        .with_timings(self.timings)
        .with_resubscribe_targets(self.resubscribe)
        .with_extractor(self.extractor);
        let halted = poller.halted();
        let poller_shutdown = poller.shutdown_handle();
        let poller_handle = tokio::spawn(poller.run());

        let registration = RegistrationWorker::new(
            self.control_plane,
            self.state,
            guard,
            self.registration,
        );
        let registration_shutdown = registration.shutdown_handle();
        let registration_handle = tokio::spawn(registration.run());

        Ok(OrchestratorRuntime {
            poller_handle,
            registration_handle,
            reporter_handle,
            poller_shutdown,
            registration_shutdown,
            halted,
            engine,
            reporter,
            instance_id,
        })
    }
}

/// A running orchestrator.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct OrchestratorRuntime {
    poller_handle: JoinHandle<()>,
    registration_handle: JoinHandle<()>,
    reporter_handle: JoinHandle<()>,
    poller_shutdown: Arc<Notify>,
    registration_shutdown: Arc<Notify>,
    halted: watch::Receiver<bool>,
    engine: WorkflowEngine,
    reporter: StatusReporter,
    instance_id: String,
}

impl OrchestratorRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> OrchestratorRuntimeBuilder {
        OrchestratorRuntimeBuilder::new()
    }

    /// The instance id this orchestrator polls with.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The workflow engine.
    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Resolves once `logout` has halted polling, or the poller has stopped.
    pub async fn halted(&self) {
        let mut halted = self.halted.clone();
        let _ = halted.wait_for(|h| *h).await;
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops the poller and the registration worker, then drains queued
    /// status reports.
    pub async fn shutdown(self) {
        info!("OrchestratorRuntime shutting down...");

        self.poller_shutdown.notify_one();
        self.registration_shutdown.notify_one();

        if let Err(e) = self.poller_handle.await {
            error!("Command poller task panicked: {}", e);
        }
        if let Err(e) = self.registration_handle.await {
            error!("Registration worker task panicked: {}", e);
        }

        self.reporter.flush().await;
        drop(self.reporter);
        drop(self.engine);
        if let Err(e) = self.reporter_handle.await {
            error!("Status reporter task panicked: {}", e);
        }

        info!("OrchestratorRuntime shutdown complete");
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.poller_handle.is_finished() && !self.registration_handle.is_finished()
    }
}
