// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Progress fan-out to observers.
//!
//! Workflow runs publish [`ProgressUpdate`]s to a [`ProgressHub`]. Each
//! registered observer receives every update in publication order. A
//! failing or panicking observer is logged and skipped; it never affects
//! the run or the other observers.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::pool::WorkerRegistry;
use crate::session::{AgentMessage, SessionHost};

/// Upper bound on registered observers.
pub const MAX_OBSERVERS: usize = 16;

/// One progress line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    /// Human-readable message.
    pub message: String,
    /// Current step, 0 when not tied to a step.
    pub step: usize,
    /// Step count, 0 when not tied to a step.
    pub total: usize,
}

impl ProgressUpdate {
    /// Update tied to step `step` of `total`.
    pub fn new(message: impl Into<String>, step: usize, total: usize) -> Self {
        Self {
            message: message.into(),
            step,
            total,
        }
    }

    /// Update not tied to any step.
    pub fn note(message: impl Into<String>) -> Self {
        Self::new(message, 0, 0)
    }
}

/// Observer failure.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// The hub already holds [`MAX_OBSERVERS`] observers.
    #[error("observer limit of {MAX_OBSERVERS} reached")]
    LimitReached,

    /// The observer could not handle an update.
    #[error("observer failed: {0}")]
    Failed(String),
}

/// Receives progress updates.
pub trait ProgressObserver: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Handle one update.
    fn on_progress(&self, update: &ProgressUpdate) -> Result<(), ObserverError>;
}

/// Bounded list of observers.
#[derive(Clone, Default)]
pub struct ProgressHub {
    observers: Arc<RwLock<Vec<Arc<dyn ProgressObserver>>>>,
}

impl ProgressHub {
    /// Hub with no observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer.
    pub fn register(&self, observer: Arc<dyn ProgressObserver>) -> Result<(), ObserverError> {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        if observers.len() >= MAX_OBSERVERS {
            return Err(ObserverError::LimitReached);
        }
        debug!(observer = observer.name(), "Registered progress observer");
        observers.push(observer);
        Ok(())
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `update` to every observer.
    pub fn publish(&self, update: ProgressUpdate) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            match std::panic::catch_unwind(AssertUnwindSafe(|| observer.on_progress(&update))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(observer = observer.name(), error = %e, "Progress observer failed"),
                Err(_) => warn!(observer = observer.name(), "Progress observer panicked"),
            }
        }
    }
}

/// Logs every update.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_progress(&self, update: &ProgressUpdate) -> Result<(), ObserverError> {
        info!(step = update.step, total = update.total, "{}", update.message);
        Ok(())
    }
}

/// Mirrors updates into every worker's status overlay.
pub struct SessionBroadcastObserver {
    host: Arc<dyn SessionHost>,
    registry: WorkerRegistry,
}

impl SessionBroadcastObserver {
    /// Broadcast to the members of `registry`.
    pub fn new(host: Arc<dyn SessionHost>, registry: WorkerRegistry) -> Self {
        Self { host, registry }
    }
}

impl ProgressObserver for SessionBroadcastObserver {
    fn name(&self) -> &str {
        "session-broadcast"
    }

    fn on_progress(&self, update: &ProgressUpdate) -> Result<(), ObserverError> {
        let workers = self.registry.snapshot();
        if workers.is_empty() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ObserverError::Failed(e.to_string()))?;

        for worker in workers {
            let host = self.host.clone();
            let message = AgentMessage::UpdateStatus {
                message: update.message.clone(),
                step: update.step,
                total: update.total,
            };
            runtime.spawn(async move {
                if let Err(e) = host.send_to_session(&worker, message).await {
                    debug!(worker = %worker, error = %e, "Status overlay update failed");
                }
            });
        }
        Ok(())
    }
}

/// Forwards updates into a broadcast channel.
pub struct ChannelObserver {
    sender: broadcast::Sender<ProgressUpdate>,
}

impl ChannelObserver {
    /// Channel observer buffering up to `capacity` updates per receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New receiver seeing updates published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }
}

impl ProgressObserver for ChannelObserver {
    fn name(&self) -> &str {
        "channel"
    }

    fn on_progress(&self, update: &ProgressUpdate) -> Result<(), ObserverError> {
        // No receivers is fine.
        let _ = self.sender.send(update.clone());
        Ok(())
    }
}
