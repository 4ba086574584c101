// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command poller.
//!
//! On every tick the poller fetches pending commands for this instance,
//! takes the first one, marks it `processing`, dispatches it and reports
//! the terminal status. Ticks are skipped while a workflow run is active,
//! and a command that loses the race for the run guard is handed back as
//! `pending` for a later tick. Nothing a command does, including panicking
//! or arriving malformed, stops the loop; only a `logout` command halts it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tabfleet_protocol::{
    Command, CommandAction, CommandStatus, ControlPlane, PollIdentity, QueueOutcome, RawCommand,
    UnblurParams,
};
use tokio::sync::{Notify, watch};
use tracing::{debug, error, info, warn};

use crate::config::WorkflowTimings;
use crate::engine::{EngineError, WorkflowEngine};
use crate::error::{Error, Result};
use crate::extraction::Extractor;
use crate::extraction::question::QuestionLookupExtractor;
use crate::reporter::StatusReporter;
use crate::state::StateStore;
use crate::workflows::{self, ResubscribeTargets};

/// URL opened by `open-single-url` when the command carries none.
pub const DEFAULT_OPEN_URL: &str = "https://www.google.com";

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between polls.
    pub poll_interval: Duration,
    /// Delay before the first poll.
    pub initial_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            initial_delay: Duration::from_secs(3),
        }
    }
}

/// What a single poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No pending commands.
    Idle,
    /// A run was active; nothing fetched.
    Skipped,
    /// A run started elsewhere before the command could claim the guard;
    /// the command was reported `pending` again.
    Deferred {
        /// Id of the deferred command.
        command_id: String,
    },
    /// A command was processed to a terminal status.
    Dispatched {
        /// Id of the processed command.
        command_id: String,
        /// Reported terminal status.
        status: CommandStatus,
    },
    /// Fetching commands failed.
    Failed(String),
    /// Polling has been halted by `logout`.
    Halted,
}

/// Work to do once the terminal status has been reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowUp {
    None,
    CloseProcess,
    Halt,
}

/// Polls the control plane and dispatches commands.
pub struct CommandPoller {
    control_plane: Arc<dyn ControlPlane>,
    engine: WorkflowEngine,
    reporter: StatusReporter,
    state: Arc<StateStore>,
    extension_id: String,
    timings: WorkflowTimings,
    resubscribe: ResubscribeTargets,
    extractor: Arc<dyn Extractor>,
    config: PollerConfig,
    shutdown: Arc<Notify>,
    halted: watch::Sender<bool>,
}

impl CommandPoller {
    /// Create a poller with default timings and targets.
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        engine: WorkflowEngine,
        reporter: StatusReporter,
        state: Arc<StateStore>,
        config: PollerConfig,
    ) -> Self {
        let (halted, _) = watch::channel(false);
        Self {
            control_plane,
            engine,
            reporter,
            state,
            extension_id: "tabfleet".to_string(),
            timings: WorkflowTimings::default(),
            resubscribe: ResubscribeTargets::default(),
            extractor: Arc::new(QuestionLookupExtractor::default()),
            config,
            shutdown: Arc::new(Notify::new()),
            halted,
        }
    }

    /// Identifier used to poll before an instance id exists.
    pub fn with_extension_id(mut self, extension_id: impl Into<String>) -> Self {
        self.extension_id = extension_id.into();
        self
    }

    /// Workflow timings.
    pub fn with_timings(mut self, timings: WorkflowTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Resubscribe destinations and targets.
    pub fn with_resubscribe_targets(mut self, targets: ResubscribeTargets) -> Self {
        self.resubscribe = targets;
        self
    }

    /// Extractor used by `unblur-extract`.
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Get a handle to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Receiver that flips to `true` when `logout` halts polling.
    pub fn halted(&self) -> watch::Receiver<bool> {
        self.halted.subscribe()
    }

    /// Whether `logout` has halted polling.
    pub fn is_halted(&self) -> bool {
        *self.halted.borrow()
    }

    /// Run the poll loop until shutdown or halt.
    pub async fn run(self) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Command poller started"
        );

        tokio::select! {
            _ = self.shutdown.notified() => {
                info!("Command poller shutting down");
                return;
            }
            _ = tokio::time::sleep(self.config.initial_delay) => {}
        }

        loop {
            if self.poll_once().await == PollOutcome::Halted {
                info!("Command poller halted");
                break;
            }
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    info!("Command poller shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Poll once and process at most one command.
    pub async fn poll_once(&self) -> PollOutcome {
        if self.is_halted() {
            return PollOutcome::Halted;
        }
        if self.engine.is_busy() {
            debug!("Workflow run active, skipping poll");
            return PollOutcome::Skipped;
        }

        let identity = match self.state.instance_id().await {
            Some(id) => PollIdentity::Instance(id),
            None => PollIdentity::Extension(self.extension_id.clone()),
        };

        let commands = match self.control_plane.pending_commands(&identity).await {
            Ok(commands) => commands,
            Err(e) => {
                warn!(error = %e, "Failed to fetch pending commands");
                return PollOutcome::Failed(e.to_string());
            }
        };

        let (commands, anonymous): (Vec<RawCommand>, Vec<RawCommand>) =
            commands.into_iter().partition(|c| !c.id.is_empty());
        if !anonymous.is_empty() {
            warn!(skipped = anonymous.len(), "Ignoring pending commands without an id");
        }

        let waiting = commands.len();
        let Some(raw) = commands.into_iter().next() else {
            return PollOutcome::Idle;
        };
        if waiting > 1 {
            debug!(waiting, "Processing first pending command only");
        }

        let outcome = self.process(raw).await;
        self.reporter.flush().await;
        outcome
    }

    async fn process(&self, raw: RawCommand) -> PollOutcome {
        info!(command_id = %raw.id, action = %raw.action, "Processing command");
        self.reporter
            .report(&raw.id, CommandStatus::Processing, "Started");

        let dispatched = match raw.parse() {
            Ok(command) => {
                AssertUnwindSafe(self.dispatch(&command))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(Error::Panicked(panic_message(panic))))
            }
            Err(e) => Err(Error::Malformed(e)),
        };

        let (status, follow_up) = match dispatched {
            Ok((detail, follow_up)) => {
                self.reporter.report(&raw.id, CommandStatus::Success, &detail);
                (CommandStatus::Success, follow_up)
            }
            Err(Error::Engine(EngineError::Busy)) => {
                info!(command_id = %raw.id, "Workflow run active, command deferred");
                self.reporter.report(
                    &raw.id,
                    CommandStatus::Pending,
                    "Waiting for the active run to finish",
                );
                return PollOutcome::Deferred { command_id: raw.id };
            }
            Err(e) => {
                error!(command_id = %raw.id, error = %e, "Command failed");
                let message = e.to_string();
                // Workflow failures notify the queue from `unblur` itself.
                if raw.is_extraction() && matches!(e, Error::Malformed(_) | Error::Panicked(_)) {
                    if let Some(queue_id) = raw.queue_id() {
                        self.reporter
                            .queue_completion(&queue_id, QueueOutcome::Failed, &message);
                    }
                }
                self.reporter
                    .report(&raw.id, CommandStatus::Failed, &message);
                (CommandStatus::Failed, FollowUp::None)
            }
        };

        match follow_up {
            FollowUp::None => {}
            FollowUp::CloseProcess => self.close_process().await,
            FollowUp::Halt => {
                self.halted.send_replace(true);
                self.close_process().await;
            }
        }

        PollOutcome::Dispatched {
            command_id: raw.id,
            status,
        }
    }

    async fn close_process(&self) {
        self.reporter.flush().await;
        if let Err(e) = self.engine.pool().host().close_process().await {
            warn!(error = %e, "Failed to close the session host process");
        }
    }

    async fn dispatch(&self, command: &Command) -> Result<(String, FollowUp)> {
        let id = command.id.as_str();
        match &command.action {
            CommandAction::OpenBatch(params) => {
                let plan = workflows::open_batch_plan(params, &self.timings);
                let report = self.engine.run(&plan, Some(id)).await?;
                let summaries: Vec<String> = report
                    .action_summaries()
                    .into_iter()
                    .map(|(target, s)| format!("{target} {}/{}", s.succeeded, s.total))
                    .collect();
                let detail = if summaries.is_empty() {
                    "Completed successfully".to_string()
                } else {
                    format!("Completed successfully ({})", summaries.join("; "))
                };
                Ok((detail, FollowUp::None))
            }
            CommandAction::Resubscribe(params) => {
                let plan = workflows::resubscribe_plan(&self.resubscribe, params, &self.timings);
                self.engine.run(&plan, Some(id)).await?;
                Ok(("Resubscribe completed".to_string(), FollowUp::None))
            }
            CommandAction::UnblurExtract(params) => {
                let detail = self.unblur(id, params).await?;
                Ok((detail, FollowUp::None))
            }
            CommandAction::OpenSingleUrl(params) => {
                let url = params.url.as_deref().unwrap_or(DEFAULT_OPEN_URL);
                self.engine.pool().open_single(url, true).await?;
                Ok((format!("Browser opened: {url}"), FollowUp::None))
            }
            CommandAction::CloseAll => {
                let sweep = self.engine.pool().close_everything_except_pinned().await?;
                debug!(closed = sweep.closed, failed = sweep.failed, "Swept sessions");
                Ok(("All tabs closed".to_string(), FollowUp::None))
            }
            CommandAction::CloseProcess => {
                Ok(("Browser closing".to_string(), FollowUp::CloseProcess))
            }
            CommandAction::Logout => {
                self.state.clear_credentials().await?;
                info!("Credentials cleared, polling will halt");
                Ok(("Logged out".to_string(), FollowUp::Halt))
            }
            CommandAction::Ping => Ok(("Pong".to_string(), FollowUp::None)),
            CommandAction::Unknown(tag) => {
                warn!(action = %tag, "Unknown command action");
                Ok(("Completed".to_string(), FollowUp::None))
            }
        }
    }

    async fn unblur(&self, command_id: &str, params: &UnblurParams) -> Result<String> {
        let plan = workflows::unblur_plan(params, self.extractor.clone(), &self.timings);
        let run = self.engine.run(&plan, Some(command_id)).await;

        let queue_id = params.queue_id.as_deref();
        match run {
            Ok(report) => {
                let document = report.document.unwrap_or(Value::Null);
                let body = document.to_string();
                if let Some(queue_id) = queue_id {
                    self.reporter
                        .queue_completion(queue_id, QueueOutcome::Completed, &body);
                }
                Ok(body)
            }
            Err(EngineError::Busy) => Err(EngineError::Busy.into()),
            Err(e) => {
                if let Some(queue_id) = queue_id {
                    self.reporter
                        .queue_completion(queue_id, QueueOutcome::Failed, &e.to_string());
                }
                Err(e.into())
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic");
    }

    #[test]
    fn test_default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.initial_delay, Duration::from_secs(3));
    }
}
