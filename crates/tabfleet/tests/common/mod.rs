// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for tabfleet integration tests.
//!
//! Provides an in-memory control plane that behaves like the real queue
//! (a command stops being pending once a status is reported for it, and
//! returns to the queue when reported `pending` again) and a rig wiring the
//! engine to a [`MockHost`].

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tabfleet::config::WorkflowTimings;
use tabfleet::engine::WorkflowEngine;
use tabfleet::executor::ActionExecutor;
use tabfleet::guard::{RunGuard, RunPermit};
use tabfleet::poller::{CommandPoller, PollerConfig};
use tabfleet::pool::{WorkerPool, WorkerRegistry};
use tabfleet::progress::{ObserverError, ProgressHub, ProgressObserver, ProgressUpdate};
use tabfleet::reporter::StatusReporter;
use tabfleet::session::MockHost;
use tabfleet::state::StateStore;
use tabfleet_protocol::error::Result;
use tabfleet_protocol::{
    ClientError, CommandStatus, ControlPlane, PollIdentity, QueueOutcome, RawCommand,
    RegisterResponse,
};

pub const INSTANCE_ID: &str = "inst_test";

/// One recorded control-plane call.
#[derive(Debug, Clone, PartialEq)]
pub enum CpCall {
    Pending(PollIdentity),
    Status {
        command_id: String,
        status: CommandStatus,
        detail: String,
    },
    QuestionsLeft {
        instance_id: String,
        count: i64,
    },
    Heartbeat {
        instance_id: String,
        is_running: bool,
    },
    Register {
        instance_id: String,
        profile_name: String,
    },
    Queue {
        queue_id: String,
        outcome: QueueOutcome,
        result: String,
    },
}

#[derive(Debug)]
struct Inner {
    pending: Vec<RawCommand>,
    taken: Vec<RawCommand>,
    calls: Vec<CpCall>,
    run_on_next_fetch: Option<RunGuard>,
    held_run: Option<RunPermit>,
    fail_pending: bool,
    fail_reports: bool,
    register_response: RegisterResponse,
}

/// In-memory [`ControlPlane`] recording every call.
#[derive(Debug)]
pub struct RecordingControlPlane {
    inner: Mutex<Inner>,
}

impl Default for RecordingControlPlane {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: Vec::new(),
                taken: Vec::new(),
                calls: Vec::new(),
                run_on_next_fetch: None,
                held_run: None,
                fail_pending: false,
                fail_reports: false,
                register_response: RegisterResponse {
                    success: true,
                    id: Some(json!(42)),
                    message: None,
                },
            }),
        }
    }
}

impl RecordingControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_command(&self, id: &str, action: &str, parameters: Value) {
        self.inner
            .lock()
            .unwrap()
            .pending
            .push(RawCommand::new(id, action, parameters));
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .pending
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    /// Acquire `guard` while the next fetch is in flight, as if another
    /// run started concurrently. The permit is held until [`Self::release_run`].
    pub fn start_run_during_next_fetch(&self, guard: RunGuard) {
        self.inner.lock().unwrap().run_on_next_fetch = Some(guard);
    }

    pub fn release_run(&self) {
        self.inner.lock().unwrap().held_run = None;
    }

    pub fn set_fail_pending(&self, fail: bool) {
        self.inner.lock().unwrap().fail_pending = fail;
    }

    pub fn set_fail_reports(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reports = fail;
    }

    pub fn set_register_response(&self, response: RegisterResponse) {
        self.inner.lock().unwrap().register_response = response;
    }

    pub fn calls(&self) -> Vec<CpCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn poll_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, CpCall::Pending(_)))
            .count()
    }

    /// Status reports as `(command_id, status, detail)`.
    pub fn statuses(&self) -> Vec<(String, CommandStatus, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                CpCall::Status {
                    command_id,
                    status,
                    detail,
                } => Some((command_id, status, detail)),
                _ => None,
            })
            .collect()
    }

    /// Statuses reported for one command, in order.
    pub fn statuses_of(&self, command_id: &str) -> Vec<CommandStatus> {
        self.statuses()
            .into_iter()
            .filter(|(id, _, _)| id == command_id)
            .map(|(_, status, _)| status)
            .collect()
    }

    /// Detail of the terminal report for one command.
    pub fn terminal_detail(&self, command_id: &str) -> Option<(CommandStatus, String)> {
        self.statuses()
            .into_iter()
            .rev()
            .find(|(id, status, _)| id == command_id && status.is_terminal())
            .map(|(_, status, detail)| (status, detail))
    }

    fn record(&self, call: CpCall) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        if inner.fail_reports {
            return Err(ClientError::Status { status: 500 });
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn pending_commands(&self, identity: &PollIdentity) -> Result<Vec<RawCommand>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(CpCall::Pending(identity.clone()));
        if let Some(guard) = inner.run_on_next_fetch.take() {
            inner.held_run = guard.try_acquire();
        }
        if inner.fail_pending {
            return Err(ClientError::Status { status: 503 });
        }
        Ok(inner.pending.clone())
    }

    async fn update_command_status(
        &self,
        command_id: &str,
        status: CommandStatus,
        detail: &str,
    ) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            if status == CommandStatus::Pending {
                if let Some(pos) = inner.taken.iter().position(|c| c.id == command_id) {
                    let command = inner.taken.remove(pos);
                    inner.pending.insert(0, command);
                }
            } else if let Some(pos) = inner.pending.iter().position(|c| c.id == command_id) {
                let command = inner.pending.remove(pos);
                inner.taken.push(command);
            }
        }
        self.record(CpCall::Status {
            command_id: command_id.to_string(),
            status,
            detail: detail.to_string(),
        })
    }

    async fn update_questions_left(&self, instance_id: &str, questions_left: i64) -> Result<()> {
        self.record(CpCall::QuestionsLeft {
            instance_id: instance_id.to_string(),
            count: questions_left,
        })
    }

    async fn heartbeat(&self, instance_id: &str, is_running: bool) -> Result<()> {
        self.record(CpCall::Heartbeat {
            instance_id: instance_id.to_string(),
            is_running,
        })
    }

    async fn auto_register(&self, instance_id: &str, profile_name: &str) -> Result<RegisterResponse> {
        self.record(CpCall::Register {
            instance_id: instance_id.to_string(),
            profile_name: profile_name.to_string(),
        })?;
        Ok(self.inner.lock().unwrap().register_response.clone())
    }

    async fn complete_queue_item(
        &self,
        queue_id: &str,
        outcome: QueueOutcome,
        result: &str,
    ) -> Result<()> {
        self.record(CpCall::Queue {
            queue_id: queue_id.to_string(),
            outcome,
            result: result.to_string(),
        })
    }
}

/// Progress observer keeping every update.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingObserver {
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.updates().into_iter().map(|u| u.message).collect()
    }

    pub fn last(&self) -> Option<ProgressUpdate> {
        self.updates().pop()
    }
}

impl ProgressObserver for RecordingObserver {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_progress(&self, update: &ProgressUpdate) -> std::result::Result<(), ObserverError> {
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

/// Engine, host and control plane wired together with zero waits.
pub struct Rig {
    pub host: Arc<MockHost>,
    pub control_plane: Arc<RecordingControlPlane>,
    pub state: Arc<StateStore>,
    pub observer: Arc<RecordingObserver>,
    pub guard: RunGuard,
    pub reporter: StatusReporter,
    pub engine: WorkflowEngine,
}

impl Rig {
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let host = Arc::new(MockHost::new());
        let control_plane = Arc::new(RecordingControlPlane::new());
        let state = Arc::new(StateStore::in_memory());
        let observer = Arc::new(RecordingObserver::default());

        let progress = ProgressHub::new();
        progress.register(observer.clone()).unwrap();

        let (reporter, _handle) = StatusReporter::spawn(control_plane.clone());
        let guard = RunGuard::new();
        let pool = WorkerPool::new(host.clone(), WorkerRegistry::new());
        let executor = ActionExecutor::new(host.clone(), Duration::from_secs(5));
        let engine = WorkflowEngine::new(pool, executor, progress, guard.clone())
            .with_reporter(reporter.clone())
            .with_instance_id(INSTANCE_ID)
            .with_keep_alive_period(Duration::ZERO);

        Self {
            host,
            control_plane,
            state,
            observer,
            guard,
            reporter,
            engine,
        }
    }

    pub fn timings() -> WorkflowTimings {
        WorkflowTimings::immediate()
    }

    /// Poller over this rig with zero waits.
    pub fn poller(&self) -> CommandPoller {
        CommandPoller::new(
            self.control_plane.clone(),
            self.engine.clone(),
            self.reporter.clone(),
            self.state.clone(),
            PollerConfig {
                poll_interval: Duration::from_millis(10),
                initial_delay: Duration::ZERO,
            },
        )
        .with_timings(Self::timings())
    }
}
