// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow engine.
//!
//! A [`WorkflowPlan`] is an ordered list of [`StepSpec`]s. The engine runs
//! one plan at a time under the [`RunGuard`], publishing a progress update
//! for every step. Steps marked [`Requirement::Required`] abort the run on
//! failure; optional steps record a degraded outcome and continue. When a
//! run fails, the plan's cleanup steps run best-effort and a final
//! `❌ Error: ...` update is published. The guard, the keep-alive ticker
//! and the worker registry are released on every exit path.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::executor::{ActionExecutor, ActionSpec, ActionSummary, CountPatterns};
use crate::extraction::{
    ExtractionError, Extractor, NestedDocument, RetryPolicy, attach_nested_document,
};
use crate::guard::RunGuard;
use crate::pool::WorkerPool;
use crate::progress::{ProgressHub, ProgressUpdate};
use crate::reporter::StatusReporter;
use crate::session::{AgentMessage, LoadStatus, SessionError, WorkerId};
use tabfleet_protocol::CommandStatus;

/// Errors that end a workflow run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another run holds the guard. Nothing was touched.
    #[error("Another workflow run is already in progress")]
    Busy,

    /// Workers could not be opened.
    #[error("Failed to open workers: {0}")]
    WorkerCreation(#[source] SessionError),

    /// A required step failed. Displays exactly the step's error message.
    #[error("{0}")]
    RequiredStep(String),

    /// A required extraction gave up.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// A required host call failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Lifecycle of the engine's most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No run has started yet.
    Idle,
    /// A run is in progress.
    Running,
    /// The last run finished successfully.
    Completed,
    /// The last run failed.
    Errored,
}

/// What happens when a step fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Abort the run. `error` overrides the step's own failure detail.
    Required {
        /// Error message reported for the run.
        error: Option<String>,
    },
    /// Continue. `message` is published as progress when present.
    Optional {
        /// Progress message announcing the degradation.
        message: Option<String>,
    },
}

/// One discovery attempt of a [`StepKind::ClickFirst`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickAttempt {
    /// Discovery target.
    pub target: String,
    /// Wait before this attempt.
    pub delay_before: Duration,
    /// Progress message published before this attempt.
    pub announce: Option<String>,
}

impl ClickAttempt {
    /// Attempt `target` immediately without an announcement.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            delay_before: Duration::ZERO,
            announce: None,
        }
    }

    /// Attempt after `delay`, announcing `message` first.
    pub fn fallback(target: impl Into<String>, delay: Duration, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            delay_before: delay,
            announce: Some(message.into()),
        }
    }
}

/// Reports a step can send to the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportSpec {
    /// Send the scraped remaining-question count.
    QuestionsLeft,
    /// Send an intermediate `processing` status with this detail.
    CommandProgress(String),
}

/// The operation a step performs.
pub enum StepKind {
    /// Wait, publishing a countdown every second.
    Countdown(Duration),
    /// Wait silently.
    Pause(Duration),
    /// Open `count_per_url` workers for each URL.
    OpenWorkers {
        /// Target URLs.
        urls: Vec<String>,
        /// Requested workers per URL, clamped by the pool.
        count_per_url: i64,
    },
    /// Open one worker.
    OpenSingle {
        /// Target URL.
        url: String,
        /// Whether to focus the session.
        active: bool,
    },
    /// Navigate the first worker.
    Navigate {
        /// Destination URL.
        url: String,
    },
    /// Poll the first worker's load status until complete or the ceiling.
    AwaitLoad {
        /// Delay before the first poll.
        initial_delay: Duration,
        /// Poll cadence.
        poll: Duration,
        /// Maximum total wait.
        ceiling: Duration,
    },
    /// Reload every worker.
    ReloadAll,
    /// Close every worker of the run.
    CloseAll,
    /// Perform an action on every worker.
    ActOnAll {
        /// Action to perform.
        action: ActionSpec,
        /// Progress template with `{succeeded}`, `{failed}` and `{total}`.
        summary: Option<String>,
    },
    /// Try discovery targets on the first worker until one clicks.
    ClickFirst {
        /// Attempts in order.
        attempts: Vec<ClickAttempt>,
        /// Progress message published on success.
        success: Option<String>,
    },
    /// Scrape a count from the first worker.
    ExtractCount {
        /// Patterns to apply.
        patterns: CountPatterns,
    },
    /// Extract a document from the first worker with retries.
    ExtractDocument {
        /// Attempt implementation.
        extractor: Arc<dyn Extractor>,
        /// Retry policy.
        policy: RetryPolicy,
        /// Pointer of a JSON-encoded nested document to decode.
        nested_pointer: Option<String>,
    },
    /// Send a report to the control plane.
    Report(ReportSpec),
    /// Hide the first worker's status overlay after a delay.
    DismissStatus {
        /// Delay before hiding.
        delay: Duration,
    },
}

impl StepKind {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Countdown(_) => "countdown",
            StepKind::Pause(_) => "pause",
            StepKind::OpenWorkers { .. } => "open-workers",
            StepKind::OpenSingle { .. } => "open-single",
            StepKind::Navigate { .. } => "navigate",
            StepKind::AwaitLoad { .. } => "await-load",
            StepKind::ReloadAll => "reload-all",
            StepKind::CloseAll => "close-all",
            StepKind::ActOnAll { .. } => "act-on-all",
            StepKind::ClickFirst { .. } => "click-first",
            StepKind::ExtractCount { .. } => "extract-count",
            StepKind::ExtractDocument { .. } => "extract-document",
            StepKind::Report(_) => "report",
            StepKind::DismissStatus { .. } => "dismiss-status",
        }
    }
}

impl fmt::Debug for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A step plus its progress label, waits and failure policy.
#[derive(Debug)]
pub struct StepSpec {
    /// Progress message published when the step starts.
    pub label: String,
    /// What the step does.
    pub kind: StepKind,
    /// Silent wait after the label is published.
    pub wait_before: Duration,
    /// Silent wait after the step completes.
    pub wait_after: Duration,
    /// Failure policy.
    pub requirement: Requirement,
}

impl StepSpec {
    /// Optional step without waits.
    pub fn new(label: impl Into<String>, kind: StepKind) -> Self {
        Self {
            label: label.into(),
            kind,
            wait_before: Duration::ZERO,
            wait_after: Duration::ZERO,
            requirement: Requirement::Optional { message: None },
        }
    }

    /// Wait silently before running.
    pub fn wait_before(mut self, wait: Duration) -> Self {
        self.wait_before = wait;
        self
    }

    /// Wait silently after running.
    pub fn wait_after(mut self, wait: Duration) -> Self {
        self.wait_after = wait;
        self
    }

    /// Abort the run with `error` if the step fails.
    pub fn required(mut self, error: impl Into<String>) -> Self {
        self.requirement = Requirement::Required {
            error: Some(error.into()),
        };
        self
    }

    /// Abort the run with the step's own failure detail.
    pub fn required_as_is(mut self) -> Self {
        self.requirement = Requirement::Required { error: None };
        self
    }

    /// Continue on failure, announcing `message`.
    pub fn optional(mut self, message: impl Into<String>) -> Self {
        self.requirement = Requirement::Optional {
            message: Some(message.into()),
        };
        self
    }
}

/// Final progress message of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Fixed text.
    Fixed(String),
    /// Text followed by ` (N questions left)` when a count was scraped.
    WithQuestionsLeft(String),
}

impl Completion {
    /// Render for a finished run.
    pub fn render(&self, report: &RunReport) -> String {
        match (self, report.questions_left) {
            (Completion::Fixed(text), _) => text.clone(),
            (Completion::WithQuestionsLeft(text), Some(n)) => format!("{text} ({n} questions left)"),
            (Completion::WithQuestionsLeft(text), None) => text.clone(),
        }
    }
}

/// A named sequence of steps with cleanup.
#[derive(Debug)]
pub struct WorkflowPlan {
    /// Workflow name for logs and reports.
    pub name: String,
    /// Steps in order.
    pub steps: Vec<StepSpec>,
    /// Best-effort steps run after a failure.
    pub on_error: Vec<StepSpec>,
    /// Final progress message.
    pub completion: Completion,
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Finished normally.
    Done,
    /// Action performed across workers.
    Actions {
        /// Action target.
        target: String,
        /// Per-worker tally.
        summary: ActionSummary,
    },
    /// Failed or timed out, but the run continued.
    Degraded {
        /// What went wrong.
        detail: String,
    },
}

/// Record of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// 1-based position in the plan.
    pub index: usize,
    /// Step label.
    pub label: String,
    /// What happened.
    pub outcome: StepOutcome,
}

/// Result of a successful run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Workflow name.
    pub workflow: String,
    /// Executed steps in order.
    pub steps: Vec<StepRecord>,
    /// Workers opened during the run.
    pub workers_opened: usize,
    /// Scraped remaining-question count.
    pub questions_left: Option<i64>,
    /// Extracted document.
    pub document: Option<Value>,
    /// Notes about post-processing.
    pub annotations: Vec<String>,
}

impl RunReport {
    /// Action summaries keyed by action target, in step order.
    pub fn action_summaries(&self) -> Vec<(&str, ActionSummary)> {
        self.steps
            .iter()
            .filter_map(|s| match &s.outcome {
                StepOutcome::Actions { target, summary } => Some((target.as_str(), *summary)),
                _ => None,
            })
            .collect()
    }
}

enum StepFailure {
    Fatal(EngineError),
    Failed(String),
    Session(SessionError),
    Extraction(ExtractionError),
}

impl StepFailure {
    fn detail(&self) -> String {
        match self {
            StepFailure::Fatal(e) => e.to_string(),
            StepFailure::Failed(detail) => detail.clone(),
            StepFailure::Session(e) => e.to_string(),
            StepFailure::Extraction(e) => e.to_string(),
        }
    }

    fn into_required(self, error: Option<&String>) -> EngineError {
        if let Some(error) = error {
            return EngineError::RequiredStep(error.clone());
        }
        match self {
            StepFailure::Fatal(e) => e,
            StepFailure::Failed(detail) => EngineError::RequiredStep(detail),
            StepFailure::Session(e) => EngineError::Session(e),
            StepFailure::Extraction(e) => EngineError::Extraction(e),
        }
    }
}

impl From<SessionError> for StepFailure {
    fn from(err: SessionError) -> Self {
        StepFailure::Session(err)
    }
}

struct RunContext<'a> {
    command_id: Option<&'a str>,
    workers: Vec<WorkerId>,
    report: RunReport,
}

impl RunContext<'_> {
    fn designated(&self) -> Result<WorkerId, StepFailure> {
        self.workers
            .first()
            .cloned()
            .ok_or_else(|| StepFailure::Failed("no worker available".to_string()))
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Runs [`WorkflowPlan`]s one at a time.
#[derive(Clone)]
pub struct WorkflowEngine {
    pool: WorkerPool,
    executor: ActionExecutor,
    progress: ProgressHub,
    guard: RunGuard,
    reporter: Option<StatusReporter>,
    instance_id: Option<String>,
    keep_alive_period: Duration,
    state: Arc<Mutex<RunState>>,
}

impl WorkflowEngine {
    /// Engine over the given collaborators.
    pub fn new(
        pool: WorkerPool,
        executor: ActionExecutor,
        progress: ProgressHub,
        guard: RunGuard,
    ) -> Self {
        Self {
            pool,
            executor,
            progress,
            guard,
            reporter: None,
            instance_id: None,
            keep_alive_period: Duration::from_secs(2),
            state: Arc::new(Mutex::new(RunState::Idle)),
        }
    }

    /// Send reports through `reporter`.
    pub fn with_reporter(mut self, reporter: StatusReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Instance id used in questions-left reports.
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Keep-alive period while a run is active; zero disables it.
    pub fn with_keep_alive_period(mut self, period: Duration) -> Self {
        self.keep_alive_period = period;
        self
    }

    /// Whether a run holds the guard.
    pub fn is_busy(&self) -> bool {
        self.guard.is_held()
    }

    /// State of the most recent run.
    pub fn run_state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// The worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// The progress hub.
    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    fn publish(&self, message: impl Into<String>, step: usize, total: usize) {
        self.progress
            .publish(ProgressUpdate::new(message, step, total));
    }

    /// Run `plan`. Fails fast with [`EngineError::Busy`] when another run
    /// is active.
    pub async fn run(
        &self,
        plan: &WorkflowPlan,
        command_id: Option<&str>,
    ) -> Result<RunReport, EngineError> {
        let Some(permit) = self
            .guard
            .try_acquire_with_keep_alive(self.pool.host().clone(), self.keep_alive_period)
        else {
            debug!(workflow = %plan.name, "Run rejected, engine busy");
            return Err(EngineError::Busy);
        };

        self.set_state(RunState::Running);
        self.pool.reset_registry().await;
        info!(workflow = %plan.name, command_id = ?command_id, steps = plan.steps.len(), "Workflow run started");

        let mut ctx = RunContext {
            command_id,
            workers: Vec::new(),
            report: RunReport {
                workflow: plan.name.clone(),
                ..Default::default()
            },
        };

        let outcome = match self.execute(plan, &mut ctx).await {
            Ok(()) => {
                let total = plan.steps.len();
                self.publish(plan.completion.render(&ctx.report), total, total);
                self.set_state(RunState::Completed);
                info!(workflow = %plan.name, "Workflow run completed");
                Ok(ctx.report)
            }
            Err(e) => {
                warn!(workflow = %plan.name, error = %e, "Workflow run failed");
                self.progress
                    .publish(ProgressUpdate::note(format!("❌ Error: {e}")));
                self.cleanup(plan, &mut ctx).await;
                self.set_state(RunState::Errored);
                Err(e)
            }
        };

        self.pool.reset_registry().await;
        drop(permit);
        outcome
    }

    async fn execute(&self, plan: &WorkflowPlan, ctx: &mut RunContext<'_>) -> Result<(), EngineError> {
        let total = plan.steps.len();
        for (i, step) in plan.steps.iter().enumerate() {
            let index = i + 1;
            self.publish(step.label.clone(), index, total);
            pause(step.wait_before).await;

            let outcome = match self.execute_step(&step.kind, ctx, index, total).await {
                Ok(outcome) => outcome,
                Err(StepFailure::Fatal(e)) => return Err(e),
                Err(failure) => match &step.requirement {
                    Requirement::Required { error } => {
                        return Err(failure.into_required(error.as_ref()));
                    }
                    Requirement::Optional { message } => {
                        let detail = failure.detail();
                        debug!(step = step.kind.name(), %detail, "Optional step failed");
                        if let Some(message) = message {
                            self.publish(message.clone(), index, total);
                        }
                        StepOutcome::Degraded { detail }
                    }
                },
            };

            ctx.report.steps.push(StepRecord {
                index,
                label: step.label.clone(),
                outcome,
            });
            pause(step.wait_after).await;
        }
        Ok(())
    }

    async fn cleanup(&self, plan: &WorkflowPlan, ctx: &mut RunContext<'_>) {
        let total = plan.on_error.len();
        for (i, step) in plan.on_error.iter().enumerate() {
            pause(step.wait_before).await;
            if let Err(failure) = self.execute_step(&step.kind, ctx, i + 1, total).await {
                debug!(step = step.kind.name(), detail = %failure.detail(), "Cleanup step failed");
            }
        }
    }

    async fn execute_step(
        &self,
        kind: &StepKind,
        ctx: &mut RunContext<'_>,
        index: usize,
        total: usize,
    ) -> Result<StepOutcome, StepFailure> {
        let host = self.pool.host();

        match kind {
            StepKind::Countdown(duration) => {
                self.countdown(*duration, index, total).await;
                Ok(StepOutcome::Done)
            }
            StepKind::Pause(duration) => {
                pause(*duration).await;
                Ok(StepOutcome::Done)
            }
            StepKind::OpenWorkers {
                urls,
                count_per_url,
            } => {
                let opened = self
                    .pool
                    .open_batch(urls, *count_per_url)
                    .await
                    .map_err(|e| StepFailure::Fatal(EngineError::WorkerCreation(e)))?;
                ctx.report.workers_opened += opened.len();
                ctx.workers.extend(opened);
                Ok(StepOutcome::Done)
            }
            StepKind::OpenSingle { url, active } => {
                let worker = self
                    .pool
                    .open_single(url, *active)
                    .await
                    .map_err(|e| StepFailure::Fatal(EngineError::WorkerCreation(e)))?;
                ctx.report.workers_opened += 1;
                ctx.workers.push(worker);
                Ok(StepOutcome::Done)
            }
            StepKind::Navigate { url } => {
                let worker = ctx.designated()?;
                host.navigate(&worker, url).await?;
                Ok(StepOutcome::Done)
            }
            StepKind::AwaitLoad {
                initial_delay,
                poll,
                ceiling,
            } => {
                let worker = ctx.designated()?;
                let poll = (*poll).max(Duration::from_millis(1));
                let wait = async {
                    pause(*initial_delay).await;
                    loop {
                        match host.load_status(&worker).await {
                            Ok(LoadStatus::Complete) => break,
                            Ok(_) => {}
                            Err(e) => debug!(worker = %worker, error = %e, "Load status unavailable"),
                        }
                        tokio::time::sleep(poll).await;
                    }
                };
                match tokio::time::timeout(*ceiling, wait).await {
                    Ok(()) => Ok(StepOutcome::Done),
                    Err(_) => Ok(StepOutcome::Degraded {
                        detail: format!("page still loading after {}ms", ceiling.as_millis()),
                    }),
                }
            }
            StepKind::ReloadAll => {
                self.pool.reload_all(&ctx.workers).await;
                Ok(StepOutcome::Done)
            }
            StepKind::CloseAll => {
                // Workers from a partially failed batch live only in the registry.
                let mut workers = std::mem::take(&mut ctx.workers);
                for id in self.pool.registry().snapshot() {
                    if !workers.contains(&id) {
                        workers.push(id);
                    }
                }
                self.pool.close_all(&workers).await;
                Ok(StepOutcome::Done)
            }
            StepKind::ActOnAll { action, summary } => {
                let (_, tally) = self.executor.act_on_all(&ctx.workers, action).await;
                if let Some(template) = summary {
                    let message = template
                        .replace("{succeeded}", &tally.succeeded.to_string())
                        .replace("{failed}", &tally.failed.to_string())
                        .replace("{total}", &tally.total.to_string());
                    self.publish(message, index, total);
                }
                Ok(StepOutcome::Actions {
                    target: action.target.clone(),
                    summary: tally,
                })
            }
            StepKind::ClickFirst { attempts, success } => {
                let worker = ctx.designated()?;
                let mut last_detail = "no discovery targets".to_string();
                for attempt in attempts {
                    if let Some(message) = &attempt.announce {
                        self.publish(message.clone(), index, total);
                    }
                    pause(attempt.delay_before).await;
                    match self
                        .executor
                        .discover_and_click(&worker, &attempt.target)
                        .await
                    {
                        Ok(Some(strategy)) => {
                            debug!(discovery_target = %attempt.target, strategy, "Discovery click succeeded");
                            if let Some(message) = success {
                                self.publish(message.clone(), index, total);
                            }
                            return Ok(StepOutcome::Done);
                        }
                        Ok(None) => last_detail = format!("'{}' not found", attempt.target),
                        Err(e) => last_detail = e.to_string(),
                    }
                }
                Err(StepFailure::Failed(last_detail))
            }
            StepKind::ExtractCount { patterns } => {
                let worker = ctx.designated()?;
                match self.executor.extract_count(&worker, patterns).await? {
                    Some(count) => {
                        ctx.report.questions_left = Some(count);
                        self.publish(format!("📊 Questions left: {count}"), index, total);
                        Ok(StepOutcome::Done)
                    }
                    None => Err(StepFailure::Failed("count not found on page".to_string())),
                }
            }
            StepKind::ExtractDocument {
                extractor,
                policy,
                nested_pointer,
            } => {
                let worker = ctx.designated()?;
                let command_id = ctx.command_id;
                let mut document = crate::extraction::extract_with_retry(
                    &**host,
                    &worker,
                    extractor.as_ref(),
                    *policy,
                    |attempt, max| {
                        let message = format!("Extracting Data (attempt {attempt}/{max})...");
                        if let (Some(reporter), Some(id)) = (&self.reporter, command_id) {
                            reporter.report(id, CommandStatus::Processing, &message);
                        }
                        self.publish(message, index, total);
                    },
                )
                .await
                .map_err(StepFailure::Extraction)?;

                if let Some(pointer) = nested_pointer {
                    match attach_nested_document(&mut document, pointer) {
                        NestedDocument::Attached => {
                            ctx.report.annotations.push("nested document converted".into());
                        }
                        NestedDocument::Failed(e) => {
                            ctx.report
                                .annotations
                                .push(format!("nested document conversion failed: {e}"));
                        }
                        NestedDocument::Absent => {}
                    }
                }
                ctx.report.document = Some(document);
                Ok(StepOutcome::Done)
            }
            StepKind::Report(spec) => self.report(spec, ctx),
            StepKind::DismissStatus { delay } => {
                let worker = ctx.designated()?;
                let host = host.clone();
                let delay = *delay;
                tokio::spawn(async move {
                    pause(delay).await;
                    if let Err(e) = host.send_to_session(&worker, AgentMessage::HideStatus).await {
                        debug!(worker = %worker, error = %e, "Hiding status overlay failed");
                    }
                });
                Ok(StepOutcome::Done)
            }
        }
    }

    fn report(&self, spec: &ReportSpec, ctx: &RunContext<'_>) -> Result<StepOutcome, StepFailure> {
        let Some(reporter) = &self.reporter else {
            return Ok(StepOutcome::Degraded {
                detail: "no reporter configured".to_string(),
            });
        };
        match spec {
            ReportSpec::QuestionsLeft => {
                match (ctx.report.questions_left, self.instance_id.as_deref()) {
                    (Some(count), Some(instance_id)) => {
                        reporter.questions_left(instance_id, count);
                        Ok(StepOutcome::Done)
                    }
                    _ => Ok(StepOutcome::Degraded {
                        detail: "no count to report".to_string(),
                    }),
                }
            }
            ReportSpec::CommandProgress(detail) => {
                if let Some(id) = ctx.command_id {
                    reporter.report(id, CommandStatus::Processing, detail);
                }
                Ok(StepOutcome::Done)
            }
        }
    }

    async fn countdown(&self, duration: Duration, index: usize, total: usize) {
        let mut remaining = duration.as_secs();
        while remaining > 0 {
            self.publish(format!("⏳ Waiting {remaining} seconds..."), index, total);
            tokio::time::sleep(Duration::from_secs(1)).await;
            remaining -= 1;
        }
        pause(Duration::from_nanos(u64::from(duration.subsec_nanos()))).await;
    }
}
