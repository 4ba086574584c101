// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker pool management.
//!
//! A worker is one browser session owned by the current workflow run. The
//! pool opens workers in bulk, reloads and closes them best-effort, and
//! tracks membership in a shared [`WorkerRegistry`] so status broadcasts
//! and cleanup know which sessions belong to the run.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::session::{SessionError, SessionHost, WorkerId};
use crate::state::StateStore;

/// Upper bound on workers opened per target URL.
pub const MAX_WORKERS_PER_TARGET: usize = 10;

/// URL of the placeholder session left behind by a sweep.
pub const BLANK_URL: &str = "about:blank";

/// Clamp a requested worker count to `[1, MAX_WORKERS_PER_TARGET]`.
pub fn clamp_worker_count(requested: i64) -> usize {
    requested.clamp(1, MAX_WORKERS_PER_TARGET as i64) as usize
}

/// Shared membership list of the workers a run controls.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    workers: Arc<Mutex<Vec<WorkerId>>>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WorkerId>> {
        self.workers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add workers, skipping ones already present.
    pub fn extend(&self, ids: impl IntoIterator<Item = WorkerId>) {
        let mut workers = self.lock();
        for id in ids {
            if !workers.contains(&id) {
                workers.push(id);
            }
        }
    }

    /// Remove a worker.
    pub fn remove(&self, id: &WorkerId) {
        self.lock().retain(|w| w != id);
    }

    /// Forget every worker.
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Current members in insertion order.
    pub fn snapshot(&self) -> Vec<WorkerId> {
        self.lock().clone()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &WorkerId) -> bool {
        self.lock().contains(id)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Outcome of [`WorkerPool::close_everything_except_pinned`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Sessions closed.
    pub closed: usize,
    /// Sessions whose close call failed.
    pub failed: usize,
    /// Placeholder session opened before closing.
    pub blank: Option<WorkerId>,
}

/// Opens, reloads and closes workers through a [`SessionHost`].
#[derive(Clone)]
pub struct WorkerPool {
    host: Arc<dyn SessionHost>,
    registry: WorkerRegistry,
    state: Option<Arc<StateStore>>,
}

impl WorkerPool {
    /// Create a pool over `host` tracking members in `registry`.
    pub fn new(host: Arc<dyn SessionHost>, registry: WorkerRegistry) -> Self {
        Self {
            host,
            registry,
            state: None,
        }
    }

    /// Mirror registry membership into persisted state.
    pub fn with_state_store(mut self, state: Arc<StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// The session host.
    pub fn host(&self) -> &Arc<dyn SessionHost> {
        &self.host
    }

    /// The membership registry.
    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Forget every member.
    pub async fn reset_registry(&self) {
        self.registry.reset();
        self.sync_state().await;
    }

    async fn sync_state(&self) {
        if let Some(state) = &self.state {
            if let Err(e) = state.set_controlled_workers(self.registry.snapshot()).await {
                warn!(error = %e, "Failed to persist controlled workers");
            }
        }
    }

    /// Open `count` background workers at `url`.
    pub async fn open_many(&self, url: &str, count: i64) -> Result<Vec<WorkerId>, SessionError> {
        self.open_batch(&[url.to_string()], count).await
    }

    /// Open `count_per_url` background workers for every URL, concurrently.
    ///
    /// The returned ids are ordered URL-major. Successfully created workers
    /// join the registry even when another creation fails, so a later sweep
    /// can close them; the first failure is returned.
    pub async fn open_batch(
        &self,
        urls: &[String],
        count_per_url: i64,
    ) -> Result<Vec<WorkerId>, SessionError> {
        let per_url = clamp_worker_count(count_per_url);
        info!(
            urls = urls.len(),
            per_url,
            requested = count_per_url,
            "Opening workers"
        );

        let creations = urls.iter().flat_map(|url| {
            (0..per_url).map(move |_| self.host.create_session(url, false))
        });
        let results = join_all(creations).await;

        let mut opened = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(id) => opened.push(id),
                Err(e) => {
                    warn!(error = %e, "Worker creation failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        self.registry.extend(opened.iter().cloned());
        self.sync_state().await;

        match first_error {
            Some(e) => Err(e),
            None => Ok(opened),
        }
    }

    /// Open one worker, optionally focused.
    pub async fn open_single(&self, url: &str, active: bool) -> Result<WorkerId, SessionError> {
        let id = self.host.create_session(url, active).await?;
        self.registry.extend([id.clone()]);
        self.sync_state().await;
        Ok(id)
    }

    /// Reload workers one after another. Failures are logged and skipped.
    /// Returns how many reloads succeeded.
    pub async fn reload_all(&self, workers: &[WorkerId]) -> usize {
        let mut reloaded = 0;
        for worker in workers {
            match self.host.reload(worker).await {
                Ok(()) => reloaded += 1,
                Err(e) => debug!(worker = %worker, error = %e, "Reload failed"),
            }
        }
        reloaded
    }

    /// Close workers best-effort and drop them from the registry. Returns
    /// how many closes succeeded.
    pub async fn close_all(&self, workers: &[WorkerId]) -> usize {
        let mut closed = 0;
        for worker in workers {
            match self.host.close(worker).await {
                Ok(()) => closed += 1,
                Err(e) => debug!(worker = %worker, error = %e, "Close failed"),
            }
            self.registry.remove(worker);
        }
        self.sync_state().await;
        closed
    }

    /// Close every non-pinned session the host holds.
    ///
    /// A blank session is opened first so the browser process never drops
    /// to zero sessions. Pinned sessions are left alone.
    pub async fn close_everything_except_pinned(&self) -> Result<SweepSummary, SessionError> {
        let sessions = self.host.list_sessions().await?;
        let targets: Vec<WorkerId> = sessions
            .iter()
            .filter(|s| !s.pinned)
            .map(|s| s.id.clone())
            .collect();

        let mut summary = SweepSummary::default();
        if targets.is_empty() && !sessions.is_empty() {
            return Ok(summary);
        }

        summary.blank = Some(self.host.create_session(BLANK_URL, true).await?);

        let results = join_all(targets.iter().map(|id| self.host.close(id))).await;
        for (id, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => summary.closed += 1,
                Err(e) => {
                    summary.failed += 1;
                    debug!(worker = %id, error = %e, "Sweep close failed");
                }
            }
        }

        self.reset_registry().await;
        info!(
            closed = summary.closed,
            failed = summary.failed,
            "Closed all non-pinned sessions"
        );
        Ok(summary)
    }
}
