// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persisted orchestrator state.
//!
//! A small JSON document under the data directory holds the instance
//! identity, registration outcome, credentials and the set of workers the
//! current run controls. Writes go through a temporary file and a rename so
//! a crash never leaves a truncated document behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::WorkerId;

/// State persistence errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Reading or writing the state file failed.
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The state file is not valid JSON.
    #[error("state file is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    /// The blocking write task did not complete.
    #[error("state write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    /// Stable instance identity, `inst_` prefixed.
    pub instance_id: Option<String>,
    /// Profile id assigned by the control plane.
    pub profile_id: Option<String>,
    /// Profile name used at registration.
    pub profile_name: Option<String>,
    /// Whether auto-registration has completed.
    pub auto_registered: bool,
    /// Access token for the control plane, cleared on logout.
    pub access_token: Option<String>,
    /// Workers owned by the run in progress.
    pub controlled_workers: Vec<WorkerId>,
}

impl PersistedState {
    /// Whether registration has completed and heartbeats can be sent.
    pub fn is_registered(&self) -> bool {
        self.auto_registered && self.profile_id.is_some()
    }
}

/// Async store over [`PersistedState`].
#[derive(Debug)]
pub struct StateStore {
    path: Option<PathBuf>,
    state: Mutex<PersistedState>,
}

impl StateStore {
    /// Open the store at `path`, starting empty when the file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "Opened state store");
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(PersistedState::default()),
        }
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> PersistedState {
        self.state.lock().await.clone()
    }

    /// The instance id, if one has been generated.
    pub async fn instance_id(&self) -> Option<String> {
        self.state.lock().await.instance_id.clone()
    }

    /// Return the instance id, generating and persisting one on first use.
    pub async fn ensure_instance_id(&self) -> Result<String, StateError> {
        let mut state = self.state.lock().await;
        if let Some(id) = &state.instance_id {
            return Ok(id.clone());
        }
        let id = generate_instance_id();
        state.instance_id = Some(id.clone());
        self.persist(&state).await?;
        info!(instance_id = %id, "Generated instance id");
        Ok(id)
    }

    /// Record a successful auto-registration.
    pub async fn record_registration(
        &self,
        profile_id: String,
        profile_name: String,
    ) -> Result<(), StateError> {
        let mut state = self.state.lock().await;
        state.profile_id = Some(profile_id);
        state.profile_name = Some(profile_name);
        state.auto_registered = true;
        self.persist(&state).await
    }

    /// Store or clear the access token.
    pub async fn set_access_token(&self, token: Option<String>) -> Result<(), StateError> {
        let mut state = self.state.lock().await;
        state.access_token = token;
        self.persist(&state).await
    }

    /// Replace the controlled worker set.
    pub async fn set_controlled_workers(&self, workers: Vec<WorkerId>) -> Result<(), StateError> {
        let mut state = self.state.lock().await;
        if state.controlled_workers == workers {
            return Ok(());
        }
        state.controlled_workers = workers;
        self.persist(&state).await
    }

    /// Drop the access token and profile name. Identity and registration
    /// survive so a later login reuses them.
    pub async fn clear_credentials(&self) -> Result<(), StateError> {
        let mut state = self.state.lock().await;
        state.access_token = None;
        state.profile_name = None;
        self.persist(&state).await
    }

    async fn persist(&self, state: &PersistedState) -> Result<(), StateError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(state)?;
        tokio::task::spawn_blocking(move || atomic_write(&path, &bytes)).await??;
        Ok(())
    }
}

/// Write through a uniquely named sibling temp file, synced before rename.
fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.flush()?;
    temp.as_file_mut().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// New instance id: `inst_`, nine random characters, then the current
/// time in milliseconds as base 36.
pub fn generate_instance_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    format!("inst_{}{}", &random[..9], to_base36(millis))
}

/// Profile name derived from an instance id.
pub fn default_profile_name(instance_id: &str) -> String {
    let tag: String = instance_id.chars().skip(5).take(6).collect();
    format!("Profile-{tag}")
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
