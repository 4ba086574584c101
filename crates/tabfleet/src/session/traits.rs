// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session host trait definitions.
//!
//! A session host owns browser sessions (tabs). The orchestrator never
//! reaches into a page directly: it asks the host to create, reload or
//! close sessions, to run one of a fixed set of routines inside a page, and
//! to deliver messages to the cooperating agent script when one is present.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors from session host operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The session does not exist (already closed or never created).
    #[error("Session not found: {0}")]
    NotFound(WorkerId),

    /// The host refused to create a session.
    #[error("Failed to create session for {url}: {reason}")]
    CreationFailed {
        /// Requested URL.
        url: String,
        /// Host-provided reason.
        reason: String,
    },

    /// A routine raised inside the page.
    #[error("Routine failed: {0}")]
    Routine(String),

    /// The host call did not finish in time.
    #[error("Session host timed out after {0}ms")]
    Timeout(u64),

    /// Transport to the host failed.
    #[error("Session host unreachable: {0}")]
    Transport(String),

    /// The host answered with something unexpected.
    #[error("Unexpected host response: {0}")]
    Protocol(String),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Opaque handle of one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Wrap a host-assigned id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for WorkerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Page load progress as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    /// Host does not know.
    Unknown,
    /// Navigation in flight.
    #[serde(alias = "pending")]
    Loading,
    /// Document finished loading.
    Complete,
}

/// A session as listed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session handle.
    pub id: WorkerId,
    /// Pinned sessions belong to the user and are never swept.
    #[serde(default)]
    pub pinned: bool,
}

/// One interactive element captured by [`Routine::Snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    /// Position in document order; [`Routine::Click`] addresses this index.
    pub index: usize,
    /// Lowercase tag name.
    pub tag: String,
    /// Trimmed text content.
    #[serde(default)]
    pub text: String,
    /// Selected attributes such as `data-test`.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// `aria-label`, when present.
    #[serde(default)]
    pub aria_label: Option<String>,
    /// `role`, when present.
    #[serde(default)]
    pub role: Option<String>,
}

impl ElementInfo {
    /// Attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Interactive elements of a page, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Page URL at capture time.
    #[serde(default)]
    pub url: String,
    /// Buttons, links and other clickable candidates.
    #[serde(default)]
    pub elements: Vec<ElementInfo>,
}

/// The fixed set of routines a host can run inside a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Routine {
    /// Capture a [`PageSnapshot`].
    Snapshot,
    /// Click the element at the given snapshot index. Yields `true` when
    /// the element still existed.
    Click {
        /// Snapshot index.
        element: usize,
    },
    /// Visible text of the document body.
    VisibleText,
    /// Evaluate a function expression in the page's main world with the
    /// given arguments. Promises are awaited.
    Script {
        /// Function expression source.
        source: String,
        /// Call arguments.
        #[serde(default)]
        args: Vec<Value>,
    },
}

/// Messages understood by the cooperating agent script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AgentMessage {
    /// Click the `index`-th element matching `selector`.
    ClickButton {
        /// Semantic target label such as `Ask an expert`.
        selector: String,
        /// Which match to click.
        index: usize,
    },
    /// Show a progress line in the page overlay.
    UpdateStatus {
        /// Text to display.
        message: String,
        /// Current step.
        step: usize,
        /// Step count.
        total: usize,
    },
    /// Hide the page overlay.
    HideStatus,
}

/// Reply of the agent script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    /// Whether the agent performed the request.
    #[serde(default)]
    pub success: bool,
    /// Optional detail.
    #[serde(default)]
    pub message: Option<String>,
}

/// Trait for session hosts.
///
/// Implementations must tolerate calls on sessions that disappeared
/// underneath them by returning [`SessionError::NotFound`].
#[async_trait]
pub trait SessionHost: Send + Sync {
    /// Host type identifier (e.g. "bridge", "mock").
    fn host_type(&self) -> &'static str;

    /// Open a new session at `url`.
    async fn create_session(&self, url: &str, active: bool) -> Result<WorkerId>;

    /// Reload a session.
    async fn reload(&self, worker: &WorkerId) -> Result<()>;

    /// Navigate a session to another URL.
    async fn navigate(&self, worker: &WorkerId, url: &str) -> Result<()>;

    /// Close a session.
    async fn close(&self, worker: &WorkerId) -> Result<()>;

    /// Current load status of a session.
    async fn load_status(&self, worker: &WorkerId) -> Result<LoadStatus>;

    /// Run a routine inside the session's page.
    async fn run_in_session(&self, worker: &WorkerId, routine: Routine) -> Result<Value>;

    /// Deliver a message to the agent script. `Ok(None)` means no agent is
    /// listening in that session.
    async fn send_to_session(
        &self,
        worker: &WorkerId,
        message: AgentMessage,
    ) -> Result<Option<AgentReply>>;

    /// All sessions the host currently holds.
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>>;

    /// Keep the host process from idling out.
    async fn keep_alive(&self) -> Result<()>;

    /// Shut down the browser process.
    async fn close_process(&self) -> Result<()>;
}

/// Typed wrappers over [`SessionHost::run_in_session`].
#[async_trait]
pub trait SessionHostExt: SessionHost {
    /// Capture the interactive elements of a page.
    async fn snapshot(&self, worker: &WorkerId) -> Result<PageSnapshot> {
        let value = self.run_in_session(worker, Routine::Snapshot).await?;
        serde_json::from_value(value).map_err(|e| SessionError::Protocol(e.to_string()))
    }

    /// Click a snapshot element. Returns whether the element was found.
    async fn click(&self, worker: &WorkerId, element: usize) -> Result<bool> {
        let value = self
            .run_in_session(worker, Routine::Click { element })
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Visible text of a page.
    async fn visible_text(&self, worker: &WorkerId) -> Result<String> {
        let value = self.run_in_session(worker, Routine::VisibleText).await?;
        match value {
            Value::String(text) => Ok(text),
            Value::Null => Ok(String::new()),
            other => Err(SessionError::Protocol(format!(
                "visible text must be a string, got {other}"
            ))),
        }
    }
}

impl<T: SessionHost + ?Sized> SessionHostExt for T {}
