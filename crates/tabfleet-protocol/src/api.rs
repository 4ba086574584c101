// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Response bodies and small request vocabularies.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::command::RawCommand;

/// Body of `getPendingCommands`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PendingCommandsResponse {
    /// Whether the lookup succeeded.
    #[serde(default)]
    pub success: bool,
    /// Pending commands, oldest first. Entries that are not objects are
    /// dropped.
    #[serde(default, deserialize_with = "decodable_commands")]
    pub commands: Vec<RawCommand>,
    /// Diagnostic message on failure.
    #[serde(default)]
    pub message: Option<String>,
}

fn decodable_commands<'de, D>(deserializer: D) -> Result<Vec<RawCommand>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawCommand>(entry) {
            Ok(command) => Some(command),
            Err(e) => {
                warn!(error = %e, "Dropping undecodable pending command");
                None
            }
        })
        .collect())
}

/// Body of `autoRegister`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RegisterResponse {
    /// Whether the profile was registered.
    #[serde(default)]
    pub success: bool,
    /// Assigned profile id, numeric or textual.
    #[serde(default)]
    pub id: Option<Value>,
    /// Diagnostic message.
    #[serde(default)]
    pub message: Option<String>,
}

impl RegisterResponse {
    /// The assigned profile id as text.
    pub fn profile_id(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// How a queue-backed command settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Result payload delivered.
    Completed,
    /// Failure message delivered.
    Failed,
}

impl QueueOutcome {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueOutcome::Completed => "completed",
            QueueOutcome::Failed => "failed",
        }
    }
}

/// Who is asking for pending commands.
///
/// A registered instance polls by its instance id; before an identity
/// exists the orchestrator falls back to its extension id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollIdentity {
    /// Persisted instance id.
    Instance(String),
    /// Static extension id.
    Extension(String),
}

impl PollIdentity {
    /// Query parameter pair for the lookup.
    pub fn query_pair(&self) -> (&'static str, &str) {
        match self {
            PollIdentity::Instance(id) => ("instance_id", id),
            PollIdentity::Extension(id) => ("extension_id", id),
        }
    }
}
