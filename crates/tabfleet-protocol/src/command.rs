// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Queued commands and their lifecycle statuses.
//!
//! The control plane is loose about types: ids arrive as numbers or strings,
//! `parameters` may be a JSON object, a JSON-encoded string, or null. The
//! raw form mirrors that looseness and [`RawCommand::parse`] produces a
//! strongly typed [`Command`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::MalformedCommand;

/// Default number of workers opened per target URL when a batch command
/// does not specify a count.
pub const DEFAULT_BATCH_COUNT: i64 = 5;

/// Action name reported for entries without a usable action tag.
pub const MISSING_ACTION: &str = "(missing)";

/// Lifecycle status of a command as reported back to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// Queued, not yet picked up.
    Pending,
    /// Picked up by an orchestrator.
    Processing,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Failed,
}

impl CommandStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Processing => "processing",
            CommandStatus::Success => "success",
            CommandStatus::Failed => "failed",
        }
    }

    /// Whether no further status change is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Success | CommandStatus::Failed)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command exactly as the control plane delivers it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawCommand {
    /// Opaque command id; empty when the entry carried none.
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    /// Action tag, e.g. `post` or `unblur`; empty when absent or not text.
    #[serde(default, deserialize_with = "lenient_action")]
    pub action: String,
    /// Action parameters in whatever shape the control plane stored them.
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// A parsed command ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Opaque command id, echoed in status reports.
    pub id: String,
    /// What to do.
    pub action: CommandAction,
}

/// The closed set of actions an orchestrator understands.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandAction {
    /// Open workers against one or more URLs and drive the fan-out workflow.
    OpenBatch(OpenBatchParams),
    /// Drive the subscription-restart workflow in a single worker.
    Resubscribe(ResubscribeParams),
    /// Extract a structured document from a single page.
    UnblurExtract(UnblurParams),
    /// Open one active session.
    OpenSingleUrl(OpenUrlParams),
    /// Close every non-pinned session.
    CloseAll,
    /// Shut down the browser process.
    CloseProcess,
    /// Clear credentials and stop polling.
    Logout,
    /// Liveness probe.
    Ping,
    /// An action tag this orchestrator does not know.
    Unknown(String),
}

impl CommandAction {
    /// Canonical name used in logs.
    pub fn name(&self) -> &str {
        match self {
            CommandAction::OpenBatch(_) => "open-batch",
            CommandAction::Resubscribe(_) => "resubscribe",
            CommandAction::UnblurExtract(_) => "unblur-extract",
            CommandAction::OpenSingleUrl(_) => "open-single-url",
            CommandAction::CloseAll => "close-all",
            CommandAction::CloseProcess => "close-process",
            CommandAction::Logout => "logout",
            CommandAction::Ping => "ping",
            CommandAction::Unknown(tag) => tag,
        }
    }
}

/// Parameters for [`CommandAction::OpenBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenBatchParams {
    /// Target URLs, never empty.
    pub urls: Vec<String>,
    /// Requested workers per URL, unclamped.
    pub count: i64,
}

/// Parameters for [`CommandAction::Resubscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResubscribeParams {
    /// Override for the first page of the sequence.
    pub url: Option<String>,
}

/// Parameters for [`CommandAction::UnblurExtract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnblurParams {
    /// Page to extract from.
    pub url: String,
    /// Queue entry to complete once the extraction settles.
    pub queue_id: Option<String>,
}

/// Parameters for [`CommandAction::OpenSingleUrl`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpenUrlParams {
    /// URL to open; the orchestrator picks a default when absent.
    pub url: Option<String>,
}

impl RawCommand {
    /// Build a raw command, mostly useful in tests.
    pub fn new(id: impl Into<String>, action: impl Into<String>, parameters: Value) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            parameters: Some(parameters),
        }
    }

    /// Best-effort `queue_id` from the parameters, even when the command
    /// does not parse.
    pub fn queue_id(&self) -> Option<String> {
        self.parameter_map()
            .ok()?
            .get("queue_id")
            .and_then(scalar_to_string)
    }

    /// Whether the tag names the document extraction action.
    pub fn is_extraction(&self) -> bool {
        matches!(self.action.as_str(), "unblur" | "unblur-extract")
    }

    /// Decode the parameters object, accepting JSON-encoded strings and null.
    fn parameter_map(&self) -> Result<serde_json::Map<String, Value>, MalformedCommand> {
        match &self.parameters {
            None | Some(Value::Null) => Ok(serde_json::Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(serde_json::Map::new()),
            Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(Value::Null) => Ok(serde_json::Map::new()),
                Ok(_) => Err(MalformedCommand::new(
                    &self.action,
                    "parameters must be a JSON object",
                )),
                Err(e) => Err(MalformedCommand::new(
                    &self.action,
                    format!("parameters are not valid JSON: {e}"),
                )),
            },
            Some(_) => Err(MalformedCommand::new(
                &self.action,
                "parameters must be a JSON object",
            )),
        }
    }

    /// Turn the wire form into a typed [`Command`].
    pub fn parse(&self) -> Result<Command, MalformedCommand> {
        if self.action.trim().is_empty() {
            return Err(MalformedCommand::new(
                MISSING_ACTION,
                "'action' is missing or not a string",
            ));
        }
        let params = self.parameter_map()?;

        let action = match self.action.as_str() {
            "post" | "open-batch" => {
                let mut urls: Vec<String> = match params.get("urls") {
                    Some(Value::Array(items)) => items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                    _ => Vec::new(),
                };
                if urls.is_empty() {
                    urls.extend(non_empty_str(&params, "url"));
                }
                if urls.is_empty() {
                    return Err(MalformedCommand::new(
                        &self.action,
                        "either 'url' or a non-empty 'urls' list is required",
                    ));
                }
                let count = match params.get("count") {
                    None | Some(Value::Null) => DEFAULT_BATCH_COUNT,
                    Some(v) => integer(v).ok_or_else(|| {
                        MalformedCommand::new(&self.action, "'count' must be an integer")
                    })?,
                };
                CommandAction::OpenBatch(OpenBatchParams { urls, count })
            }
            "resubscribe" => CommandAction::Resubscribe(ResubscribeParams {
                url: non_empty_str(&params, "url"),
            }),
            "unblur" | "unblur-extract" => {
                let url = non_empty_str(&params, "url").ok_or_else(|| {
                    MalformedCommand::new(&self.action, "'url' is required")
                })?;
                let queue_id = params.get("queue_id").and_then(scalar_to_string);
                CommandAction::UnblurExtract(UnblurParams { url, queue_id })
            }
            "openBrowser" | "open-single-url" => CommandAction::OpenSingleUrl(OpenUrlParams {
                url: non_empty_str(&params, "url"),
            }),
            "closeAllTabs" | "close-all" => CommandAction::CloseAll,
            "closeBrowser" | "close-process" => CommandAction::CloseProcess,
            "logout" => CommandAction::Logout,
            "ping" => CommandAction::Ping,
            other => CommandAction::Unknown(other.to_string()),
        };

        Ok(Command {
            id: self.id.clone(),
            action,
        })
    }
}

fn non_empty_str(params: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn lenient_action<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(CommandStatus::Processing.as_str(), "processing");
        assert_eq!(CommandStatus::Failed.to_string(), "failed");
        assert!(CommandStatus::Success.is_terminal());
        assert!(!CommandStatus::Pending.is_terminal());
    }

    #[test]
    fn test_raw_command_accepts_numeric_id_and_string_parameters() {
        let raw: RawCommand = serde_json::from_value(json!({
            "id": 42,
            "action": "post",
            "parameters": "{\"url\":\"https://example.com/q\",\"count\":\"3\"}"
        }))
        .unwrap();

        assert_eq!(raw.id, "42");
        let cmd = raw.parse().unwrap();
        assert_eq!(
            cmd.action,
            CommandAction::OpenBatch(OpenBatchParams {
                urls: vec!["https://example.com/q".to_string()],
                count: 3,
            })
        );
    }

    #[test]
    fn test_raw_command_tolerates_bad_id_and_action() {
        let raw: RawCommand = serde_json::from_value(json!({
            "id": 9,
            "action": null,
            "parameters": "{\"queue_id\": 77}"
        }))
        .unwrap();
        assert_eq!(raw.id, "9");
        assert_eq!(raw.action, "");
        assert_eq!(
            raw.parse().unwrap_err().to_string(),
            "malformed '(missing)' command: 'action' is missing or not a string"
        );
        assert_eq!(raw.queue_id().as_deref(), Some("77"));

        let raw: RawCommand = serde_json::from_value(json!({ "action": 5 })).unwrap();
        assert_eq!(raw.id, "");
        assert_eq!(raw.action, "");
    }

    #[test]
    fn test_queue_id_survives_malformed_extraction() {
        let raw = RawCommand::new("1", "unblur", json!({ "queue_id": 77 }));
        assert!(raw.is_extraction());
        assert!(raw.parse().is_err());
        assert_eq!(raw.queue_id().as_deref(), Some("77"));

        let raw = RawCommand::new("2", "ping", json!({}));
        assert!(!raw.is_extraction());
        assert_eq!(raw.queue_id(), None);
    }

    #[test]
    fn test_open_batch_prefers_url_list_and_defaults_count() {
        let raw = RawCommand::new(
            "1",
            "open-batch",
            json!({ "url": "https://ignored", "urls": ["https://a", " ", "https://b"] }),
        );
        match raw.parse().unwrap().action {
            CommandAction::OpenBatch(p) => {
                assert_eq!(p.urls, vec!["https://a", "https://b"]);
                assert_eq!(p.count, DEFAULT_BATCH_COUNT);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_open_batch_without_targets_is_malformed() {
        let raw = RawCommand::new("1", "post", json!({ "count": 2 }));
        let err = raw.parse().unwrap_err();
        assert_eq!(err.action, "post");
        assert!(err.to_string().contains("'url'"));
    }

    #[test]
    fn test_unblur_queue_id_may_be_numeric() {
        let raw = RawCommand::new(
            "9",
            "unblur",
            json!({ "url": "https://example.com/question/1", "queue_id": 77 }),
        );
        assert_eq!(
            raw.parse().unwrap().action,
            CommandAction::UnblurExtract(UnblurParams {
                url: "https://example.com/question/1".to_string(),
                queue_id: Some("77".to_string()),
            })
        );
    }

    #[test]
    fn test_unblur_requires_url() {
        let raw = RawCommand::new("9", "unblur-extract", Value::Null);
        assert!(raw.parse().is_err());
    }

    #[test]
    fn test_simple_actions_and_aliases() {
        let cases = [
            ("closeAllTabs", CommandAction::CloseAll),
            ("close-all", CommandAction::CloseAll),
            ("closeBrowser", CommandAction::CloseProcess),
            ("close-process", CommandAction::CloseProcess),
            ("logout", CommandAction::Logout),
            ("ping", CommandAction::Ping),
        ];
        for (tag, expected) in cases {
            let raw = RawCommand {
                id: "x".to_string(),
                action: tag.to_string(),
                parameters: None,
            };
            assert_eq!(raw.parse().unwrap().action, expected, "tag {tag}");
        }
    }

    #[test]
    fn test_unknown_action_is_preserved() {
        let raw = RawCommand::new("5", "dance", json!({}));
        let cmd = raw.parse().unwrap();
        assert_eq!(cmd.action, CommandAction::Unknown("dance".to_string()));
        assert_eq!(cmd.action.name(), "dance");
    }

    #[test]
    fn test_non_object_parameters_are_rejected() {
        let raw = RawCommand::new("5", "resubscribe", json!([1, 2]));
        assert!(raw.parse().is_err());

        let raw = RawCommand::new("5", "resubscribe", json!("not json"));
        assert!(raw.parse().is_err());
    }
}
