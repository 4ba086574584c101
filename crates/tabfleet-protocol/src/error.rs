// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tabfleet-protocol.

use thiserror::Error;

/// Result type using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors from talking to the control plane.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or TLS failure before a response was read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The control plane answered with a non-success HTTP status.
    #[error("control plane returned HTTP {status}")]
    Status { status: u16 },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Client configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// A queued command whose parameters cannot drive any workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed '{action}' command: {reason}")]
pub struct MalformedCommand {
    /// The wire action tag.
    pub action: String,
    /// What is wrong with the parameters.
    pub reason: String,
}

impl MalformedCommand {
    pub(crate) fn new(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            reason: reason.into(),
        }
    }
}
