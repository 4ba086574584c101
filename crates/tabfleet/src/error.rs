// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tabfleet.

use thiserror::Error;

/// Orchestrator errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Control-plane call failed.
    #[error("Control plane error: {0}")]
    ControlPlane(#[from] tabfleet_protocol::ClientError),

    /// A queued command could not be interpreted.
    #[error(transparent)]
    Malformed(#[from] tabfleet_protocol::MalformedCommand),

    /// Session host call failed.
    #[error(transparent)]
    Session(#[from] crate::session::SessionError),

    /// Workflow run failed. Displays exactly the run's error message.
    #[error(transparent)]
    Engine(#[from] crate::engine::EngineError),

    /// Persisted state could not be read or written.
    #[error("State error: {0}")]
    State(#[from] crate::state::StateError),

    /// A command handler panicked.
    #[error("Command handler panicked: {0}")]
    Panicked(String),
}

/// Result type using tabfleet Error.
pub type Result<T> = std::result::Result<T, Error>;
