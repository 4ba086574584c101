// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tabfleet control-plane protocol.
//!
//! Wire types and an HTTP client for the remote control plane that queues
//! commands for an orchestrator instance and receives status reports back.
//!
//! The control plane speaks a small form-encoded dialect:
//!
//! - `GET  {api}?action=getPendingCommands&instance_id=...` returns
//!   `{ "success": true, "commands": [...] }`
//! - `POST {api}` with `action=updateCommandStatus|updateQuestionsLeft|heartbeat|autoRegister`
//! - `POST {queue_api}` with `action=completeUnblur` for queue-backed commands
//!
//! Commands arrive as [`RawCommand`] values and are turned into typed
//! [`Command`] values by [`RawCommand::parse`]. All outbound traffic goes
//! through the [`ControlPlane`] trait so orchestrator code can be tested
//! against an in-memory recorder.

pub mod api;
pub mod client;
pub mod command;
pub mod error;

pub use api::{PendingCommandsResponse, PollIdentity, QueueOutcome, RegisterResponse};
pub use client::{ClientConfig, ControlPlane, HttpControlPlane};
pub use command::{
    Command, CommandAction, CommandStatus, MISSING_ACTION, OpenBatchParams, OpenUrlParams,
    RawCommand, ResubscribeParams, UnblurParams,
};
pub use error::{ClientError, MalformedCommand};
