// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tabfleet - command-driven orchestrator for ephemeral browser sessions
//!
//! A long-lived process that polls a remote control plane for commands,
//! runs each as a multi-step workflow against a pool of worker sessions
//! and reports the outcome back.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────┐
//! │      Control plane       │◄───────│      Status reporter     │
//! │  (tabfleet-protocol)     │        │  (ordered, best-effort)  │
//! └────────────┬─────────────┘        └────────────▲─────────────┘
//!              │ getPendingCommands                 │
//!              ▼                                    │
//! ┌──────────────────────────┐        ┌─────────────┴────────────┐
//! │      Command poller      │───────►│      Workflow engine     │
//! │  (one command per tick)  │        │  (single-flight guard)   │
//! └──────────────────────────┘        └──┬──────────┬─────────┬──┘
//!                                        │          │         │
//!                                        ▼          ▼         ▼
//!                                  ┌─────────┐ ┌─────────┐ ┌──────────┐
//!                                  │ Worker  │ │ Action  │ │Extraction│
//!                                  │  pool   │ │executor │ │ (retry)  │
//!                                  └────┬────┘ └────┬────┘ └────┬─────┘
//!                                       └───────────┼───────────┘
//!                                                   ▼
//!                                        ┌──────────────────────┐
//!                                        │     Session host     │
//!                                        │ (bridge or mock)     │
//!                                        └──────────────────────┘
//! ```
//!
//! # Run State Machine
//!
//! ```text
//!   ┌──────┐  acquire guard  ┌─────────┐  all steps ok  ┌───────────┐
//!   │ IDLE │────────────────►│ RUNNING │───────────────►│ COMPLETED │
//!   └──────┘                 └────┬────┘                └───────────┘
//!      ▲                          │ required step / creation failure
//!      │ guard held: Busy         ▼
//!      └─────────────────    ┌─────────┐
//!                            │ ERRORED │
//!                            └─────────┘
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables, see
//! [`config::Config::from_env`]:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TABFLEET_BASE_URL` | `https://tehub.in` | Control-plane origin |
//! | `TABFLEET_HOST_URL` | `http://127.0.0.1:9333` | Session host bridge |
//! | `TABFLEET_DATA_DIR` | `.data` | Directory for `state.json` |
//! | `TABFLEET_POLL_INTERVAL_MS` | `5000` | Command poll interval |
//! | `TABFLEET_HEARTBEAT_INTERVAL_MS` | `5000` | Heartbeat interval |
//!
//! # Modules
//!
//! - [`config`]: Environment configuration and workflow timings
//! - [`session`]: Session host interface, HTTP bridge and mock
//! - [`pool`]: Worker creation, reload and close
//! - [`discovery`]: Element discovery strategies
//! - [`executor`]: Two-tier actions against workers
//! - [`extraction`]: Retrying document extraction
//! - [`engine`]: Workflow plans and the single-flight engine
//! - [`workflows`]: Built-in plans
//! - [`poller`]: Command polling and dispatch
//! - [`reporter`]: Fire-and-forget status reports
//! - [`registration`]: Auto-registration and heartbeat
//! - [`runtime`]: Embeddable runtime

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Error types for orchestrator operations.
pub mod error;

/// Persisted instance identity and credentials.
pub mod state;

/// Session host interface and implementations.
pub mod session;

/// Worker pool and controlled-worker registry.
pub mod pool;

/// Element discovery strategies.
pub mod discovery;

/// Action execution against workers.
pub mod executor;

/// Progress observers.
pub mod progress;

/// Single-flight run guard with keep-alive.
pub mod guard;

/// Retrying document extraction.
pub mod extraction;

/// Workflow engine.
pub mod engine;

/// Built-in workflow plans.
pub mod workflows;

/// Fire-and-forget status reporting.
pub mod reporter;

/// Command polling and dispatch.
pub mod poller;

/// Auto-registration and heartbeat worker.
pub mod registration;

/// Embeddable orchestrator runtime.
pub mod runtime;

pub use engine::{EngineError, RunReport, RunState, WorkflowEngine, WorkflowPlan};
pub use error::{Error, Result};
pub use runtime::OrchestratorRuntime;
