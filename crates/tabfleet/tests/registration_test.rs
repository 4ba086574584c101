// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registration worker tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CpCall, RecordingControlPlane};
use serde_json::json;
use tabfleet::guard::RunGuard;
use tabfleet::registration::{RegistrationConfig, RegistrationWorker, TickOutcome};
use tabfleet::state::{StateStore, default_profile_name};
use tabfleet_protocol::RegisterResponse;

struct Setup {
    control_plane: Arc<RecordingControlPlane>,
    state: Arc<StateStore>,
    guard: RunGuard,
}

impl Setup {
    fn new() -> Self {
        Self {
            control_plane: Arc::new(RecordingControlPlane::new()),
            state: Arc::new(StateStore::in_memory()),
            guard: RunGuard::new(),
        }
    }

    fn worker(&self, config: RegistrationConfig) -> RegistrationWorker {
        RegistrationWorker::new(
            self.control_plane.clone(),
            self.state.clone(),
            self.guard.clone(),
            config,
        )
    }
}

#[tokio::test]
async fn test_first_tick_registers_then_heartbeats() {
    let setup = Setup::new();
    let instance_id = setup.state.ensure_instance_id().await.unwrap();
    let worker = setup.worker(RegistrationConfig::default());

    let outcome = worker.tick().await;

    assert_eq!(
        outcome,
        TickOutcome::Registered {
            profile_id: "42".into()
        }
    );
    assert_eq!(
        setup.control_plane.calls(),
        vec![
            CpCall::Register {
                instance_id: instance_id.clone(),
                profile_name: default_profile_name(&instance_id),
            },
            CpCall::Heartbeat {
                instance_id: instance_id.clone(),
                is_running: false,
            },
        ]
    );

    let state = setup.state.snapshot().await;
    assert!(state.auto_registered);
    assert_eq!(state.profile_id.as_deref(), Some("42"));
}

#[tokio::test]
async fn test_registered_instance_only_heartbeats() {
    let setup = Setup::new();
    setup.state.ensure_instance_id().await.unwrap();
    let worker = setup.worker(RegistrationConfig::default());

    worker.tick().await;
    let outcome = worker.tick().await;

    assert_eq!(outcome, TickOutcome::Heartbeat);
    let registers = setup
        .control_plane
        .calls()
        .iter()
        .filter(|c| matches!(c, CpCall::Register { .. }))
        .count();
    assert_eq!(registers, 1);
}

#[tokio::test]
async fn test_heartbeat_reflects_active_run() {
    let setup = Setup::new();
    setup.state.ensure_instance_id().await.unwrap();
    let worker = setup.worker(RegistrationConfig::default());
    worker.tick().await;

    let _permit = setup.guard.try_acquire().unwrap();
    worker.tick().await;

    assert!(matches!(
        setup.control_plane.calls().last(),
        Some(CpCall::Heartbeat {
            is_running: true,
            ..
        })
    ));
}

#[tokio::test]
async fn test_declined_registration_is_retried_later() {
    let setup = Setup::new();
    setup.control_plane.set_register_response(RegisterResponse {
        success: false,
        id: None,
        message: Some("profile limit reached".into()),
    });
    let worker = setup.worker(RegistrationConfig::default());

    assert_eq!(worker.tick().await, TickOutcome::Rejected);
    assert!(!setup.state.snapshot().await.is_registered());

    setup.control_plane.set_register_response(RegisterResponse {
        success: true,
        id: Some(json!("p-7")),
        message: None,
    });
    assert_eq!(
        worker.tick().await,
        TickOutcome::Registered {
            profile_id: "p-7".into()
        }
    );
}

#[tokio::test]
async fn test_profile_name_override() {
    let setup = Setup::new();
    let worker = setup.worker(RegistrationConfig {
        profile_name: Some("Front desk".into()),
        ..Default::default()
    });

    worker.tick().await;

    assert!(matches!(
        setup.control_plane.calls().first(),
        Some(CpCall::Register { profile_name, .. }) if profile_name == "Front desk"
    ));
    assert_eq!(
        setup.state.snapshot().await.profile_name.as_deref(),
        Some("Front desk")
    );
}

#[tokio::test]
async fn test_report_failures_are_swallowed() {
    let setup = Setup::new();
    setup.control_plane.set_fail_reports(true);
    let worker = setup.worker(RegistrationConfig::default());

    assert!(matches!(worker.tick().await, TickOutcome::Failed(_)));
    assert!(!setup.state.snapshot().await.is_registered());
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_respects_initial_delay_and_interval() {
    let setup = Setup::new();
    setup.state.ensure_instance_id().await.unwrap();
    let worker = setup.worker(RegistrationConfig {
        initial_delay: Duration::from_secs(2),
        interval: Duration::from_secs(5),
        profile_name: None,
    });
    let shutdown = worker.shutdown_handle();
    let handle = tokio::spawn(worker.run());

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert!(setup.control_plane.calls().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(setup.control_plane.calls().len(), 2);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(setup.control_plane.calls().len(), 3);

    shutdown.notify_one();
    handle.await.unwrap();
}
