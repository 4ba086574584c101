// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end runtime tests with the mock host and an in-memory control plane.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CpCall, RecordingControlPlane};
use serde_json::json;
use tabfleet::config::WorkflowTimings;
use tabfleet::progress::ChannelObserver;
use tabfleet::registration::RegistrationConfig;
use tabfleet::runtime::{OrchestratorRuntime, OrchestratorRuntimeBuilder};
use tabfleet::session::{MockHost, MockPage};
use tabfleet::state::StateStore;
use tabfleet_protocol::{CommandStatus, PollIdentity};

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached");
}

fn builder(
    host: Arc<MockHost>,
    control_plane: Arc<RecordingControlPlane>,
    state: Arc<StateStore>,
) -> OrchestratorRuntimeBuilder {
    OrchestratorRuntime::builder()
        .host(host)
        .control_plane(control_plane)
        .state(state)
        .timings(WorkflowTimings::immediate())
        .poll_interval(Duration::from_millis(10))
        .initial_poll_delay(Duration::ZERO)
        .registration(RegistrationConfig {
            initial_delay: Duration::ZERO,
            interval: Duration::from_millis(20),
            profile_name: None,
        })
}

async fn start(
    host: Arc<MockHost>,
    control_plane: Arc<RecordingControlPlane>,
    state: Arc<StateStore>,
) -> OrchestratorRuntime {
    builder(host, control_plane, state)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap()
}

#[test]
fn test_build_requires_host_and_control_plane() {
    let err = OrchestratorRuntime::builder()
        .control_plane(Arc::new(RecordingControlPlane::new()))
        .build()
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Configuration error: host is required");
}

#[tokio::test]
async fn test_runtime_processes_commands_and_halts_on_logout() {
    let host = Arc::new(MockHost::new());
    let control_plane = Arc::new(RecordingControlPlane::new());
    let state = Arc::new(StateStore::in_memory());
    control_plane.push_command("1", "ping", json!({}));

    let runtime = start(host.clone(), control_plane.clone(), state.clone()).await;
    assert!(runtime.is_running());
    assert!(runtime.instance_id().starts_with("inst_"));

    wait_until(|| control_plane.statuses_of("1").contains(&CommandStatus::Success)).await;

    let instance_id = runtime.instance_id().to_string();
    assert!(control_plane.calls().iter().any(|c| matches!(
        c,
        CpCall::Pending(PollIdentity::Instance(id)) if *id == instance_id
    )));

    wait_until(|| {
        control_plane
            .calls()
            .iter()
            .any(|c| matches!(c, CpCall::Heartbeat { .. }))
    })
    .await;
    assert!(state.snapshot().await.is_registered());

    control_plane.push_command("2", "logout", json!({}));
    tokio::time::timeout(Duration::from_secs(5), runtime.halted())
        .await
        .expect("runtime halts");
    wait_until(|| host.process_closed()).await;

    runtime.shutdown().await;
    assert_eq!(
        control_plane.terminal_detail("2"),
        Some((CommandStatus::Success, "Logged out".into()))
    );
}

#[tokio::test]
async fn test_shutdown_stops_background_tasks() {
    let runtime = start(
        Arc::new(MockHost::new()),
        Arc::new(RecordingControlPlane::new()),
        Arc::new(StateStore::in_memory()),
    )
    .await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(runtime.is_running());
    tokio::time::timeout(Duration::from_secs(5), runtime.shutdown())
        .await
        .expect("shutdown completes");
}

#[tokio::test]
async fn test_instance_id_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let first = {
        let state = Arc::new(StateStore::open(&path).await.unwrap());
        let runtime = start(
            Arc::new(MockHost::new()),
            Arc::new(RecordingControlPlane::new()),
            state,
        )
        .await;
        let id = runtime.instance_id().to_string();
        runtime.shutdown().await;
        id
    };

    let state = Arc::new(StateStore::open(&path).await.unwrap());
    let runtime = start(
        Arc::new(MockHost::new()),
        Arc::new(RecordingControlPlane::new()),
        state,
    )
    .await;
    assert_eq!(runtime.instance_id(), first);
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_extra_observer_receives_workflow_progress() {
    let host = Arc::new(MockHost::new());
    host.set_default_page(
        MockPage::new()
            .with_agent(&["Ask an expert", "Chat Submit"])
            .with_text("You have 3 expert questions left"),
    );
    let control_plane = Arc::new(RecordingControlPlane::new());
    control_plane.push_command("b", "post", json!({ "url": "https://a.test", "count": 1 }));

    let channel = Arc::new(ChannelObserver::new(64));
    let mut updates = channel.subscribe();
    let runtime = builder(
        host,
        control_plane.clone(),
        Arc::new(StateStore::in_memory()),
    )
    .observer(channel)
    .build()
    .unwrap()
    .start()
    .await
    .unwrap();

    wait_until(|| control_plane.statuses_of("b").contains(&CommandStatus::Success)).await;
    runtime.shutdown().await;

    let mut received = Vec::new();
    while let Ok(update) = updates.try_recv() {
        received.push(update);
    }
    let first = received.first().expect("progress published");
    assert_eq!((first.step, first.total), (1, 11));
    let last = received.last().expect("progress published");
    assert_eq!(last.message, "✅ Completed! (3 questions left)");
    assert_eq!((last.step, last.total), (11, 11));
}
