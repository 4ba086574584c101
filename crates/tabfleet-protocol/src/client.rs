// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Control-plane client.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::api::{PendingCommandsResponse, PollIdentity, QueueOutcome, RegisterResponse};
use crate::command::{CommandStatus, RawCommand};
use crate::error::{ClientError, Result};

/// Default control-plane origin.
pub const DEFAULT_BASE_URL: &str = "https://tehub.in";
/// Default path of the command API.
pub const DEFAULT_API_PATH: &str = "/admin/api.php";
/// Default path of the queue API.
pub const DEFAULT_QUEUE_API_PATH: &str = "/admin/unblur_queue_api.php";

/// Outbound operations against the control plane.
///
/// Every call is a single request; callers decide whether failures matter.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch pending commands for this orchestrator. An unsuccessful lookup
    /// yields an empty list.
    async fn pending_commands(&self, identity: &PollIdentity) -> Result<Vec<RawCommand>>;

    /// Report a command lifecycle transition.
    async fn update_command_status(
        &self,
        command_id: &str,
        status: CommandStatus,
        detail: &str,
    ) -> Result<()>;

    /// Report the remaining question quota scraped from a worker.
    async fn update_questions_left(&self, instance_id: &str, questions_left: i64) -> Result<()>;

    /// Liveness signal carrying whether a workflow run is active.
    async fn heartbeat(&self, instance_id: &str, is_running: bool) -> Result<()>;

    /// Register this instance under a profile name.
    async fn auto_register(&self, instance_id: &str, profile_name: &str)
    -> Result<RegisterResponse>;

    /// Settle a queue entry with a result payload or failure message.
    async fn complete_queue_item(
        &self,
        queue_id: &str,
        outcome: QueueOutcome,
        result: &str,
    ) -> Result<()>;
}

/// Configuration for [`HttpControlPlane`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin such as `https://tehub.in`.
    pub base_url: String,
    /// Path of the command API.
    pub api_path: String,
    /// Path of the queue API.
    pub queue_api_path: String,
    /// Static identifier used before an instance id exists.
    pub extension_id: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_path: DEFAULT_API_PATH.to_string(),
            queue_api_path: DEFAULT_QUEUE_API_PATH.to_string(),
            extension_id: "tabfleet".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Config pointing at `base_url` with default paths.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the extension id.
    pub fn with_extension_id(mut self, extension_id: impl Into<String>) -> Self {
        self.extension_id = extension_id.into();
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full URL of the command API.
    pub fn api_url(&self) -> String {
        join_url(&self.base_url, &self.api_path)
    }

    /// Full URL of the queue API.
    pub fn queue_api_url(&self) -> String {
        join_url(&self.base_url, &self.queue_api_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// [`ControlPlane`] over HTTP with form-encoded bodies.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpControlPlane {
    /// Build a client from configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn post_form(&self, url: String, form: &[(&str, &str)]) -> Result<reqwest::Response> {
        let response = self.http.post(url).form(form).send().await?;
        check_status(response)
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Status {
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    #[instrument(skip(self), fields(identity = ?identity))]
    async fn pending_commands(&self, identity: &PollIdentity) -> Result<Vec<RawCommand>> {
        let (key, value) = identity.query_pair();
        let response = self
            .http
            .get(self.config.api_url())
            .query(&[("action", "getPendingCommands"), (key, value)])
            .send()
            .await?;
        let body = check_status(response)?.text().await?;
        let parsed: PendingCommandsResponse = serde_json::from_str(&body)?;

        if !parsed.success {
            debug!(message = ?parsed.message, "Pending command lookup unsuccessful");
            return Ok(Vec::new());
        }
        Ok(parsed.commands)
    }

    #[instrument(skip(self, detail))]
    async fn update_command_status(
        &self,
        command_id: &str,
        status: CommandStatus,
        detail: &str,
    ) -> Result<()> {
        self.post_form(
            self.config.api_url(),
            &[
                ("action", "updateCommandStatus"),
                ("command_id", command_id),
                ("status", status.as_str()),
                ("response", detail),
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_questions_left(&self, instance_id: &str, questions_left: i64) -> Result<()> {
        let count = questions_left.to_string();
        self.post_form(
            self.config.api_url(),
            &[
                ("action", "updateQuestionsLeft"),
                ("instance_id", instance_id),
                ("questions_left", count.as_str()),
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn heartbeat(&self, instance_id: &str, is_running: bool) -> Result<()> {
        self.post_form(
            self.config.api_url(),
            &[
                ("action", "heartbeat"),
                ("extension_id", self.config.extension_id.as_str()),
                ("instance_id", instance_id),
                ("is_running", if is_running { "yes" } else { "no" }),
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn auto_register(
        &self,
        instance_id: &str,
        profile_name: &str,
    ) -> Result<RegisterResponse> {
        let response = self
            .post_form(
                self.config.api_url(),
                &[
                    ("action", "autoRegister"),
                    ("extension_id", self.config.extension_id.as_str()),
                    ("instance_id", instance_id),
                    ("profile_name", profile_name),
                ],
            )
            .await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    #[instrument(skip(self, result))]
    async fn complete_queue_item(
        &self,
        queue_id: &str,
        outcome: QueueOutcome,
        result: &str,
    ) -> Result<()> {
        self.post_form(
            self.config.queue_api_url(),
            &[
                ("action", "completeUnblur"),
                ("queue_id", queue_id),
                ("status", outcome.as_str()),
                ("result", result),
            ],
        )
        .await?;
        Ok(())
    }
}
