// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session host backed by a browser bridge over HTTP.
//!
//! The bridge is a small companion process living next to the browser
//! (typically an extension's native host) that exposes sessions as REST
//! resources:
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | POST | `/sessions` | `{url, active}` | `{id}` |
//! | GET | `/sessions` | | `{sessions: [{id, pinned}]}` |
//! | GET | `/sessions/{id}` | | `{id, status, pinned}` |
//! | POST | `/sessions/{id}/reload` | | |
//! | POST | `/sessions/{id}/navigate` | `{url}` | |
//! | DELETE | `/sessions/{id}` | | |
//! | POST | `/sessions/{id}/run` | `{routine}` | `{result}` or `{error}` |
//! | POST | `/sessions/{id}/message` | `{message}` | `{delivered, reply}` |
//! | POST | `/keepalive` | | |
//! | POST | `/shutdown` | | |

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::traits::*;

#[derive(Debug, Deserialize)]
struct CreatedSession {
    id: WorkerId,
}

#[derive(Debug, Deserialize)]
struct SessionStatus {
    status: LoadStatus,
}

#[derive(Debug, Deserialize)]
struct SessionList {
    #[serde(default)]
    sessions: Vec<SessionInfo>,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    delivered: bool,
    #[serde(default)]
    reply: Option<AgentReply>,
}

/// [`SessionHost`] talking to a browser bridge.
#[derive(Debug, Clone)]
pub struct BridgeHost {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl BridgeHost {
    /// Connect to a bridge at `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_url(&self, worker: &WorkerId, suffix: &str) -> String {
        self.url(&format!(
            "/sessions/{}{}",
            urlencoding::encode(worker.as_str()),
            suffix
        ))
    }

    fn map_transport(&self, err: reqwest::Error) -> SessionError {
        if err.is_timeout() {
            SessionError::Timeout(self.timeout.as_millis() as u64)
        } else {
            SessionError::Transport(err.to_string())
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        worker: Option<&WorkerId>,
    ) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            if let Some(worker) = worker {
                return Err(SessionError::NotFound(worker.clone()));
            }
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::Protocol(format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let body = response.text().await.map_err(|e| self.map_transport(e))?;
        serde_json::from_str(&body).map_err(|e| SessionError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl SessionHost for BridgeHost {
    fn host_type(&self) -> &'static str {
        "bridge"
    }

    #[instrument(skip(self))]
    async fn create_session(&self, url: &str, active: bool) -> Result<WorkerId> {
        let request = self
            .http
            .post(self.url("/sessions"))
            .json(&json!({ "url": url, "active": active }));
        let response = self.send(request, None).await.map_err(|e| match e {
            SessionError::Protocol(reason) | SessionError::Transport(reason) => {
                SessionError::CreationFailed {
                    url: url.to_string(),
                    reason,
                }
            }
            other => other,
        })?;
        let created: CreatedSession = self.json(response).await?;
        debug!(worker = %created.id, "Session created");
        Ok(created.id)
    }

    async fn reload(&self, worker: &WorkerId) -> Result<()> {
        let request = self.http.post(self.session_url(worker, "/reload"));
        self.send(request, Some(worker)).await?;
        Ok(())
    }

    async fn navigate(&self, worker: &WorkerId, url: &str) -> Result<()> {
        let request = self
            .http
            .post(self.session_url(worker, "/navigate"))
            .json(&json!({ "url": url }));
        self.send(request, Some(worker)).await?;
        Ok(())
    }

    async fn close(&self, worker: &WorkerId) -> Result<()> {
        let request = self.http.delete(self.session_url(worker, ""));
        self.send(request, Some(worker)).await?;
        Ok(())
    }

    async fn load_status(&self, worker: &WorkerId) -> Result<LoadStatus> {
        let request = self.http.get(self.session_url(worker, ""));
        let response = self.send(request, Some(worker)).await?;
        let status: SessionStatus = self.json(response).await?;
        Ok(status.status)
    }

    async fn run_in_session(&self, worker: &WorkerId, routine: Routine) -> Result<Value> {
        let request = self
            .http
            .post(self.session_url(worker, "/run"))
            .json(&json!({ "routine": routine }));
        let response = self.send(request, Some(worker)).await?;
        let run: RunResponse = self.json(response).await?;
        match run.error {
            Some(error) => Err(SessionError::Routine(error)),
            None => Ok(run.result),
        }
    }

    async fn send_to_session(
        &self,
        worker: &WorkerId,
        message: AgentMessage,
    ) -> Result<Option<AgentReply>> {
        let request = self
            .http
            .post(self.session_url(worker, "/message"))
            .json(&json!({ "message": message }));
        let response = self.send(request, Some(worker)).await?;
        let delivered: MessageResponse = self.json(response).await?;
        if !delivered.delivered {
            return Ok(None);
        }
        Ok(Some(delivered.reply.unwrap_or_default()))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let request = self.http.get(self.url("/sessions"));
        let response = self.send(request, None).await?;
        let list: SessionList = self.json(response).await?;
        Ok(list.sessions)
    }

    async fn keep_alive(&self) -> Result<()> {
        let request = self.http.post(self.url("/keepalive"));
        self.send(request, None).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn close_process(&self) -> Result<()> {
        let request = self.http.post(self.url("/shutdown"));
        self.send(request, None).await?;
        Ok(())
    }
}
