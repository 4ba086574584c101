// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock session host for testing.
//!
//! Simulates a browser with scripted pages: each URL maps to a [`MockPage`]
//! describing its elements, visible text and whether an agent script is
//! listening. Every call is recorded so tests can assert on the exact
//! sequence of host interactions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::traits::*;

/// One recorded host interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    /// `create_session`.
    Create {
        /// Requested URL.
        url: String,
        /// Whether the session was focused.
        active: bool,
    },
    /// `reload`.
    Reload(WorkerId),
    /// `navigate`.
    Navigate(WorkerId, String),
    /// `close`.
    Close(WorkerId),
    /// `run_in_session`.
    Run(WorkerId, Routine),
    /// `send_to_session`.
    Message(WorkerId, AgentMessage),
    /// `keep_alive`.
    KeepAlive,
    /// `close_process`.
    CloseProcess,
}

/// Scripted content of a page.
#[derive(Debug, Clone)]
pub struct MockPage {
    /// Snapshot elements.
    pub elements: Vec<ElementInfo>,
    /// Visible body text.
    pub text: String,
    /// Whether an agent script answers messages.
    pub has_agent: bool,
    /// Targets the agent script can click.
    pub agent_targets: Vec<String>,
    /// Reported load status.
    pub load_status: LoadStatus,
}

impl Default for MockPage {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            text: String::new(),
            has_agent: false,
            agent_targets: Vec::new(),
            load_status: LoadStatus::Complete,
        }
    }
}

impl MockPage {
    /// Empty, fully loaded page without an agent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element with the given tag and text.
    pub fn with_element(mut self, tag: &str, text: &str) -> Self {
        let index = self.elements.len();
        self.elements.push(ElementInfo {
            index,
            tag: tag.to_string(),
            text: text.to_string(),
            ..Default::default()
        });
        self
    }

    /// Add an element with a single attribute.
    pub fn with_attribute_element(mut self, tag: &str, name: &str, value: &str) -> Self {
        let index = self.elements.len();
        let mut attributes = HashMap::new();
        attributes.insert(name.to_string(), value.to_string());
        self.elements.push(ElementInfo {
            index,
            tag: tag.to_string(),
            attributes,
            ..Default::default()
        });
        self
    }

    /// Add an element carrying an aria-label.
    pub fn with_labelled_element(mut self, tag: &str, label: &str) -> Self {
        let index = self.elements.len();
        self.elements.push(ElementInfo {
            index,
            tag: tag.to_string(),
            aria_label: Some(label.to_string()),
            ..Default::default()
        });
        self
    }

    /// Set the visible text.
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Attach an agent script that can click the given targets.
    pub fn with_agent(mut self, targets: &[&str]) -> Self {
        self.has_agent = true;
        self.agent_targets = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Set the reported load status.
    pub fn with_load_status(mut self, status: LoadStatus) -> Self {
        self.load_status = status;
        self
    }
}

#[derive(Debug, Clone)]
struct MockSession {
    id: WorkerId,
    url: String,
    pinned: bool,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    sessions: Vec<MockSession>,
    pages: HashMap<String, MockPage>,
    default_page: MockPage,
    scripts: HashMap<String, VecDeque<std::result::Result<Value, String>>>,
    failing_urls: HashSet<String>,
    fail_close: bool,
    process_closed: bool,
    calls: Vec<HostCall>,
}

impl MockState {
    fn session(&self, worker: &WorkerId) -> Result<&MockSession> {
        self.sessions
            .iter()
            .find(|s| &s.id == worker)
            .ok_or_else(|| SessionError::NotFound(worker.clone()))
    }

    fn page_of(&self, worker: &WorkerId) -> Result<MockPage> {
        let url = &self.session(worker)?.url;
        Ok(self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.default_page.clone()))
    }

    fn add(&mut self, url: &str, pinned: bool) -> WorkerId {
        self.next_id += 1;
        let id = WorkerId::new(format!("mock-{}", self.next_id));
        self.sessions.push(MockSession {
            id: id.clone(),
            url: url.to_string(),
            pinned,
        });
        id
    }
}

/// Mock session host for testing.
#[derive(Debug, Default)]
pub struct MockHost {
    state: Mutex<MockState>,
}

impl MockHost {
    /// Create a new mock host with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Script the page served at `url`.
    pub fn set_page(&self, url: &str, page: MockPage) {
        self.lock().pages.insert(url.to_string(), page);
    }

    /// Script the page served for URLs without their own entry.
    pub fn set_default_page(&self, page: MockPage) {
        self.lock().default_page = page;
    }

    /// Queue the result of the next [`Routine::Script`] run on `url`.
    pub fn queue_script_result(&self, url: &str, result: std::result::Result<Value, String>) {
        self.lock()
            .scripts
            .entry(url.to_string())
            .or_default()
            .push_back(result);
    }

    /// Make session creation fail for `url`.
    pub fn fail_creation_for(&self, url: &str) {
        self.lock().failing_urls.insert(url.to_string());
    }

    /// Make every close call fail.
    pub fn set_fail_close(&self, fail: bool) {
        self.lock().fail_close = fail;
    }

    /// Add a pre-existing session without recording a call.
    pub fn add_session(&self, url: &str, pinned: bool) -> WorkerId {
        self.lock().add(url, pinned)
    }

    /// Every recorded call in order.
    pub fn calls(&self) -> Vec<HostCall> {
        self.lock().calls.clone()
    }

    /// Sessions currently open.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.lock()
            .sessions
            .iter()
            .map(|s| SessionInfo {
                id: s.id.clone(),
                pinned: s.pinned,
            })
            .collect()
    }

    /// URL a session currently shows.
    pub fn url_of(&self, worker: &WorkerId) -> Option<String> {
        self.lock()
            .sessions
            .iter()
            .find(|s| &s.id == worker)
            .map(|s| s.url.clone())
    }

    /// URLs passed to `create_session`, in call order.
    pub fn created_urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Create { url, .. } => Some(url),
                _ => None,
            })
            .collect()
    }

    /// Direct element clicks as `(worker, element index)`.
    pub fn clicks(&self) -> Vec<(WorkerId, usize)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Run(w, Routine::Click { element }) => Some((w, element)),
                _ => None,
            })
            .collect()
    }

    /// Messages delivered to agent scripts.
    pub fn agent_messages(&self) -> Vec<(WorkerId, AgentMessage)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Message(w, m) => Some((w, m)),
                _ => None,
            })
            .collect()
    }

    /// Number of keep-alive pings received.
    pub fn keep_alive_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, HostCall::KeepAlive))
            .count()
    }

    /// Whether `close_process` was called.
    pub fn process_closed(&self) -> bool {
        self.lock().process_closed
    }
}

#[async_trait]
impl SessionHost for MockHost {
    fn host_type(&self) -> &'static str {
        "mock"
    }

    async fn create_session(&self, url: &str, active: bool) -> Result<WorkerId> {
        let mut state = self.lock();
        state.calls.push(HostCall::Create {
            url: url.to_string(),
            active,
        });
        if state.failing_urls.contains(url) {
            return Err(SessionError::CreationFailed {
                url: url.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(state.add(url, false))
    }

    async fn reload(&self, worker: &WorkerId) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(HostCall::Reload(worker.clone()));
        state.session(worker).map(|_| ())
    }

    async fn navigate(&self, worker: &WorkerId, url: &str) -> Result<()> {
        let mut state = self.lock();
        state
            .calls
            .push(HostCall::Navigate(worker.clone(), url.to_string()));
        let session = state
            .sessions
            .iter_mut()
            .find(|s| &s.id == worker)
            .ok_or_else(|| SessionError::NotFound(worker.clone()))?;
        session.url = url.to_string();
        Ok(())
    }

    async fn close(&self, worker: &WorkerId) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(HostCall::Close(worker.clone()));
        if state.fail_close {
            return Err(SessionError::Transport("close refused".to_string()));
        }
        let before = state.sessions.len();
        state.sessions.retain(|s| &s.id != worker);
        if state.sessions.len() == before {
            return Err(SessionError::NotFound(worker.clone()));
        }
        Ok(())
    }

    async fn load_status(&self, worker: &WorkerId) -> Result<LoadStatus> {
        Ok(self.lock().page_of(worker)?.load_status)
    }

    async fn run_in_session(&self, worker: &WorkerId, routine: Routine) -> Result<Value> {
        let mut state = self.lock();
        state.calls.push(HostCall::Run(worker.clone(), routine.clone()));
        let page = state.page_of(worker)?;

        match routine {
            Routine::Snapshot => {
                let url = state.session(worker)?.url.clone();
                serde_json::to_value(PageSnapshot {
                    url,
                    elements: page.elements,
                })
                .map_err(|e| SessionError::Protocol(e.to_string()))
            }
            Routine::Click { element } => Ok(Value::Bool(element < page.elements.len())),
            Routine::VisibleText => Ok(Value::String(page.text)),
            Routine::Script { .. } => {
                let url = state.session(worker)?.url.clone();
                match state.scripts.get_mut(&url).and_then(|q| q.pop_front()) {
                    Some(Ok(value)) => Ok(value),
                    Some(Err(message)) => Err(SessionError::Routine(message)),
                    None => Err(SessionError::Routine("no script result queued".to_string())),
                }
            }
        }
    }

    async fn send_to_session(
        &self,
        worker: &WorkerId,
        message: AgentMessage,
    ) -> Result<Option<AgentReply>> {
        let mut state = self.lock();
        state
            .calls
            .push(HostCall::Message(worker.clone(), message.clone()));
        let page = state.page_of(worker)?;
        if !page.has_agent {
            return Ok(None);
        }
        let success = match &message {
            AgentMessage::ClickButton { selector, .. } => {
                page.agent_targets.iter().any(|t| t == selector)
            }
            AgentMessage::UpdateStatus { .. } | AgentMessage::HideStatus => true,
        };
        Ok(Some(AgentReply {
            success,
            message: None,
        }))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        Ok(self.sessions())
    }

    async fn keep_alive(&self) -> Result<()> {
        self.lock().calls.push(HostCall::KeepAlive);
        Ok(())
    }

    async fn close_process(&self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(HostCall::CloseProcess);
        state.process_closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_lifecycle() {
        let host = MockHost::new();
        let id = host.create_session("https://a", false).await.unwrap();
        host.reload(&id).await.unwrap();
        host.close(&id).await.unwrap();

        assert_eq!(
            host.calls(),
            vec![
                HostCall::Create {
                    url: "https://a".to_string(),
                    active: false
                },
                HostCall::Reload(id.clone()),
                HostCall::Close(id.clone()),
            ]
        );
        assert!(matches!(
            host.close(&id).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_serves_scripted_pages() {
        let host = MockHost::new();
        host.set_page(
            "https://q",
            MockPage::new()
                .with_element("button", "Ask an expert")
                .with_text("You have 3 expert questions left"),
        );
        let id = host.create_session("https://q", true).await.unwrap();

        let snapshot = host.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.elements.len(), 1);
        assert_eq!(snapshot.elements[0].text, "Ask an expert");
        assert!(host.click(&id, 0).await.unwrap());
        assert!(!host.click(&id, 4).await.unwrap());
        assert!(host.visible_text(&id).await.unwrap().contains("3 expert"));
    }

    #[tokio::test]
    async fn test_mock_agent_presence() {
        let host = MockHost::new();
        host.set_page("https://agent", MockPage::new().with_agent(&["Chat Submit"]));
        let with_agent = host.create_session("https://agent", false).await.unwrap();
        let without = host.create_session("https://plain", false).await.unwrap();

        let click = |selector: &str| AgentMessage::ClickButton {
            selector: selector.to_string(),
            index: 0,
        };
        let reply = host
            .send_to_session(&with_agent, click("Chat Submit"))
            .await
            .unwrap();
        assert_eq!(reply.map(|r| r.success), Some(true));
        assert!(
            host.send_to_session(&without, click("Chat Submit"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_mock_script_queue() {
        let host = MockHost::new();
        host.queue_script_result("https://s", Err("boom".to_string()));
        host.queue_script_result("https://s", Ok(serde_json::json!({ "ok": 1 })));
        let id = host.create_session("https://s", false).await.unwrap();
        let script = Routine::Script {
            source: "() => 1".to_string(),
            args: vec![],
        };

        assert!(host.run_in_session(&id, script.clone()).await.is_err());
        assert_eq!(
            host.run_in_session(&id, script.clone()).await.unwrap(),
            serde_json::json!({ "ok": 1 })
        );
        assert!(host.run_in_session(&id, script).await.is_err());
    }
}
