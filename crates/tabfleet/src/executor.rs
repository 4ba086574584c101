// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Two-tier action execution against workers.
//!
//! An action first goes to the agent script living in the page. When no
//! agent answers, or the agent reports failure, the executor snapshots the
//! page, runs the [`DiscoveryChain`] and clicks the located element
//! directly. Either tier succeeding counts as success.

use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures::future::join_all;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::debug;

use crate::discovery::DiscoveryChain;
use crate::session::{AgentMessage, SessionError, SessionHost, SessionHostExt, WorkerId};

/// A click on a semantic target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    /// Target label, test id or phrase.
    pub target: String,
    /// Which agent-side match to click.
    pub index: usize,
}

impl ActionSpec {
    /// Click the first match of `target`.
    pub fn click(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            index: 0,
        }
    }
}

/// Which tier performed an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// The in-page agent script.
    Agent,
    /// Snapshot plus discovery plus direct click.
    Injected,
}

/// Result of one action on one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Worker acted on.
    pub worker: WorkerId,
    /// Whether either tier clicked the target.
    pub succeeded: bool,
    /// The tier that succeeded.
    pub tier: Option<Tier>,
    /// Failure detail.
    pub detail: Option<String>,
}

/// Aggregate of an action across workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionSummary {
    /// Workers where the action succeeded.
    pub succeeded: usize,
    /// Workers where it failed.
    pub failed: usize,
    /// Workers attempted.
    pub total: usize,
}

impl ActionSummary {
    /// Tally outcomes.
    pub fn from_outcomes(outcomes: &[ActionOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.succeeded).count();
        Self {
            succeeded,
            failed: outcomes.len() - succeeded,
            total: outcomes.len(),
        }
    }
}

/// Patterns that scrape a remaining-count number out of page text. The
/// first capture group of the first matching pattern wins.
#[derive(Debug, Clone)]
pub struct CountPatterns {
    patterns: Vec<Regex>,
}

static QUESTIONS_LEFT: LazyLock<CountPatterns> = LazyLock::new(|| {
    CountPatterns::new(&[
        r"You have (\d+) expert questions? left",
        r"(\d+) expert questions? (left|remaining)",
    ])
    .expect("questions-left patterns compile")
});

impl CountPatterns {
    /// Compile case-insensitive patterns.
    pub fn new(patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Patterns for the "N expert questions left" banner.
    pub fn questions_left() -> Self {
        QUESTIONS_LEFT.clone()
    }

    /// Scrape the count from `text`.
    pub fn extract(&self, text: &str) -> Option<i64> {
        self.patterns.iter().find_map(|re| {
            re.captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        })
    }
}

/// Runs actions on workers through a [`SessionHost`].
#[derive(Clone)]
pub struct ActionExecutor {
    host: Arc<dyn SessionHost>,
    chain: Arc<DiscoveryChain>,
    timeout: Duration,
}

impl ActionExecutor {
    /// Executor with the standard discovery chain. `timeout` bounds every
    /// individual host call.
    pub fn new(host: Arc<dyn SessionHost>, timeout: Duration) -> Self {
        Self {
            host,
            chain: Arc::new(DiscoveryChain::standard()),
            timeout,
        }
    }

    /// Use a custom discovery chain.
    pub fn with_chain(mut self, chain: DiscoveryChain) -> Self {
        self.chain = Arc::new(chain);
        self
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, SessionError>>,
    ) -> Result<T, SessionError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Perform `action` on one worker, agent first, then direct click.
    pub async fn act(&self, worker: &WorkerId, action: &ActionSpec) -> ActionOutcome {
        let message = AgentMessage::ClickButton {
            selector: action.target.clone(),
            index: action.index,
        };
        match self
            .bounded(self.host.send_to_session(worker, message))
            .await
        {
            Ok(Some(reply)) if reply.success => {
                return ActionOutcome {
                    worker: worker.clone(),
                    succeeded: true,
                    tier: Some(Tier::Agent),
                    detail: None,
                };
            }
            Ok(reply) => {
                debug!(worker = %worker, action_target = %action.target, agent = reply.is_some(), "Agent did not click, falling back")
            }
            Err(e) => {
                debug!(worker = %worker, action_target = %action.target, error = %e, "Agent unreachable, falling back")
            }
        }

        match self.discover_and_click(worker, &action.target).await {
            Ok(Some(strategy)) => {
                debug!(worker = %worker, action_target = %action.target, strategy, "Clicked via discovery");
                ActionOutcome {
                    worker: worker.clone(),
                    succeeded: true,
                    tier: Some(Tier::Injected),
                    detail: None,
                }
            }
            Ok(None) => ActionOutcome {
                worker: worker.clone(),
                succeeded: false,
                tier: None,
                detail: Some(format!("'{}' not found", action.target)),
            },
            Err(e) => ActionOutcome {
                worker: worker.clone(),
                succeeded: false,
                tier: None,
                detail: Some(e.to_string()),
            },
        }
    }

    /// Snapshot the page, locate `target` and click it. Returns the name of
    /// the strategy that found the element, or `None` when nothing matched.
    pub async fn discover_and_click(
        &self,
        worker: &WorkerId,
        target: &str,
    ) -> Result<Option<&'static str>, SessionError> {
        let snapshot = self.bounded(self.host.snapshot(worker)).await?;
        let Some((strategy, index)) = self.chain.locate(&snapshot, target) else {
            return Ok(None);
        };
        let clicked = self.bounded(self.host.click(worker, index)).await?;
        Ok(clicked.then_some(strategy))
    }

    /// Perform `action` on every worker concurrently.
    pub async fn act_on_all(
        &self,
        workers: &[WorkerId],
        action: &ActionSpec,
    ) -> (Vec<ActionOutcome>, ActionSummary) {
        let outcomes = join_all(workers.iter().map(|w| self.act(w, action))).await;
        let summary = ActionSummary::from_outcomes(&outcomes);
        (outcomes, summary)
    }

    /// Scrape a count from a worker's visible text.
    pub async fn extract_count(
        &self,
        worker: &WorkerId,
        patterns: &CountPatterns,
    ) -> Result<Option<i64>, SessionError> {
        let text = self.bounded(self.host.visible_text(worker)).await?;
        Ok(patterns.extract(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockHost, MockPage};

    fn executor(host: Arc<MockHost>) -> ActionExecutor {
        ActionExecutor::new(host, Duration::from_secs(5))
    }

    #[test]
    fn test_questions_left_patterns() {
        let patterns = CountPatterns::questions_left();
        assert_eq!(patterns.extract("You have 12 expert questions left"), Some(12));
        assert_eq!(patterns.extract("you have 1 EXPERT QUESTION LEFT today"), Some(1));
        assert_eq!(patterns.extract("7 expert questions remaining"), Some(7));
        assert_eq!(patterns.extract("no quota info"), None);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(CountPatterns::new(&["(unclosed"]).is_err());
    }

    #[tokio::test]
    async fn test_agent_tier_wins_when_agent_clicks() {
        let host = Arc::new(MockHost::new());
        host.set_page("https://q", MockPage::new().with_agent(&["Ask an expert"]));
        let worker = host.create_session("https://q", false).await.unwrap();

        let outcome = executor(host.clone())
            .act(&worker, &ActionSpec::click("Ask an expert"))
            .await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.tier, Some(Tier::Agent));
        assert!(host.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_to_discovery_without_agent() {
        let host = Arc::new(MockHost::new());
        host.set_page(
            "https://q",
            MockPage::new()
                .with_element("div", "Header")
                .with_element("button", "Ask an Expert"),
        );
        let worker = host.create_session("https://q", false).await.unwrap();

        let outcome = executor(host.clone())
            .act(&worker, &ActionSpec::click("Ask an expert"))
            .await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.tier, Some(Tier::Injected));
        assert_eq!(host.clicks(), vec![(worker, 1)]);
    }

    #[tokio::test]
    async fn test_both_tiers_failing_is_reported() {
        let host = Arc::new(MockHost::new());
        host.set_page("https://q", MockPage::new().with_agent(&[]));
        let worker = host.create_session("https://q", false).await.unwrap();

        let outcome = executor(host)
            .act(&worker, &ActionSpec::click("Chat Submit"))
            .await;
        assert!(!outcome.succeeded);
        assert!(outcome.detail.unwrap().contains("Chat Submit"));
    }

    #[tokio::test]
    async fn test_act_on_all_summarizes_partial_success() {
        let host = Arc::new(MockHost::new());
        host.set_page("https://ok", MockPage::new().with_element("button", "Chat Submit"));
        let a = host.create_session("https://ok", false).await.unwrap();
        let b = host.create_session("https://ok", false).await.unwrap();
        let c = host.create_session("https://empty", false).await.unwrap();
        let gone = WorkerId::from("vanished");

        let (outcomes, summary) = executor(host)
            .act_on_all(&[a, b, c, gone], &ActionSpec::click("Chat Submit"))
            .await;
        assert_eq!(outcomes.len(), 4);
        assert_eq!(
            summary,
            ActionSummary {
                succeeded: 2,
                failed: 2,
                total: 4
            }
        );
    }

    #[tokio::test]
    async fn test_extract_count_from_visible_text() {
        let host = Arc::new(MockHost::new());
        host.set_page(
            "https://q",
            MockPage::new().with_text("Great! You have 4 expert questions left this month."),
        );
        let worker = host.create_session("https://q", false).await.unwrap();

        let count = executor(host)
            .extract_count(&worker, &CountPatterns::questions_left())
            .await
            .unwrap();
        assert_eq!(count, Some(4));
    }
}
