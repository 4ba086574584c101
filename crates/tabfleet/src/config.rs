// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the tabfleet orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use tabfleet_protocol::ClientConfig;

use crate::extraction::RetryPolicy;
use crate::extraction::question::QuestionLookupConfig;

/// Orchestrator configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Control-plane client settings.
    pub control_plane: ClientConfig,
    /// Base URL of the session host bridge.
    pub host_url: String,
    /// Directory holding persisted orchestrator state.
    pub data_dir: PathBuf,
    /// Interval between command polls.
    pub poll_interval: Duration,
    /// Delay before the first poll.
    pub initial_poll_delay: Duration,
    /// Interval between registration/heartbeat ticks.
    pub heartbeat_interval: Duration,
    /// Delay before the first registration attempt.
    pub register_delay: Duration,
    /// Profile name override for auto-registration.
    pub profile_name: Option<String>,
    /// Document lookup endpoint settings.
    pub question_lookup: QuestionLookupConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ClientConfig::default();

        let control_plane = ClientConfig {
            base_url: env_or("TABFLEET_BASE_URL", &defaults.base_url),
            api_path: env_or("TABFLEET_API_PATH", &defaults.api_path),
            queue_api_path: env_or("TABFLEET_QUEUE_API_PATH", &defaults.queue_api_path),
            extension_id: env_or("TABFLEET_EXTENSION_ID", &defaults.extension_id),
            request_timeout: env_millis("TABFLEET_REQUEST_TIMEOUT_MS", 30_000)?,
        };

        let host_url = env_or("TABFLEET_HOST_URL", "http://127.0.0.1:9333");
        let data_dir = PathBuf::from(env_or("TABFLEET_DATA_DIR", ".data"));

        let poll_interval = env_millis("TABFLEET_POLL_INTERVAL_MS", 5_000)?;
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                var: "TABFLEET_POLL_INTERVAL_MS",
                value: "0".to_string(),
            });
        }

        let profile_name = std::env::var("TABFLEET_PROFILE_NAME")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let lookup_defaults = QuestionLookupConfig::default();
        let question_lookup = QuestionLookupConfig {
            endpoint: env_or("TABFLEET_LOOKUP_ENDPOINT", &lookup_defaults.endpoint),
            persisted_query_hash: env_or(
                "TABFLEET_LOOKUP_QUERY_HASH",
                &lookup_defaults.persisted_query_hash,
            ),
            authorization: std::env::var("TABFLEET_LOOKUP_AUTHORIZATION")
                .ok()
                .or(lookup_defaults.authorization),
            ..lookup_defaults
        };

        Ok(Self {
            control_plane,
            host_url,
            data_dir,
            poll_interval,
            initial_poll_delay: env_millis("TABFLEET_INITIAL_POLL_DELAY_MS", 3_000)?,
            heartbeat_interval: env_millis("TABFLEET_HEARTBEAT_INTERVAL_MS", 5_000)?,
            register_delay: env_millis("TABFLEET_REGISTER_DELAY_MS", 2_000)?,
            profile_name,
            question_lookup,
        })
    }

    /// Path of the persisted state file.
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_millis(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        Err(_) => Ok(Duration::from_millis(default)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an unusable value.
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// A required runtime component was not supplied.
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Waits, polls, and retry settings used by the built-in workflows.
///
/// Production defaults mirror the pacing the target site tolerates;
/// [`WorkflowTimings::immediate`] collapses every delay for tests.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTimings {
    /// Settle time after opening workers.
    pub initial_load_wait: Duration,
    /// Settle time after reloading every worker.
    pub reload_settle_wait: Duration,
    /// Pause after the first action wave.
    pub post_click_wait: Duration,
    /// Wait before the second action wave.
    pub pre_submit_wait: Duration,
    /// Wait after the second action wave before scraping.
    pub post_submit_wait: Duration,
    /// Pause after reporting the scraped count.
    pub report_pause: Duration,
    /// Settle time between steps of single-worker sequences.
    pub page_settle_wait: Duration,
    /// Delay before looking for the first button of a sequence.
    pub first_lookup_delay: Duration,
    /// Delay before each fallback discovery attempt.
    pub fallback_delay: Duration,
    /// Longer fallback delay used while the first button of a sequence
    /// may still be rendering.
    pub slow_fallback_delay: Duration,
    /// Delay before the load poll starts.
    pub load_initial_delay: Duration,
    /// Load-status poll cadence.
    pub load_poll_interval: Duration,
    /// Upper bound on waiting for a page to finish loading.
    pub load_ceiling: Duration,
    /// Extra wait for client-rendered content after load.
    pub dynamic_content_wait: Duration,
    /// Retry policy for document extraction.
    pub extraction_retry: RetryPolicy,
    /// Delay before closing a worker after a successful extraction.
    pub close_grace: Duration,
    /// Delay before hiding the status overlay after a sequence ends.
    pub hide_status_delay: Duration,
    /// Keep-alive ping period while a run is active.
    pub keep_alive_period: Duration,
    /// Timeout for a single session host call during actions.
    pub action_timeout: Duration,
}

impl Default for WorkflowTimings {
    fn default() -> Self {
        Self {
            initial_load_wait: Duration::from_secs(5),
            reload_settle_wait: Duration::from_secs(8),
            post_click_wait: Duration::from_secs(2),
            pre_submit_wait: Duration::from_secs(8),
            post_submit_wait: Duration::from_secs(25),
            report_pause: Duration::from_secs(2),
            page_settle_wait: Duration::from_secs(10),
            first_lookup_delay: Duration::from_secs(5),
            fallback_delay: Duration::from_secs(2),
            slow_fallback_delay: Duration::from_secs(3),
            load_initial_delay: Duration::from_secs(2),
            load_poll_interval: Duration::from_millis(500),
            load_ceiling: Duration::from_secs(20),
            dynamic_content_wait: Duration::from_secs(8),
            extraction_retry: RetryPolicy::default(),
            close_grace: Duration::from_millis(1500),
            hide_status_delay: Duration::from_secs(5),
            keep_alive_period: Duration::from_secs(2),
            action_timeout: Duration::from_secs(15),
        }
    }
}

impl WorkflowTimings {
    /// Timings with every wait set to zero. Retry attempt counts are kept.
    pub fn immediate() -> Self {
        Self {
            initial_load_wait: Duration::ZERO,
            reload_settle_wait: Duration::ZERO,
            post_click_wait: Duration::ZERO,
            pre_submit_wait: Duration::ZERO,
            post_submit_wait: Duration::ZERO,
            report_pause: Duration::ZERO,
            page_settle_wait: Duration::ZERO,
            first_lookup_delay: Duration::ZERO,
            fallback_delay: Duration::ZERO,
            slow_fallback_delay: Duration::ZERO,
            load_initial_delay: Duration::ZERO,
            load_poll_interval: Duration::from_millis(1),
            load_ceiling: Duration::from_millis(50),
            dynamic_content_wait: Duration::ZERO,
            extraction_retry: RetryPolicy::new(3, Duration::ZERO),
            close_grace: Duration::ZERO,
            hide_status_delay: Duration::ZERO,
            keep_alive_period: Duration::ZERO,
            action_timeout: Duration::from_secs(5),
        }
    }

    /// Set the extraction retry policy.
    pub fn with_extraction_retry(mut self, policy: RetryPolicy) -> Self {
        self.extraction_retry = policy;
        self
    }
}
