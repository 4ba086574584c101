// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Structured document extraction with bounded retries.
//!
//! An [`Extractor`] makes one attempt at pulling a JSON document out of a
//! worker's page. [`extract_with_retry`] drives attempts under a
//! [`RetryPolicy`]: retryable failures are retried after a fixed delay,
//! terminal failures stop immediately, and running out of attempts is
//! itself terminal.

pub mod question;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::session::{SessionHost, WorkerId};

/// Key set when a nested document was decoded.
pub const CONVERTED_KEY: &str = "converted_result";
/// Key set when a nested document could not be decoded.
pub const CONVERSION_ERROR_KEY: &str = "conversion_error";

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first, at least 1.
    pub max_attempts: u32,
    /// Delay between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Policy with `max_attempts` (raised to 1 when 0) and `delay`.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// Worth another attempt (page not ready, transient endpoint error).
    Retryable(String),
    /// Pointless to retry.
    Terminal(String),
}

impl AttemptFailure {
    /// Failure detail.
    pub fn detail(&self) -> &str {
        match self {
            AttemptFailure::Retryable(d) | AttemptFailure::Terminal(d) => d,
        }
    }
}

/// Extraction gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// Every attempt failed with a retryable error.
    #[error("{last_detail}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Detail of the final failure.
        last_detail: String,
    },

    /// An attempt failed terminally.
    #[error("{0}")]
    Terminal(String),
}

/// One extraction attempt against a worker.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Make one attempt.
    async fn attempt(
        &self,
        host: &dyn SessionHost,
        worker: &WorkerId,
    ) -> Result<Value, AttemptFailure>;
}

/// Drive `extractor` under `policy`. `on_attempt(n, max)` runs before each
/// attempt. Exactly `max_attempts - 1` delays elapse when every attempt
/// fails.
pub async fn extract_with_retry(
    host: &dyn SessionHost,
    worker: &WorkerId,
    extractor: &dyn Extractor,
    policy: RetryPolicy,
    mut on_attempt: impl FnMut(u32, u32) + Send,
) -> Result<Value, ExtractionError> {
    let max = policy.max_attempts.max(1);
    let mut last_detail = String::new();

    for attempt in 1..=max {
        on_attempt(attempt, max);
        match extractor.attempt(host, worker).await {
            Ok(document) => {
                debug!(extractor = extractor.name(), attempt, "Extraction succeeded");
                return Ok(document);
            }
            Err(AttemptFailure::Terminal(detail)) => {
                warn!(extractor = extractor.name(), attempt, %detail, "Extraction failed terminally");
                return Err(ExtractionError::Terminal(detail));
            }
            Err(AttemptFailure::Retryable(detail)) => {
                warn!(extractor = extractor.name(), attempt, max, %detail, "Extraction attempt failed");
                last_detail = detail;
                if attempt < max && !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    Err(ExtractionError::Exhausted {
        attempts: max,
        last_detail,
    })
}

/// Structure-preserving copy of a document.
pub fn passthrough(document: &Value) -> Value {
    match document {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), passthrough(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(passthrough).collect()),
        scalar => scalar.clone(),
    }
}

/// What [`attach_nested_document`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NestedDocument {
    /// No JSON string at the pointer.
    Absent,
    /// Decoded and attached under [`CONVERTED_KEY`].
    Attached,
    /// Decoding failed; the error is under [`CONVERSION_ERROR_KEY`].
    Failed(String),
}

/// Decode the JSON-encoded string at `pointer` inside `payload` and attach
/// its passthrough under [`CONVERTED_KEY`]. A decode failure is recorded
/// under [`CONVERSION_ERROR_KEY`] instead; the extraction itself still
/// counts as successful.
pub fn attach_nested_document(payload: &mut Value, pointer: &str) -> NestedDocument {
    let Some(encoded) = payload.pointer(pointer).and_then(Value::as_str) else {
        return NestedDocument::Absent;
    };

    let decoded = serde_json::from_str::<Value>(encoded);
    let Some(object) = payload.as_object_mut() else {
        return NestedDocument::Failed("payload is not an object".to_string());
    };

    match decoded {
        Ok(Value::Null) => NestedDocument::Absent,
        Ok(inner) => {
            object.insert(CONVERTED_KEY.to_string(), passthrough(&inner));
            NestedDocument::Attached
        }
        Err(e) => {
            let message = e.to_string();
            object.insert(
                CONVERSION_ERROR_KEY.to_string(),
                Value::String(message.clone()),
            );
            NestedDocument::Failed(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MockHost;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct Scripted {
        results: Mutex<VecDeque<Result<Value, AttemptFailure>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(results: Vec<Result<Value, AttemptFailure>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Extractor for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn attempt(
            &self,
            _host: &dyn SessionHost,
            _worker: &WorkerId,
        ) -> Result<Value, AttemptFailure> {
            *self.calls.lock().unwrap() += 1;
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AttemptFailure::Retryable("empty".into())))
        }
    }

    fn retryable(detail: &str) -> Result<Value, AttemptFailure> {
        Err(AttemptFailure::Retryable(detail.to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_waits_exactly_k_minus_one_delays() {
        let host = MockHost::new();
        let worker = WorkerId::from("w");
        let extractor = Scripted::new(vec![
            retryable("first"),
            retryable("second"),
            retryable("third"),
        ]);
        let policy = RetryPolicy::new(3, Duration::from_secs(5));

        let start = Instant::now();
        let mut seen = Vec::new();
        let err = extract_with_retry(&host, &worker, &extractor, policy, |n, max| {
            seen.push((n, max))
        })
        .await
        .unwrap_err();

        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(extractor.calls(), 3);
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(
            err,
            ExtractionError::Exhausted {
                attempts: 3,
                last_detail: "third".to_string()
            }
        );
        assert_eq!(err.to_string(), "third");
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry() {
        let host = MockHost::new();
        let worker = WorkerId::from("w");
        let extractor = Scripted::new(vec![retryable("not ready"), Ok(json!({ "ok": true }))]);

        let start = Instant::now();
        let doc = extract_with_retry(&host, &worker, &extractor, RetryPolicy::default(), |_, _| {})
            .await
            .unwrap();
        assert_eq!(doc, json!({ "ok": true }));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_stops_immediately() {
        let host = MockHost::new();
        let worker = WorkerId::from("w");
        let extractor = Scripted::new(vec![
            Err(AttemptFailure::Terminal("forbidden".into())),
            Ok(json!({})),
        ]);

        let start = Instant::now();
        let err = extract_with_retry(&host, &worker, &extractor, RetryPolicy::default(), |_, _| {})
            .await
            .unwrap_err();
        assert_eq!(err, ExtractionError::Terminal("forbidden".into()));
        assert_eq!(extractor.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let host = MockHost::new();
        let worker = WorkerId::from("w");
        let extractor = Scripted::new(vec![Ok(json!(1))]);
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
        assert!(
            extract_with_retry(&host, &worker, &extractor, policy, |_, _| {})
                .await
                .is_ok()
        );
    }

    #[test]
    fn test_passthrough_is_idempotent_and_preserves_structure() {
        let doc = json!({
            "a": [1, 2.5, "x", null, { "b": false }],
            "nested": { "deep": { "list": [] } },
            "empty": {}
        });
        let once = passthrough(&doc);
        assert_eq!(once, doc);
        assert_eq!(passthrough(&once), once);
    }

    #[test]
    fn test_attach_nested_document() {
        let mut payload = json!({
            "data": { "answer": { "text": "{\"blocks\":[{\"t\":\"hi\"}]}" } }
        });
        let outcome = attach_nested_document(&mut payload, "/data/answer/text");
        assert_eq!(outcome, NestedDocument::Attached);
        assert_eq!(payload[CONVERTED_KEY], json!({ "blocks": [{ "t": "hi" }] }));
    }

    #[test]
    fn test_attach_nested_document_records_decode_error() {
        let mut payload = json!({ "data": { "text": "{broken" } });
        let outcome = attach_nested_document(&mut payload, "/data/text");
        assert!(matches!(outcome, NestedDocument::Failed(_)));
        assert!(payload[CONVERSION_ERROR_KEY].is_string());
        assert!(payload.get(CONVERTED_KEY).is_none());
    }

    #[test]
    fn test_attach_nested_document_absent() {
        let mut payload = json!({ "data": {} });
        assert_eq!(
            attach_nested_document(&mut payload, "/data/text"),
            NestedDocument::Absent
        );
        assert_eq!(payload, json!({ "data": {} }));
    }
}
