// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Question document lookup.
//!
//! Each attempt probes the page for a question id, then asks the page to
//! POST a persisted GraphQL query with its own cookies. Id detection runs
//! on the Rust side over the probed URL, HTML and embedded page data.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{AttemptFailure, Extractor};
use crate::session::{Routine, SessionHost, WorkerId};

/// Pointer to the JSON-encoded answer body inside a lookup response.
pub const ANSWER_BODY_POINTER: &str =
    "/data/questionByUuid/displayAnswers/sqnaAnswers/answerData/0/bodyV2/text";

/// Detail used when no id strategy finds anything.
pub const ID_NOT_FOUND: &str =
    "Could not identify a valid Question UUID. Page may not be fully loaded.";

const PROBE_SCRIPT: &str = r#"() => {
  const data = window.__NEXT_DATA__;
  return {
    url: window.location.href,
    html: document.body ? document.body.innerHTML : "",
    pageProps: data && data.props ? data.props.pageProps || null : null
  };
}"#;

const FETCH_SCRIPT: &str = r#"async (endpoint, payload, headers) => {
  try {
    const response = await fetch(endpoint, {
      method: "POST",
      headers: headers,
      body: JSON.stringify(payload),
      credentials: "include"
    });
    return await response.json();
  } catch (e) {
    return { error: e.toString(), retry: true };
  }
}"#;

static URL_ID: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(
        r"(?:-q|question/)([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})",
    )
    .case_insensitive(true)
    .build()
    .expect("url id regex compiles")
});

static HTML_IDS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["questionUuid", "contentUuid", "uuid"]
        .iter()
        .map(|key| {
            RegexBuilder::new(&format!(r#""{key}"\s*:\s*"([0-9a-f-]{{36}})""#))
                .case_insensitive(true)
                .build()
                .expect("html id regex compiles")
        })
        .collect()
});

/// Endpoint settings for the lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionLookupConfig {
    /// GraphQL endpoint.
    pub endpoint: String,
    /// Operation name of the persisted query.
    pub operation_name: String,
    /// SHA-256 of the persisted query.
    pub persisted_query_hash: String,
    /// Client name header value.
    pub client_name: String,
    /// Client version header value.
    pub client_version: String,
    /// Optional `authorization` header value.
    pub authorization: Option<String>,
}

impl Default for QuestionLookupConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://gateway.chegg.com/one-graph/graphql".to_string(),
            operation_name: "QnaById".to_string(),
            persisted_query_hash:
                "bb6c7023b5bfb7b147725978ec7de015ae02d4de62ac8e17490782af338ce884".to_string(),
            client_name: "chegg-web".to_string(),
            client_version: "main-0b3da3e1-2210795236".to_string(),
            authorization: None,
        }
    }
}

/// What the probe routine reports about a page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageProbe {
    /// Current URL.
    #[serde(default)]
    pub url: String,
    /// Body HTML.
    #[serde(default)]
    pub html: String,
    /// Embedded page data, if the page has any.
    #[serde(default)]
    pub page_props: Option<Value>,
}

type IdStrategy = fn(&PageProbe) -> Option<String>;

/// Id strategies in priority order.
const ID_STRATEGIES: &[(&str, IdStrategy)] = &[
    ("page-data", id_from_page_data),
    ("url", id_from_url),
    ("html", id_from_html),
];

fn truthy_string(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn find_key(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::Object(map) => map
            .get(key)
            .and_then(truthy_string)
            .or_else(|| map.values().find_map(|v| find_key(v, key))),
        Value::Array(items) => items.iter().find_map(|v| find_key(v, key)),
        _ => None,
    }
}

fn id_from_page_data(probe: &PageProbe) -> Option<String> {
    let props = probe.page_props.as_ref()?;
    props
        .get("questionUuid")
        .and_then(truthy_string)
        .or_else(|| props.pointer("/question/uuid").and_then(truthy_string))
        .or_else(|| props.get("contentUuid").and_then(truthy_string))
        .or_else(|| find_key(props, "questionUuid"))
        .or_else(|| find_key(props, "contentUuid"))
}

fn id_from_url(probe: &PageProbe) -> Option<String> {
    URL_ID
        .captures(&probe.url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn id_from_html(probe: &PageProbe) -> Option<String> {
    HTML_IDS.iter().find_map(|re| {
        re.captures(&probe.html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// First id any strategy finds, with the strategy name.
pub fn locate_question_id(probe: &PageProbe) -> Option<(&'static str, String)> {
    ID_STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(probe).map(|id| (*name, id)))
}

/// [`Extractor`] for question documents.
#[derive(Debug, Clone, Default)]
pub struct QuestionLookupExtractor {
    config: QuestionLookupConfig,
}

impl QuestionLookupExtractor {
    /// Extractor using `config`.
    pub fn new(config: QuestionLookupConfig) -> Self {
        Self { config }
    }

    fn payload(&self, question_id: &str) -> Value {
        json!({
            "operationName": self.config.operation_name,
            "variables": { "id": question_id },
            "extensions": {
                "persistedQuery": {
                    "version": 1,
                    "sha256Hash": self.config.persisted_query_hash,
                }
            }
        })
    }

    fn headers(&self) -> Value {
        let mut headers = Map::new();
        headers.insert("accept".into(), json!("application/json"));
        headers.insert("content-type".into(), json!("application/json"));
        headers.insert(
            "apollographql-client-name".into(),
            json!(self.config.client_name),
        );
        headers.insert(
            "apollographql-client-version".into(),
            json!(self.config.client_version),
        );
        if let Some(auth) = &self.config.authorization {
            headers.insert("authorization".into(), json!(auth));
        }
        Value::Object(headers)
    }
}

/// Interpret a lookup response.
fn settle_response(
    response: Value,
    question_id: &str,
    url: &str,
) -> Result<Value, AttemptFailure> {
    if let Some(errors) = response.get("errors") {
        let message = errors
            .pointer("/0/message")
            .and_then(Value::as_str)
            .unwrap_or("GraphQL error");
        return Err(AttemptFailure::Retryable(message.to_string()));
    }
    if let Some(error) = response.get("error").and_then(Value::as_str) {
        let retry = response
            .get("retry")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        return Err(if retry {
            AttemptFailure::Retryable(error.to_string())
        } else {
            AttemptFailure::Terminal(error.to_string())
        });
    }

    let Value::Object(body) = response else {
        return Err(AttemptFailure::Retryable(
            "lookup returned a non-object response".to_string(),
        ));
    };
    let mut document = Map::new();
    document.insert("success".into(), Value::Bool(true));
    document.insert("_debug_uuid".into(), json!(question_id));
    document.insert("_debug_url".into(), json!(url));
    document.extend(body);
    Ok(Value::Object(document))
}

#[async_trait]
impl Extractor for QuestionLookupExtractor {
    fn name(&self) -> &str {
        "question-lookup"
    }

    async fn attempt(
        &self,
        host: &dyn SessionHost,
        worker: &WorkerId,
    ) -> Result<Value, AttemptFailure> {
        let probe = host
            .run_in_session(
                worker,
                Routine::Script {
                    source: PROBE_SCRIPT.to_string(),
                    args: Vec::new(),
                },
            )
            .await
            .map_err(|e| AttemptFailure::Retryable(e.to_string()))?;
        let probe: PageProbe = serde_json::from_value(probe)
            .map_err(|e| AttemptFailure::Retryable(format!("unreadable page probe: {e}")))?;

        let Some((strategy, question_id)) = locate_question_id(&probe) else {
            return Err(AttemptFailure::Retryable(ID_NOT_FOUND.to_string()));
        };
        tracing::debug!(worker = %worker, strategy, question_id = %question_id, "Located question id");

        let response = host
            .run_in_session(
                worker,
                Routine::Script {
                    source: FETCH_SCRIPT.to_string(),
                    args: vec![
                        json!(self.config.endpoint),
                        self.payload(&question_id),
                        self.headers(),
                    ],
                },
            )
            .await
            .map_err(|e| AttemptFailure::Retryable(e.to_string()))?;

        settle_response(response, &question_id, &probe.url)
    }
}
