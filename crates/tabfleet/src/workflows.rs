// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Built-in workflow plans.
//!
//! Each command action that drives workers maps to one [`WorkflowPlan`]
//! built here from its typed parameters and the configured
//! [`WorkflowTimings`].

use std::sync::Arc;
use std::time::Duration;

use tabfleet_protocol::{OpenBatchParams, ResubscribeParams, UnblurParams};

use crate::config::WorkflowTimings;
use crate::engine::{ClickAttempt, Completion, ReportSpec, StepKind, StepSpec, WorkflowPlan};
use crate::executor::{ActionSpec, CountPatterns};
use crate::extraction::Extractor;
use crate::extraction::question::ANSWER_BODY_POINTER;

/// Name of the fan-out workflow.
pub const OPEN_BATCH: &str = "open-batch";
/// Name of the subscription restart workflow.
pub const RESUBSCRIBE: &str = "resubscribe";
/// Name of the document extraction workflow.
pub const UNBLUR: &str = "unblur-extract";

/// Target of the first fan-out action wave.
pub const ASK_TARGET: &str = "Ask an expert";
/// Target of the second fan-out action wave.
pub const SUBMIT_TARGET: &str = "Chat Submit";

/// Fan-out: open `urls × count` workers, drive them through both action
/// waves, sample the remaining-question count from the first worker and
/// close everything.
pub fn open_batch_plan(params: &OpenBatchParams, timings: &WorkflowTimings) -> WorkflowPlan {
    let steps = vec![
        StepSpec::new(
            "📂 Opening tabs...",
            StepKind::OpenWorkers {
                urls: params.urls.clone(),
                count_per_url: params.count,
            },
        ),
        StepSpec::new(
            format!(
                "⏳ Waiting for page to load ({}s)...",
                timings.initial_load_wait.as_secs()
            ),
            StepKind::Countdown(timings.initial_load_wait),
        ),
        StepSpec::new("🔄 Reloading pages...", StepKind::ReloadAll),
        StepSpec::new(
            format!(
                "⏳ Waiting after reload ({}s)...",
                timings.reload_settle_wait.as_secs()
            ),
            StepKind::Countdown(timings.reload_settle_wait),
        ),
        StepSpec::new(
            "🔘 Clicking Ask an expert...",
            StepKind::ActOnAll {
                action: ActionSpec::click(ASK_TARGET),
                summary: Some("✅ Step 1: {succeeded}/{total} clicked".to_string()),
            },
        )
        .wait_after(timings.post_click_wait),
        StepSpec::new(
            format!("⏳ Waiting {}s...", timings.pre_submit_wait.as_secs()),
            StepKind::Countdown(timings.pre_submit_wait),
        ),
        StepSpec::new(
            "➡️ Clicking Submit...",
            StepKind::ActOnAll {
                action: ActionSpec::click(SUBMIT_TARGET),
                summary: None,
            },
        ),
        StepSpec::new(
            format!(
                "⏳ Waiting {} seconds...",
                timings.post_submit_wait.as_secs()
            ),
            StepKind::Countdown(timings.post_submit_wait),
        ),
        StepSpec::new(
            "📊 Checking questions left...",
            StepKind::ExtractCount {
                patterns: CountPatterns::questions_left(),
            },
        ),
        StepSpec::new(
            "📤 Reporting questions left...",
            StepKind::Report(ReportSpec::QuestionsLeft),
        )
        .wait_after(timings.report_pause),
        StepSpec::new("🗑️ Closing tabs...", StepKind::CloseAll),
    ];

    WorkflowPlan {
        name: OPEN_BATCH.to_string(),
        steps,
        on_error: vec![StepSpec::new("🗑️ Closing tabs...", StepKind::CloseAll)],
        completion: Completion::WithQuestionsLeft("✅ Completed!".to_string()),
    }
}

/// Destinations and discovery targets of the subscription restart
/// sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResubscribeTargets {
    /// First destination; a command's `url` overrides it.
    pub orders_url: String,
    /// Destination of the resubscribe half.
    pub account_url: String,
    /// Cancel button targets (optional step).
    pub cancel: Vec<String>,
    /// Cancellation confirmation targets.
    pub confirm: Vec<String>,
    /// Resubscribe button targets.
    pub resubscribe: Vec<String>,
    /// Auto-renew toggle targets (optional step).
    pub auto_renew: Vec<String>,
}

impl Default for ResubscribeTargets {
    fn default() -> Self {
        Self {
            orders_url: "https://www.chegg.com/my/orders".to_string(),
            account_url: "https://www.chegg.com/my/account".to_string(),
            cancel: strings(&[
                "subscription-cancel-CHEGG_STUDY-button",
                "Cancel subscription - Chegg Study",
                "Cancel subscription",
                "cancel",
            ]),
            confirm: strings(&[
                "cancelation-section-cancel-action-cancel-button",
                "Cancel subscription ",
            ]),
            resubscribe: strings(&[
                "subscription-resubscribe-BUNDLE-secondary-button",
                "Resubscribe Chegg Study Pack",
                "Resubscribe",
            ]),
            auto_renew: strings(&["CTA_BUTTON", "Auto-renew"]),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Pair each target with a delay and an announcement. The first attempt
/// runs after `first_delay` silently; later ones after `delay`, announced
/// with the matching entry of `announces` when one exists.
fn attempts(
    targets: &[String],
    first_delay: Duration,
    delay: Duration,
    announces: &[&str],
) -> Vec<ClickAttempt> {
    targets
        .iter()
        .enumerate()
        .map(|(i, target)| match i {
            0 => ClickAttempt {
                target: target.clone(),
                delay_before: first_delay,
                announce: None,
            },
            _ => ClickAttempt {
                target: target.clone(),
                delay_before: delay,
                announce: announces.get(i - 1).map(|m| m.to_string()),
            },
        })
        .collect()
}

/// Single-session subscription restart: cancel on the orders page, then
/// resubscribe on the account page. The worker stays open afterwards.
pub fn resubscribe_plan(
    targets: &ResubscribeTargets,
    params: &ResubscribeParams,
    timings: &WorkflowTimings,
) -> WorkflowPlan {
    let orders_url = params
        .url
        .clone()
        .unwrap_or_else(|| targets.orders_url.clone());
    let await_load = || StepKind::AwaitLoad {
        initial_delay: Duration::ZERO,
        poll: timings.load_poll_interval,
        ceiling: timings.load_ceiling,
    };
    let settle = timings.page_settle_wait;

    let steps = vec![
        StepSpec::new(
            "🌐 Opening orders page...",
            StepKind::OpenSingle {
                url: orders_url,
                active: true,
            },
        ),
        StepSpec::new("⏳ Waiting for page to load...", await_load()).wait_after(settle),
        StepSpec::new(
            "🔍 Looking for Cancel button...",
            StepKind::ClickFirst {
                attempts: attempts(
                    &targets.cancel,
                    timings.first_lookup_delay,
                    timings.slow_fallback_delay,
                    &[
                        "⚠️ Trying aria-label...",
                        "⚠️ Trying simple text search...",
                        "⚠️ Checking all buttons on page...",
                    ],
                ),
                success: Some("✅ Cancel button clicked!".to_string()),
            },
        )
        .optional("❌ Could not find Cancel button...")
        .wait_after(settle),
        StepSpec::new(
            "✅ Confirming cancellation...",
            StepKind::ClickFirst {
                attempts: attempts(
                    &targets.confirm,
                    Duration::ZERO,
                    timings.fallback_delay,
                    &["⚠️ Trying alternative confirmation..."],
                ),
                success: None,
            },
        )
        .required("Confirmation button not found")
        .wait_after(settle),
        StepSpec::new(
            "🔄 Opening account page...",
            StepKind::Navigate {
                url: targets.account_url.clone(),
            },
        ),
        StepSpec::new("⏳ Waiting for page to load...", await_load()).wait_after(settle),
        StepSpec::new(
            "🔘 Clicking Resubscribe...",
            StepKind::ClickFirst {
                attempts: attempts(
                    &targets.resubscribe,
                    Duration::ZERO,
                    timings.fallback_delay,
                    &[
                        "⚠️ Trying aria-label Resubscribe...",
                        "⚠️ Trying text-based Resubscribe...",
                    ],
                ),
                success: None,
            },
        )
        .required("Resubscribe button not found")
        .wait_after(settle),
        StepSpec::new(
            "✅ Enabling Auto-renew...",
            StepKind::ClickFirst {
                attempts: attempts(
                    &targets.auto_renew,
                    Duration::ZERO,
                    timings.fallback_delay,
                    &["⚠️ Trying text-based Auto-renew..."],
                ),
                success: None,
            },
        )
        .optional("⚠️ Auto-renew button not found, but process may be complete."),
        StepSpec::new(
            "🎉 Finishing...",
            StepKind::DismissStatus {
                delay: timings.hide_status_delay,
            },
        ),
    ];

    WorkflowPlan {
        name: RESUBSCRIBE.to_string(),
        steps,
        on_error: Vec::new(),
        completion: Completion::Fixed(
            "✅ Subscription restart completed successfully!".to_string(),
        ),
    }
}

/// Single-session document extraction: open the page, wait for it to load,
/// extract with retries and close the worker after a short grace delay.
pub fn unblur_plan(
    params: &UnblurParams,
    extractor: Arc<dyn Extractor>,
    timings: &WorkflowTimings,
) -> WorkflowPlan {
    let progress = |detail: &str| {
        StepSpec::new(
            detail,
            StepKind::Report(ReportSpec::CommandProgress(detail.to_string())),
        )
    };

    let steps = vec![
        progress("Opening URL..."),
        StepSpec::new(
            "🌐 Opening page...",
            StepKind::OpenSingle {
                url: params.url.clone(),
                active: true,
            },
        )
        .required_as_is(),
        progress("Waiting for page to load..."),
        StepSpec::new(
            "⏳ Waiting for page to load...",
            StepKind::AwaitLoad {
                initial_delay: timings.load_initial_delay,
                poll: timings.load_poll_interval,
                ceiling: timings.load_ceiling,
            },
        ),
        StepSpec::new(
            "⏳ Waiting for dynamic content...",
            StepKind::Pause(timings.dynamic_content_wait),
        ),
        progress("Extracting Data..."),
        StepSpec::new(
            "📥 Extracting data...",
            StepKind::ExtractDocument {
                extractor,
                policy: timings.extraction_retry,
                nested_pointer: Some(ANSWER_BODY_POINTER.to_string()),
            },
        )
        .required_as_is(),
        StepSpec::new("🗑️ Closing tab...", StepKind::CloseAll).wait_before(timings.close_grace),
    ];

    WorkflowPlan {
        name: UNBLUR.to_string(),
        steps,
        on_error: vec![StepSpec::new("🗑️ Closing tab...", StepKind::CloseAll)],
        completion: Completion::Fixed("✅ Data extracted".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Requirement;
    use crate::extraction::question::QuestionLookupExtractor;

    fn batch() -> OpenBatchParams {
        OpenBatchParams {
            urls: vec!["https://a.test".into()],
            count: 2,
        }
    }

    #[test]
    fn test_open_batch_plan_shape() {
        let plan = open_batch_plan(&batch(), &WorkflowTimings::default());
        let kinds: Vec<_> = plan.steps.iter().map(|s| s.kind.name()).collect();
        assert_eq!(
            kinds,
            vec![
                "open-workers",
                "countdown",
                "reload-all",
                "countdown",
                "act-on-all",
                "countdown",
                "act-on-all",
                "countdown",
                "extract-count",
                "report",
                "close-all",
            ]
        );
        assert_eq!(plan.steps[1].label, "⏳ Waiting for page to load (5s)...");
        assert_eq!(plan.on_error.len(), 1);
    }

    #[test]
    fn test_resubscribe_requirements() {
        let plan = resubscribe_plan(
            &ResubscribeTargets::default(),
            &ResubscribeParams { url: None },
            &WorkflowTimings::default(),
        );
        let required: Vec<_> = plan
            .steps
            .iter()
            .filter_map(|s| match &s.requirement {
                Requirement::Required { error } => error.clone(),
                Requirement::Optional { .. } => None,
            })
            .collect();
        assert_eq!(
            required,
            vec!["Confirmation button not found", "Resubscribe button not found"]
        );
        assert!(plan.on_error.is_empty());
    }

    #[test]
    fn test_resubscribe_url_override() {
        let plan = resubscribe_plan(
            &ResubscribeTargets::default(),
            &ResubscribeParams {
                url: Some("https://orders.test".into()),
            },
            &WorkflowTimings::default(),
        );
        match &plan.steps[0].kind {
            StepKind::OpenSingle { url, .. } => assert_eq!(url, "https://orders.test"),
            other => panic!("unexpected first step {other:?}"),
        }
    }

    #[test]
    fn test_cancel_attempts_announce_fallbacks() {
        let timings = WorkflowTimings::default();
        let plan = resubscribe_plan(
            &ResubscribeTargets::default(),
            &ResubscribeParams { url: None },
            &timings,
        );
        let StepKind::ClickFirst { attempts, .. } = &plan.steps[2].kind else {
            panic!("expected click-first");
        };
        assert_eq!(attempts.len(), 4);
        assert_eq!(attempts[0].delay_before, timings.first_lookup_delay);
        assert!(attempts[0].announce.is_none());
        assert_eq!(attempts[3].announce.as_deref(), Some("⚠️ Checking all buttons on page..."));
    }

    #[test]
    fn test_unblur_plan_closes_after_grace() {
        let timings = WorkflowTimings::default();
        let plan = unblur_plan(
            &UnblurParams {
                url: "https://q.test".into(),
                queue_id: None,
            },
            Arc::new(QuestionLookupExtractor::default()),
            &timings,
        );
        let last = plan.steps.last().unwrap();
        assert_eq!(last.kind.name(), "close-all");
        assert_eq!(last.wait_before, timings.close_grace);
        assert_eq!(plan.on_error[0].wait_before, Duration::ZERO);
    }
}
