// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Element discovery over page snapshots.
//!
//! Given a semantic target (a test id, an accessible label, or a phrase
//! like "Ask an expert") a [`DiscoveryChain`] tries each strategy in order
//! and returns the snapshot index of the first element that matches.

use crate::session::{ElementInfo, PageSnapshot};

/// Attribute used for stable test ids.
pub const TEST_ID_ATTRIBUTE: &str = "data-test";

/// One way of locating an element for a target.
pub trait DiscoveryStrategy: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Snapshot index of the matching element, if any.
    fn locate(&self, page: &PageSnapshot, target: &str) -> Option<usize>;
}

/// Exact match on an attribute value.
#[derive(Debug, Clone)]
pub struct AttributeMatch {
    attribute: String,
}

impl AttributeMatch {
    /// Match on `attribute`.
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }
}

impl Default for AttributeMatch {
    fn default() -> Self {
        Self::new(TEST_ID_ATTRIBUTE)
    }
}

impl DiscoveryStrategy for AttributeMatch {
    fn name(&self) -> &'static str {
        "attribute"
    }

    fn locate(&self, page: &PageSnapshot, target: &str) -> Option<usize> {
        page.elements
            .iter()
            .find(|el| el.attribute(&self.attribute) == Some(target))
            .map(|el| el.index)
    }
}

/// Match on the accessible label: exact first, then case-insensitive
/// containment.
#[derive(Debug, Clone, Default)]
pub struct AccessibleLabelMatch;

impl DiscoveryStrategy for AccessibleLabelMatch {
    fn name(&self) -> &'static str {
        "aria-label"
    }

    fn locate(&self, page: &PageSnapshot, target: &str) -> Option<usize> {
        let exact = page
            .elements
            .iter()
            .find(|el| el.aria_label.as_deref() == Some(target));
        if let Some(el) = exact {
            return Some(el.index);
        }

        let needle = target.to_lowercase();
        if needle.trim().is_empty() {
            return None;
        }
        page.elements
            .iter()
            .find(|el| {
                el.aria_label
                    .as_deref()
                    .is_some_and(|label| label.to_lowercase().contains(&needle))
            })
            .map(|el| el.index)
    }
}

/// Alternative phrasings for well-known targets.
///
/// Each target maps to a list of word sets; an element matches when its
/// text contains every word of at least one set.
#[derive(Debug, Clone, Default)]
pub struct SynonymRules {
    rules: Vec<(String, Vec<Vec<String>>)>,
}

impl SynonymRules {
    /// No rules; plain containment only.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rules for the question-asking flow.
    pub fn standard() -> Self {
        Self::empty()
            .with_rule("ask an expert", &[&["ask", "expert"]])
            .with_rule("post", &[&["post", "question"]])
            .with_rule("submit", &[&["ask", "expert"], &["post", "question"]])
    }

    /// Add a rule for `target` (case-insensitive).
    pub fn with_rule(mut self, target: &str, alternatives: &[&[&str]]) -> Self {
        let sets = alternatives
            .iter()
            .map(|set| set.iter().map(|w| w.to_lowercase()).collect())
            .collect();
        self.rules.push((target.to_lowercase(), sets));
        self
    }

    fn alternatives(&self, target: &str) -> Option<&[Vec<String>]> {
        self.rules
            .iter()
            .find(|(key, _)| key == target)
            .map(|(_, sets)| sets.as_slice())
    }
}

/// Case-insensitive text containment over clickable-looking elements.
#[derive(Debug, Clone)]
pub struct TextMatch {
    synonyms: SynonymRules,
    tags: Vec<String>,
}

impl Default for TextMatch {
    fn default() -> Self {
        Self::new(SynonymRules::standard())
    }
}

impl TextMatch {
    /// Text matching with the given synonym rules.
    pub fn new(synonyms: SynonymRules) -> Self {
        Self {
            synonyms,
            tags: ["button", "a", "span", "div"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    fn is_candidate(&self, el: &ElementInfo) -> bool {
        self.tags.iter().any(|t| t == &el.tag) || el.role.as_deref() == Some("button")
    }

    fn matches(&self, el: &ElementInfo, needle: &str) -> bool {
        let text = el.text.to_lowercase();
        match self.synonyms.alternatives(needle) {
            Some(sets) => sets
                .iter()
                .any(|set| set.iter().all(|word| text.contains(word.as_str()))),
            None => text.contains(needle),
        }
    }
}

impl DiscoveryStrategy for TextMatch {
    fn name(&self) -> &'static str {
        "text"
    }

    fn locate(&self, page: &PageSnapshot, target: &str) -> Option<usize> {
        let needle = target.to_lowercase();
        if needle.trim().is_empty() {
            return None;
        }
        page.elements
            .iter()
            .filter(|el| self.is_candidate(el))
            .find(|el| self.matches(el, &needle))
            .map(|el| el.index)
    }
}

/// Ordered list of strategies; the first hit wins.
pub struct DiscoveryChain {
    strategies: Vec<Box<dyn DiscoveryStrategy>>,
}

impl DiscoveryChain {
    /// Test id, then accessible label, then text with the standard synonyms.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(AttributeMatch::default()),
            Box::new(AccessibleLabelMatch),
            Box::new(TextMatch::default()),
        ])
    }

    /// Chain over explicit strategies.
    pub fn new(strategies: Vec<Box<dyn DiscoveryStrategy>>) -> Self {
        Self { strategies }
    }

    /// Strategy names in order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First match as `(strategy name, snapshot index)`.
    pub fn locate(&self, page: &PageSnapshot, target: &str) -> Option<(&'static str, usize)> {
        self.strategies
            .iter()
            .find_map(|s| s.locate(page, target).map(|index| (s.name(), index)))
    }
}

impl Default for DiscoveryChain {
    fn default() -> Self {
        Self::standard()
    }
}
