//! The static rule set shared by every pass.
//!
//! A [`RuleSet`] bundles the block and malicious-code patterns, keyword and
//! token vocabularies, the trusted-destination allow-list, and the heuristic
//! [`Weights`]. It is immutable once built and is shared behind an
//! [`Arc`](std::sync::Arc) by the gateway and by in-page sessions, so scores
//! are comparable across both contexts.

pub mod blocklist;
pub mod defaults;

use std::collections::BTreeMap;

use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};
use crate::feedback::Label;

/// Lowest value an adaptively nudged tag weight may reach.
pub const TAG_WEIGHT_FLOOR: f64 = 0.1;
/// Highest value an adaptively nudged tag weight may reach.
pub const TAG_WEIGHT_CEILING: f64 = 10.0;
/// Step applied to a tag weight for each feedback label.
pub const TAG_WEIGHT_STEP: f64 = 0.5;

/// Per-signal heuristic weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub keyword: f64,
    pub events: f64,
    pub styles: f64,
    pub size: f64,
    pub patterns: f64,
    /// Disqualifying on its own; an order of magnitude above the others.
    pub malicious: f64,
    pub feedback_boost: f64,
    pub feedback_penalty: f64,
    /// Fixed score returned for trusted resources, skipping every other signal.
    pub trusted: f64,
    pub tags: BTreeMap<String, f64>,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            keyword: 3.0,
            events: 1.0,
            styles: 2.0,
            size: 2.0,
            patterns: 4.0,
            malicious: 40.0,
            feedback_boost: 5.0,
            feedback_penalty: 3.0,
            trusted: -1.0,
            tags: defaults::TAG_WEIGHTS
                .iter()
                .map(|(tag, w)| (tag.to_string(), *w))
                .collect(),
        }
    }
}

impl Weights {
    /// Weight of the given (lowercase) tag name.
    pub fn tag(&self, tag: &str) -> f64 {
        self.tags.get(tag).copied().unwrap_or(0.0)
    }

    /// Move a tag's weight one step up for `Ad` and one step down for `Ok`.
    ///
    /// The result stays within [`TAG_WEIGHT_FLOOR`]..=[`TAG_WEIGHT_CEILING`];
    /// a weight already below the floor is never pushed further down.
    pub fn nudge(&mut self, tag: &str, label: Label) {
        let current = self.tag(tag);
        let delta = match label {
            Label::Ad => TAG_WEIGHT_STEP,
            Label::Ok => -TAG_WEIGHT_STEP,
        };
        let floor = current.min(TAG_WEIGHT_FLOOR);
        let next = (current + delta).clamp(floor, TAG_WEIGHT_CEILING);
        self.tags.insert(tag.to_string(), next);
    }
}

/// Compiled, immutable rule set.
#[derive(Debug, Clone)]
pub struct RuleSet {
    block: RegexSet,
    malicious: RegexSet,
    trusted_domains: RegexSet,
    trusted_paths: RegexSet,
    keywords: Vec<String>,
    consent: Vec<String>,
    whitelist: Vec<String>,
    navigation: Vec<String>,
    weights: Weights,
    threshold: f64,
}

impl RuleSet {
    /// Build the rule set from the built-in tables.
    pub fn defaults() -> Result<Self> {
        RuleSetBuilder::new().build()
    }

    pub fn builder() -> RuleSetBuilder {
        RuleSetBuilder::new()
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of compiled block patterns (built-in plus supplementary).
    pub fn block_pattern_count(&self) -> usize {
        self.block.len()
    }

    pub fn matches_block(&self, haystack: &str) -> bool {
        self.block.is_match(haystack)
    }

    pub fn matches_malicious(&self, code: &str) -> bool {
        !code.is_empty() && self.malicious.is_match(code)
    }

    pub fn is_trusted_host(&self, host: &str) -> bool {
        self.trusted_domains.is_match(&host.to_ascii_lowercase())
    }

    pub fn is_trusted_path(&self, path: &str) -> bool {
        self.trusted_paths.is_match(path)
    }

    /// `text` is expected to be lowercase already.
    pub fn has_keyword(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }

    /// `text` is expected to be lowercase already.
    pub fn has_consent_vocabulary(&self, text: &str) -> bool {
        self.consent.iter().any(|k| text.contains(k.as_str()))
    }

    /// `class` is expected to be lowercase already.
    pub fn is_whitelisted_class(&self, class: &str) -> bool {
        !class.is_empty() && self.whitelist.iter().any(|t| class.contains(t.as_str()))
    }

    /// `class` is expected to be lowercase already.
    pub fn is_navigation_class(&self, class: &str) -> bool {
        !class.is_empty() && self.navigation.iter().any(|t| class.contains(t.as_str()))
    }
}

/// Fluent builder for [`RuleSet`].
///
/// Starts from the tables in [`defaults`]; every `extra_*` call appends to
/// them rather than replacing them.
///
/// ```
/// use arx_sentinel::RuleSetBuilder;
///
/// let rules = RuleSetBuilder::new()
///     .block_pattern(r"annoying-network\.example")
///     .trusted_domain(r"(?:^|\.)my-reader\.example$")
///     .threshold(6.0)
///     .build()
///     .unwrap();
/// assert!(rules.matches_block("https://annoying-network.example/x.js"));
/// assert!(rules.is_trusted_host("img.my-reader.example"));
/// ```
#[derive(Debug, Clone)]
pub struct RuleSetBuilder {
    block: Vec<String>,
    malicious: Vec<String>,
    trusted_domains: Vec<String>,
    trusted_paths: Vec<String>,
    keywords: Vec<String>,
    consent: Vec<String>,
    whitelist: Vec<String>,
    navigation: Vec<String>,
    weights: Weights,
    threshold: f64,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl RuleSetBuilder {
    /// Create a builder seeded with the built-in tables, default weights and
    /// a threshold of 5.
    pub fn new() -> Self {
        Self {
            block: owned(defaults::BLOCK_PATTERNS),
            malicious: owned(defaults::MALICIOUS_PATTERNS),
            trusted_domains: owned(defaults::TRUSTED_DOMAINS),
            trusted_paths: owned(defaults::TRUSTED_PATHS),
            keywords: owned(defaults::KEYWORDS),
            consent: owned(defaults::CONSENT_VOCABULARY),
            whitelist: owned(defaults::WHITELIST),
            navigation: owned(defaults::NAVIGATION),
            weights: Weights::default(),
            threshold: defaults::THRESHOLD,
        }
    }

    pub fn block_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.block.push(pattern.into());
        self
    }

    /// Append externally sourced block patterns (see [`blocklist`]).
    pub fn supplementary_patterns<I, P>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.block.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn malicious_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.malicious.push(pattern.into());
        self
    }

    pub fn trusted_domain(mut self, pattern: impl Into<String>) -> Self {
        self.trusted_domains.push(pattern.into());
        self
    }

    pub fn trusted_path(mut self, pattern: impl Into<String>) -> Self {
        self.trusted_paths.push(pattern.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into().to_lowercase());
        self
    }

    pub fn whitelist_token(mut self, token: impl Into<String>) -> Self {
        self.whitelist.push(token.into().to_lowercase());
        self
    }

    pub fn navigation_token(mut self, token: impl Into<String>) -> Self {
        self.navigation.push(token.into().to_lowercase());
        self
    }

    pub fn weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Compile every pattern. Fails with [`SentinelError::Config`] on the
    /// first invalid regex.
    pub fn build(self) -> Result<RuleSet> {
        Ok(RuleSet {
            block: compile("block", &self.block)?,
            malicious: compile("malicious", &self.malicious)?,
            trusted_domains: compile("trusted domain", &self.trusted_domains)?,
            trusted_paths: compile("trusted path", &self.trusted_paths)?,
            keywords: self.keywords,
            consent: self.consent,
            whitelist: self.whitelist,
            navigation: self.navigation,
            weights: self.weights,
            threshold: self.threshold,
        })
    }
}

impl Default for RuleSetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(kind: &str, patterns: &[String]) -> Result<RegexSet> {
    RegexSetBuilder::new(patterns)
        .case_insensitive(true)
        .build()
        .map_err(|e| SentinelError::Config(format!("invalid {kind} pattern: {e}")))
}
