//! Heuristic element scoring.

use std::collections::HashMap;

use crate::dom::{ElementDescriptor, Resource};
use crate::feedback::Label;
use crate::fingerprint::Fingerprint;
use crate::rules::{RuleSet, Weights};
use crate::trust::TrustResolver;

/// Read access to user feedback, keyed by text fingerprint.
pub trait FeedbackLookup {
    fn label_for(&self, fingerprint: Fingerprint) -> Option<Label>;
}

/// Scores memoized per element fingerprint for the duration of one pass.
#[derive(Debug, Default)]
pub struct ScoreCache {
    scores: HashMap<Fingerprint, f64>,
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Scores element descriptors against a rule set.
///
/// Scoring is total: anything the classifier cannot evaluate scores 0, so
/// failures lean towards keeping content visible.
#[derive(Clone, Copy)]
pub struct Classifier<'a> {
    rules: &'a RuleSet,
    weights: &'a Weights,
    trust: TrustResolver<'a>,
    feedback: Option<&'a dyn FeedbackLookup>,
}

impl<'a> Classifier<'a> {
    /// Classifier using the rule set's base weights and no feedback.
    pub fn new(trust: TrustResolver<'a>) -> Self {
        let rules = trust.rules();
        Self {
            rules,
            weights: rules.weights(),
            trust,
            feedback: None,
        }
    }

    /// Score with session weights instead of the base weights.
    pub fn with_weights(mut self, weights: &'a Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_feedback(mut self, feedback: &'a dyn FeedbackLookup) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn rules(&self) -> &'a RuleSet {
        self.rules
    }

    pub fn threshold(&self) -> f64 {
        self.rules.threshold()
    }

    /// Score `desc`, reusing a score already computed for its fingerprint.
    pub fn score_cached(&self, desc: &ElementDescriptor, cache: &mut ScoreCache) -> f64 {
        let key = desc.fingerprint();
        if let Some(score) = cache.scores.get(&key) {
            return *score;
        }
        let score = self.score(desc);
        cache.scores.insert(key, score);
        score
    }

    pub fn score(&self, desc: &ElementDescriptor) -> f64 {
        match &desc.resource {
            Resource::Malformed(raw) => {
                tracing::debug!(tag = %desc.tag, resource = %raw, "Unresolvable resource, not scoring");
                return 0.0;
            }
            Resource::DataImage => return self.weights.trusted,
            Resource::Resolved(url) if self.trust.is_trusted_destination(url) => {
                return self.weights.trusted;
            }
            _ => {}
        }

        if self.rules.has_consent_vocabulary(&desc.excerpt) {
            return 0.0;
        }
        if self.rules.is_whitelisted_class(&desc.class) {
            return 0.0;
        }
        if desc.tag == "a" && self.rules.is_navigation_class(&desc.class) {
            return 0.0;
        }

        let w = self.weights;
        let mut score = 0.0;

        if self.rules.has_keyword(&desc.excerpt) {
            score += w.keyword;
        }
        score += w.tag(&desc.tag);
        if desc.has_event_handler() {
            score += w.events;
        }
        if let Some(layout) = &desc.layout {
            if layout.is_floating() {
                score += w.styles;
            }
            if layout.is_undersized() {
                score += w.size;
            }
        }
        if self.rules.matches_block(&desc.pattern_haystack()) {
            score += w.patterns;
        }
        if self.rules.matches_malicious(&desc.code) {
            score += w.malicious;
        }

        if let Some(feedback) = self.feedback {
            match feedback.label_for(Fingerprint::of_text(&desc.excerpt)) {
                Some(Label::Ad) => score += w.feedback_boost,
                Some(Label::Ok) => score -= w.feedback_penalty,
                None => {}
            }
        }

        tracing::debug!(tag = %desc.tag, class = %desc.class, score, "Scored element");
        score
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::dom::{Document, ParsedDocument};
    use url::Url;

    struct FixedFeedback(HashMap<Fingerprint, Label>);

    impl FeedbackLookup for FixedFeedback {
        fn label_for(&self, fingerprint: Fingerprint) -> Option<Label> {
            self.0.get(&fingerprint).copied()
        }
    }

    fn describe(html: &str, tag: &str) -> ElementDescriptor {
        let base = Url::parse("https://news.example/article").unwrap();
        let doc = ParsedDocument::parse_fragment(html, Some(base));
        let node = doc.elements(&[tag])[0];
        ElementDescriptor::capture(&doc, node).unwrap()
    }

    fn score(html: &str, tag: &str) -> f64 {
        let rules = RuleSet::defaults().unwrap();
        Classifier::new(TrustResolver::new(&rules)).score(&describe(html, tag))
    }

    #[test]
    fn ad_network_script_crosses_threshold() {
        // patterns 4 + script 0.5 + unrendered box 2
        let s = score(r#"<script src="https://ads.doubleclick.net/x.js"></script>"#, "script");
        assert_eq!(s, 6.5);
        assert!(s >= 5.0);
    }

    #[test]
    fn trusted_resource_short_circuits() {
        let s = score(
            r#"<iframe src="https://cdn.example.net/ads/slot" onload="x()" style="position:fixed" class="ad"></iframe>"#,
            "iframe",
        );
        assert_eq!(s, -1.0);

        let s = score(r#"<script src="/chapter/12/pages.js">window.open(u)</script>"#, "script");
        assert_eq!(s, -1.0);
    }

    #[test]
    fn data_image_is_trusted() {
        let s = score(r#"<div data-href="data:image/png;base64,AAAA" class="ad">x</div>"#, "div");
        assert_eq!(s, -1.0);
    }

    #[test]
    fn consent_text_scores_zero() {
        let s = score(
            r#"<div class="cookie-consent" style="position:fixed;z-index:99999;height:60px" onclick="accept()">Aceitar cookies</div>"#,
            "div",
        );
        assert_eq!(s, 0.0);

        let s = score(
            r#"<aside class="ad banner-ad" style="position:fixed">We use cookies. Patrocinado</aside>"#,
            "aside",
        );
        assert_eq!(s, 0.0);
    }

    #[test]
    fn whitelisted_class_and_navigation_anchor_score_zero() {
        assert_eq!(score(r#"<section class="chapter-content ad">x</section>"#, "section"), 0.0);
        assert_eq!(
            score(r#"<a class="next-chapter" href="https://ads.example/track">Next</a>"#, "a"),
            0.0
        );
    }

    #[test]
    fn malformed_resource_scores_zero() {
        assert_eq!(score(r#"<iframe src="http://[::1" class="ad"></iframe>"#, "iframe"), 0.0);
    }

    #[test]
    fn signals_accumulate() {
        // keyword 3 + aside 2 + events 1 + styles 2 + size 2 + patterns 4
        let s = score(
            r#"<aside class="ad" onmouseover="t()" style="position:fixed;height:90px">Publicidade</aside>"#,
            "aside",
        );
        assert_eq!(s, 14.0);
    }

    #[test]
    fn malicious_code_is_disqualifying() {
        let s = score(r#"<div onclick="window.open('https://x.example')">Leia mais</div>"#, "div");
        // events 1 + malicious 40
        assert_eq!(s, 41.0);
    }

    #[test]
    fn plain_content_stays_below_threshold() {
        assert!(score(r#"<div class="header"><p>Leia o capítulo</p></div>"#, "div") < 5.0);
        assert!(score(r#"<section><h2>Comentários</h2></section>"#, "section") < 5.0);
    }

    #[test]
    fn feedback_adjusts_score() {
        let rules = RuleSet::defaults().unwrap();
        let desc = describe(r#"<div>Compre agora</div>"#, "div");

        let ad = FixedFeedback(HashMap::from([(Fingerprint::of_text("Compre agora"), Label::Ad)]));
        let ok = FixedFeedback(HashMap::from([(Fingerprint::of_text("Compre agora"), Label::Ok)]));

        let base = Classifier::new(TrustResolver::new(&rules)).score(&desc);
        let boosted = Classifier::new(TrustResolver::new(&rules))
            .with_feedback(&ad)
            .score(&desc);
        let lowered = Classifier::new(TrustResolver::new(&rules))
            .with_feedback(&ok)
            .score(&desc);

        assert_eq!(boosted, base + 5.0);
        assert_eq!(lowered, base - 3.0);
    }

    #[test]
    fn feedback_applies_when_excerpt_is_cut_at_a_word_break() {
        let rules = RuleSet::defaults().unwrap();
        let text = format!("{} tail words", "a".repeat(49));
        let desc = describe(&format!("<section>{text}</section>"), "section");
        let ad = FixedFeedback(HashMap::from([(Fingerprint::of_text(&text), Label::Ad)]));

        let base = Classifier::new(TrustResolver::new(&rules)).score(&desc);
        let boosted = Classifier::new(TrustResolver::new(&rules))
            .with_feedback(&ad)
            .score(&desc);
        assert_eq!(base, 2.0);
        assert_eq!(boosted, 7.0);
    }

    #[test]
    fn session_weights_override_base() {
        let rules = RuleSet::defaults().unwrap();
        let mut weights = rules.weights().clone();
        weights.nudge("section", Label::Ad);
        let desc = describe("<section>x</section>", "section");
        let s = Classifier::new(TrustResolver::new(&rules))
            .with_weights(&weights)
            .score(&desc);
        assert_eq!(s, 2.5);
    }

    #[test]
    fn cache_memoizes_by_fingerprint() {
        let rules = RuleSet::defaults().unwrap();
        let classifier = Classifier::new(TrustResolver::new(&rules));
        let mut cache = ScoreCache::new();
        let desc = describe(r#"<aside class="ad">x</aside>"#, "aside");

        let first = classifier.score_cached(&desc, &mut cache);
        let second = classifier.score_cached(&desc, &mut cache);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }
}
