//! Cookie/consent banner auto-acceptance.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use regex::{Regex, RegexBuilder};

use crate::dom::Document;
use crate::error::{Result, SentinelError};

/// Marker set on affordances that were already activated.
pub const CONSENT_ATTR: &str = "data-arx-consent";

/// Substrings of `class`, `id`, `aria-label`, `name` or `data-testid` that
/// mark a consent control.
pub const ATTRIBUTE_VOCABULARY: &[&str] = &[
    "cookie", "consent", "gdpr", "lgpd", "privacy", "onetrust", "cmp", "accept", "agree",
];

/// Attributes searched for [`ATTRIBUTE_VOCABULARY`].
const SEARCHED_ATTRS: &[&str] = &["class", "id", "aria-label", "name", "data-testid"];

const ACCEPT_VERBS: &str = r"\b(?:accept(?:\s+all)?(?:\s+cookies)?|agree|allow\s+all|i\s+understand|got\s+it|aceitar(?:\s+todos|\s+tudo)?|aceito|concordo|entendi|permitir\s+todos|aceptar(?:\s+todo)?|acepto|estoy\s+de\s+acuerdo|alle\s+akzeptieren|akzeptieren|zustimmen|einverstanden|tout\s+accepter|accepter|j'accepte|accetta(?:\s+tutto)?|accetto)\b";

const REFUSAL_VERBS: &str = r"\b(?:reject|decline|deny|refuse|settings|manage|preferences|customi[sz]e|options|rejeitar|recusar|configurar|gerenciar|personalizar|rechazar|ablehnen|einstellungen|refuser|paramètres|rifiuta)\b";

/// Visible text longer than this is not treated as a button label.
const MAX_LABEL_CHARS: usize = 40;

/// Finds and activates consent affordances.
#[derive(Debug, Clone)]
pub struct ConsentAcceptor {
    accept: Regex,
    refuse: Regex,
    jitter_ms: RangeInclusive<u64>,
}

impl ConsentAcceptor {
    pub fn new() -> Result<Self> {
        let compile = |source: &str| {
            RegexBuilder::new(source)
                .case_insensitive(true)
                .build()
                .map_err(|e| SentinelError::Config(format!("consent vocabulary: {e}")))
        };
        Ok(Self {
            accept: compile(ACCEPT_VERBS)?,
            refuse: compile(REFUSAL_VERBS)?,
            jitter_ms: 30..=150,
        })
    }

    /// Randomized delay before each activation.
    pub fn with_jitter(mut self, min: Duration, max: Duration) -> Self {
        let (min, max) = (min.as_millis() as u64, max.as_millis() as u64);
        self.jitter_ms = min.min(max)..=max.max(min);
        self
    }

    /// Interactive elements that look like a consent affordance, in document
    /// order. Hidden and already-activated elements are skipped.
    pub fn candidates<D: Document>(&self, doc: &D) -> Vec<D::Node> {
        doc.elements(&["button", "input", "a", "div", "span"])
            .into_iter()
            .filter(|&node| !doc.is_hidden(node) && doc.attr(node, CONSENT_ATTR).is_none())
            .filter(|&node| is_interactive(doc, node))
            .filter(|&node| self.is_consent_affordance(doc, node))
            .collect()
    }

    fn is_consent_affordance<D: Document>(&self, doc: &D, node: D::Node) -> bool {
        let label = label(doc, node);
        let aria = doc.attr(node, "aria-label").unwrap_or_default();
        if self.refuse.is_match(&label) || self.refuse.is_match(&aria) {
            return false;
        }

        let short_label = label.chars().count() <= MAX_LABEL_CHARS;
        if short_label && self.accept.is_match(&label) {
            return true;
        }

        SEARCHED_ATTRS.iter().any(|name| {
            doc.attr(node, name).is_some_and(|value| {
                let value = value.to_lowercase();
                ATTRIBUTE_VOCABULARY.iter().any(|v| value.contains(v))
            })
        })
    }

    /// Activate every consent affordance, each after a small random delay.
    ///
    /// Returns `true` if anything was activated. Calling again on a page with
    /// no remaining affordance is a no-op returning `false`.
    pub async fn accept<D: Document>(&self, doc: &mut D) -> bool {
        let candidates = self.candidates(doc);
        if candidates.is_empty() {
            return false;
        }

        let mut activated = 0usize;
        for node in candidates {
            let delay = self.jitter();
            tokio::time::sleep(delay).await;

            let result = doc
                .activate(node)
                .and_then(|()| doc.set_attr(node, CONSENT_ATTR, "clicked"));
            match result {
                Ok(()) => activated += 1,
                Err(e) => tracing::warn!("Failed to activate consent affordance: {e}"),
            }
        }

        if activated > 0 {
            tracing::info!(activated, "Activated consent affordances");
        }
        activated > 0
    }

    fn jitter(&self) -> Duration {
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(self.jitter_ms.clone()))
    }
}

fn is_interactive<D: Document>(doc: &D, node: D::Node) -> bool {
    match doc.tag_name(node).as_deref() {
        Some("button") => true,
        Some("input") => doc
            .attr(node, "type")
            .is_some_and(|t| matches!(t.to_ascii_lowercase().as_str(), "button" | "submit")),
        Some("a") => match doc.attr(node, "href") {
            None => true,
            Some(href) => {
                let href = href.trim().to_ascii_lowercase();
                href.is_empty() || href.starts_with('#') || href.starts_with("javascript:")
            }
        },
        Some("div" | "span") => doc.attr(node, "role").as_deref() == Some("button"),
        _ => false,
    }
}

/// Visible label: text content, or the `value` of an input.
fn label<D: Document>(doc: &D, node: D::Node) -> String {
    let text = if doc.tag_name(node).as_deref() == Some("input") {
        doc.attr(node, "value").unwrap_or_default()
    } else {
        doc.text(node)
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
