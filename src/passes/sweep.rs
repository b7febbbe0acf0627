//! Sanitization pass: hide candidate elements scoring at or above the
//! threshold and promote lazily loaded image sources.

use crate::classifier::{Classifier, ScoreCache};
use crate::dom::{Document, ElementDescriptor, HIDDEN_ATTR};
use crate::error::Result;

/// Tags eligible for scoring. Generic containers other than `div` and all
/// images are never scored.
pub const CANDIDATE_TAGS: &[&str] = &["iframe", "script", "aside", "section", "div"];

/// Deferred-source attributes, in priority order.
pub const LAZY_SOURCE_ATTRS: &[&str] = &["data-src", "data-lazy-src", "data-original"];

/// Attribute preserving a neutralized script's original `type`.
pub const ORIGINAL_TYPE_ATTR: &str = "data-arx-type";

const HIDE_STYLE: &str = "display:none !important";

/// Outcome of one sanitization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Elements hidden by this pass.
    pub hidden: usize,
    /// Candidates already hidden by an earlier pass.
    pub already_hidden: usize,
    pub scanned: usize,
    /// Images whose deferred source was promoted.
    pub promoted: usize,
    /// Elements skipped because a document operation failed.
    pub failed: usize,
}

/// Run the sanitization pass over `doc`.
///
/// Idempotent: already-hidden elements are counted but never hidden twice.
/// A failure on one element is logged and the pass moves on.
pub fn sweep<D: Document>(doc: &mut D, classifier: &Classifier<'_>, cache: &mut ScoreCache) -> SweepReport {
    let mut report = SweepReport::default();
    let threshold = classifier.threshold();

    for node in doc.elements(CANDIDATE_TAGS) {
        if doc.is_hidden(node) {
            report.already_hidden += 1;
            continue;
        }
        if classifier.rules().is_whitelisted_class(&doc.class_name(node)) {
            continue;
        }
        let Some(desc) = ElementDescriptor::capture(doc, node) else {
            continue;
        };
        report.scanned += 1;

        let score = classifier.score_cached(&desc, cache);
        if score < threshold {
            continue;
        }

        match hide(doc, node, &desc.tag) {
            Ok(()) => {
                tracing::debug!(tag = %desc.tag, class = %desc.class, score, "Hid element");
                report.hidden += 1;
            }
            Err(e) => {
                tracing::warn!(tag = %desc.tag, "Failed to hide element: {e}");
                report.failed += 1;
            }
        }
    }

    for node in doc.elements(&["img"]) {
        match promote_lazy_source(doc, node) {
            Ok(true) => report.promoted += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Failed to promote lazy source: {e}");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        hidden = report.hidden,
        already_hidden = report.already_hidden,
        scanned = report.scanned,
        promoted = report.promoted,
        "Sanitization pass complete"
    );
    report
}

fn hide<D: Document>(doc: &mut D, node: D::Node, tag: &str) -> Result<()> {
    let style = match doc.attr(node, "style") {
        Some(existing) if !existing.trim().is_empty() => {
            format!("{};{HIDE_STYLE}", existing.trim().trim_end_matches(';'))
        }
        _ => HIDE_STYLE.to_string(),
    };
    doc.set_attr(node, "style", &style)?;

    if tag == "script" {
        // Hiding does not stop execution.
        let original = doc.attr(node, "type").unwrap_or_default();
        doc.set_attr(node, ORIGINAL_TYPE_ATTR, &original)?;
        doc.set_attr(node, "type", "text/plain")?;
    }

    doc.set_attr(node, HIDDEN_ATTR, "true")
}

fn promote_lazy_source<D: Document>(doc: &mut D, node: D::Node) -> Result<bool> {
    let Some(lazy) = LAZY_SOURCE_ATTRS
        .iter()
        .filter_map(|name| doc.attr(node, name))
        .find(|v| !v.trim().is_empty())
    else {
        return Ok(false);
    };

    if doc.attr(node, "src").as_deref() == Some(lazy.as_str()) {
        return Ok(false);
    }
    doc.set_attr(node, "src", &lazy)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ParsedDocument;
    use crate::rules::RuleSet;
    use crate::trust::TrustResolver;
    use url::Url;

    fn doc(html: &str) -> ParsedDocument {
        ParsedDocument::parse_fragment(html, Some(Url::parse("https://news.example/post/1").unwrap()))
    }

    fn run(doc: &mut ParsedDocument) -> SweepReport {
        let rules = RuleSet::defaults().unwrap();
        let classifier = Classifier::new(TrustResolver::new(&rules));
        sweep(doc, &classifier, &mut ScoreCache::new())
    }

    #[test]
    fn hides_ad_network_script() {
        let mut doc = doc(r#"<p>text</p><script src="https://ads.doubleclick.net/x.js"></script>"#);
        let report = run(&mut doc);
        assert_eq!(report.hidden, 1);

        let script = doc.elements(&["script"])[0];
        assert!(doc.is_hidden(script));
        assert_eq!(doc.attr(script, "type").as_deref(), Some("text/plain"));
        assert_eq!(doc.attr(script, ORIGINAL_TYPE_ATTR).as_deref(), Some(""));
        assert_eq!(doc.attr(script, "style").as_deref(), Some(HIDE_STYLE));
    }

    #[test]
    fn second_run_hides_nothing_new() {
        let mut doc = doc(
            r#"<aside class="ad" style="position:fixed">Publicidade</aside>
               <div class="sponsored" style="color:red;">Patrocinado</div>
               <div class="content">Story</div>"#,
        );
        let first = run(&mut doc);
        assert_eq!(first.hidden, 2);

        let second = run(&mut doc);
        assert_eq!(second.hidden, 0);
        assert_eq!(second.already_hidden, 2);

        let hidden: Vec<_> = doc.elements(&[]).into_iter().filter(|n| doc.is_hidden(*n)).collect();
        assert_eq!(hidden.len(), 2);

        let div = doc.find_by_attr("div", "class", "sponsored").unwrap();
        assert_eq!(doc.attr(div, "style").as_deref(), Some("color:red;display:none !important"));
    }

    #[test]
    fn consent_banner_is_never_hidden() {
        let mut doc = doc(
            r#"<div class="cookie-consent" style="position:fixed;z-index:9999" onclick="x()">Aceitar cookies</div>"#,
        );
        let report = run(&mut doc);
        assert_eq!(report.hidden, 0);
        assert!(!doc.is_hidden(doc.elements(&["div"])[0]));
    }

    #[test]
    fn images_are_not_scored_but_lazy_sources_are_promoted() {
        let mut doc = doc(
            r#"<img class="ad" data-src="/chapter/1/p1.jpg" src="placeholder.gif">
               <img data-lazy-src="/chapter/1/p2.jpg">
               <img src="/chapter/1/p3.jpg">"#,
        );
        let report = run(&mut doc);
        assert_eq!(report.hidden, 0);
        assert_eq!(report.promoted, 2);

        let imgs = doc.elements(&["img"]);
        assert_eq!(doc.attr(imgs[0], "src").as_deref(), Some("/chapter/1/p1.jpg"));
        assert_eq!(doc.attr(imgs[1], "src").as_deref(), Some("/chapter/1/p2.jpg"));

        assert_eq!(run(&mut doc).promoted, 0);
    }

    #[test]
    fn trusted_iframe_is_kept() {
        let mut doc = doc(
            r#"<iframe class="ad" style="position:fixed" src="https://www.webtoons.com/embed"></iframe>"#,
        );
        assert_eq!(run(&mut doc).hidden, 0);
    }

    #[test]
    fn whitelisted_containers_are_not_scanned() {
        let mut doc = doc(r#"<section class="reader">Publicidade</section>"#);
        let report = run(&mut doc);
        assert_eq!(report.scanned, 0);
        assert_eq!(report.hidden, 0);
    }
}
