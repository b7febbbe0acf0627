//! Link and resource rewriting.
//!
//! Every `a[href]`, `img[src]` and `script[src]` reference is resolved
//! against the page URL and then either kept, routed back through the
//! gateway, made absolute, or neutralized. Trust is evaluated before block
//! patterns, so a navigational link to a trusted destination is never
//! neutralized because it happens to contain tracking-like words.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::dom::{BLOCKED_ATTR, Document};
use crate::route::GatewayRoute;
use crate::trust::{self, TrustResolver};

/// Element/attribute pairs the rewriter considers.
pub const REFERENCES: &[(&str, &str)] = &[("a", "href"), ("img", "src"), ("script", "src")];

/// No-op navigation target for neutralized anchors.
pub const VOID_HREF: &str = "javascript:void(0)";
/// Replacement source for neutralized images and scripts.
pub const BLANK_SRC: &str = "about:blank";

/// What to do with untrusted references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteMode {
    /// Neutralize every untrusted reference.
    #[default]
    Strict,
    /// Keep browsing inside the gateway: untrusted anchors that do not match a
    /// block pattern are routed, other untrusted resources are made absolute.
    Continuity,
}

/// Decision for a single reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    Keep,
    Route(String),
    Absolute(String),
    Neutralize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub routed: usize,
    pub absolutized: usize,
    pub neutralized: usize,
    pub kept: usize,
    pub failed: usize,
}

/// Rewrites references so that navigation stays inside the filtering
/// boundary.
#[derive(Debug, Clone, Copy)]
pub struct Rewriter<'a> {
    trust: TrustResolver<'a>,
    route: &'a GatewayRoute,
    mode: RewriteMode,
}

impl<'a> Rewriter<'a> {
    pub fn new(trust: TrustResolver<'a>, route: &'a GatewayRoute) -> Self {
        Self {
            trust,
            route,
            mode: RewriteMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: RewriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> RewriteMode {
        self.mode
    }

    /// Decide what happens to reference `raw` on a `tag` element with the
    /// given (lowercase) class.
    pub fn decide(&self, tag: &str, class: &str, raw: &str, base: Option<&Url>) -> Rewrite {
        let rules = self.trust.rules();
        let trimmed = raw.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') || trust::is_data_image(trimmed) {
            return Rewrite::Keep;
        }

        if trimmed
            .get(..11)
            .is_some_and(|p| p.eq_ignore_ascii_case("javascript:"))
        {
            return if rules.matches_malicious(trimmed) {
                Rewrite::Neutralize
            } else {
                Rewrite::Keep
            };
        }

        let Some(url) = trust::resolve(trimmed, base) else {
            tracing::debug!(reference = %trimmed, "Unresolvable reference");
            return Rewrite::Neutralize;
        };
        if !matches!(url.scheme(), "http" | "https") || self.route.is_routed(&url) {
            return Rewrite::Keep;
        }

        // Every trusted reference is routed, not only navigation anchors and
        // content media, so iframes and stylesheets also stay behind the gateway.
        if self.trust.is_trusted_destination(&url) {
            return Rewrite::Route(self.route.route(&url));
        }

        match self.mode {
            RewriteMode::Strict => Rewrite::Neutralize,
            RewriteMode::Continuity => {
                if tag == "a" && rules.is_navigation_class(class) {
                    Rewrite::Route(self.route.route(&url))
                } else if rules.matches_block(url.as_str()) {
                    Rewrite::Neutralize
                } else if tag == "a" {
                    Rewrite::Route(self.route.route(&url))
                } else {
                    Rewrite::Absolute(url.to_string())
                }
            }
        }
    }

    /// Apply [`decide`](Self::decide) to every reference in `doc`.
    pub fn rewrite<D: Document>(&self, doc: &mut D) -> RewriteReport {
        let mut report = RewriteReport::default();
        let base = doc.base_url().cloned();

        for &(tag, attr) in REFERENCES {
            for node in doc.elements(&[tag]) {
                let Some(raw) = doc.attr(node, attr) else {
                    continue;
                };
                let class = doc.class_name(node);

                let applied = match self.decide(tag, &class, &raw, base.as_ref()) {
                    Rewrite::Keep => {
                        report.kept += 1;
                        Ok(())
                    }
                    Rewrite::Route(value) => {
                        report.routed += 1;
                        doc.set_attr(node, attr, &value)
                    }
                    Rewrite::Absolute(value) if value == raw => {
                        report.kept += 1;
                        Ok(())
                    }
                    Rewrite::Absolute(value) => {
                        report.absolutized += 1;
                        doc.set_attr(node, attr, &value)
                    }
                    Rewrite::Neutralize => {
                        tracing::debug!(tag, reference = %raw, "Neutralized reference");
                        report.neutralized += 1;
                        let target = if tag == "a" { VOID_HREF } else { BLANK_SRC };
                        doc.set_attr(node, attr, target)
                            .and_then(|()| doc.set_attr(node, BLOCKED_ATTR, "true"))
                    }
                };

                if let Err(e) = applied {
                    tracing::warn!(tag, "Failed to rewrite reference: {e}");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            routed = report.routed,
            neutralized = report.neutralized,
            absolutized = report.absolutized,
            "Rewrite pass complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ParsedDocument;
    use crate::rules::RuleSet;

    fn route() -> GatewayRoute {
        GatewayRoute::new("https://gw.example/proxy").unwrap()
    }

    fn page() -> Url {
        Url::parse("https://reader.example/title/42").unwrap()
    }

    fn decide(mode: RewriteMode, tag: &str, class: &str, raw: &str) -> Rewrite {
        let rules = RuleSet::defaults().unwrap();
        let route = route();
        let trust = TrustResolver::new(&rules).with_route(&route);
        Rewriter::new(trust, &route)
            .with_mode(mode)
            .decide(tag, class, raw, Some(&page()))
    }

    #[test]
    fn navigation_anchor_to_trusted_path_is_routed() {
        let decision = decide(RewriteMode::Strict, "a", "next-chapter", "/chapter/12");
        assert_eq!(
            decision,
            Rewrite::Route(
                "https://gw.example/proxy?url=https%3A%2F%2Freader.example%2Fchapter%2F12".to_string()
            )
        );
    }

    #[test]
    fn trust_precedes_block_patterns() {
        // "tracking" matches a block pattern, the path is trusted.
        let decision = decide(RewriteMode::Strict, "a", "nav", "/chapter/12?ref=tracking");
        assert!(matches!(decision, Rewrite::Route(_)));
    }

    #[test]
    fn strict_mode_neutralizes_untrusted() {
        assert_eq!(
            decide(RewriteMode::Strict, "a", "", "https://ads.example/click"),
            Rewrite::Neutralize
        );
        assert_eq!(
            decide(RewriteMode::Strict, "img", "", "https://images.example/banner.png"),
            Rewrite::Neutralize
        );
    }

    #[test]
    fn continuity_mode_keeps_browsing_inside_gateway() {
        assert!(matches!(
            decide(RewriteMode::Continuity, "a", "", "https://blog.example/post"),
            Rewrite::Route(_)
        ));
        assert_eq!(
            decide(RewriteMode::Continuity, "a", "", "https://x.doubleclick.net/click"),
            Rewrite::Neutralize
        );
        assert_eq!(
            decide(RewriteMode::Continuity, "img", "", "/static/logo.png"),
            Rewrite::Absolute("https://reader.example/static/logo.png".to_string())
        );
    }

    #[test]
    fn inert_references_are_kept() {
        for raw in ["", "#top", "data:image/png;base64,AAAA", "mailto:a@b.example", "javascript:void(0)"] {
            assert_eq!(decide(RewriteMode::Strict, "a", "", raw), Rewrite::Keep, "{raw}");
        }
        assert_eq!(
            decide(RewriteMode::Strict, "a", "", "javascript:window.open('https://x.example')"),
            Rewrite::Neutralize
        );
    }

    #[test]
    fn unresolvable_reference_is_neutralized() {
        assert_eq!(decide(RewriteMode::Strict, "a", "", "http://[::1"), Rewrite::Neutralize);
    }

    #[test]
    fn rewrite_is_stable_on_second_run() {
        let rules = RuleSet::defaults().unwrap();
        let route = route();
        let trust = TrustResolver::new(&rules).with_route(&route);
        let rewriter = Rewriter::new(trust, &route);

        let mut doc = ParsedDocument::parse_fragment(
            r#"<a class="next" href="/chapter/2">Next</a>
               <a href="https://ads.example/click">Win</a>
               <img src="https://cdn.example.net/p1.jpg">
               <script src="https://ads.doubleclick.net/x.js"></script>"#,
            Some(page()),
        );
        let first = rewriter.rewrite(&mut doc);
        assert_eq!(first.routed, 2);
        assert_eq!(first.neutralized, 2);

        let anchors = doc.elements(&["a"]);
        assert_eq!(doc.attr(anchors[1], "href").as_deref(), Some(VOID_HREF));
        assert_eq!(doc.attr(anchors[1], BLOCKED_ATTR).as_deref(), Some("true"));
        let script = doc.elements(&["script"])[0];
        assert_eq!(doc.attr(script, "src").as_deref(), Some(BLANK_SRC));

        let html = doc.to_html();
        let second = rewriter.rewrite(&mut doc);
        assert_eq!(second.routed + second.neutralized + second.absolutized, 0);
        assert_eq!(doc.to_html(), html);
    }
}
