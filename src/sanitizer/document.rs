//! The gateway pass over a whole fetched document.

use std::sync::Arc;

use url::Url;

use super::Sanitizer;
use crate::classifier::{Classifier, ScoreCache};
use crate::dom::ParsedDocument;
use crate::passes::{self, RewriteMode, Rewriter};
use crate::route::GatewayRoute;
use crate::rules::RuleSet;
use crate::trust::TrustResolver;

/// Parses the document, runs the sanitization pass followed by the rewrite
/// pass, and serializes the result.
///
/// Scores are memoized for the duration of a single call only.
pub struct DocumentSanitizer {
    rules: Arc<RuleSet>,
    route: GatewayRoute,
    mode: RewriteMode,
}

impl DocumentSanitizer {
    pub fn new(rules: Arc<RuleSet>, route: GatewayRoute, mode: RewriteMode) -> Self {
        Self { rules, route, mode }
    }
}

impl Sanitizer for DocumentSanitizer {
    fn sanitize(&self, html: &str, page: &Url) -> String {
        let mut doc = ParsedDocument::parse(html, Some(page.clone()));
        let trust = TrustResolver::new(&self.rules).with_route(&self.route);

        let swept = passes::sweep(&mut doc, &Classifier::new(trust), &mut ScoreCache::new());
        let rewritten = Rewriter::new(trust, &self.route)
            .with_mode(self.mode)
            .rewrite(&mut doc);

        tracing::info!(
            url = %page,
            hidden = swept.hidden,
            routed = rewritten.routed,
            neutralized = rewritten.neutralized,
            "Sanitized document"
        );
        doc.to_html()
    }
}
