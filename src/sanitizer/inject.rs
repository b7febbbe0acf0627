//! Injection of the in-page engine script.

use ego_tree::NodeId;
use url::Url;

use super::Sanitizer;
use crate::dom::{Document, ParsedDocument};

/// Attribute identifying the injected engine tag.
pub const ENGINE_ATTR: &str = "data-arx-engine";

/// Sanitizer that inserts the in-page engine `<script>` tag.
///
/// The document is parsed and the tag is appended to the real `<head>`
/// element, so `</head>` sequences inside comments or script literals are
/// never mistaken for the insertion point. A document that already holds an
/// engine `<script>` element pointing at the same URL is returned
/// unchanged.
///
/// # Example
///
/// ```
/// use arx_sentinel::{Sanitizer, ScriptInjector};
/// use url::Url;
///
/// let s = ScriptInjector::new("/arx.js");
/// let page = Url::parse("https://example.com/").unwrap();
/// assert_eq!(
///     s.sanitize("<head></head>", &page),
///     r#"<html><head><script src="/arx.js" data-arx-engine></script></head><body></body></html>"#
/// );
/// ```
pub struct ScriptInjector {
    src: String,
    tag: String,
}

impl ScriptInjector {
    /// Create an injector for the engine served at `script_url`.
    pub fn new(script_url: &str) -> Self {
        let escaped = script_url.replace('&', "&amp;").replace('"', "&quot;");
        Self {
            src: script_url.to_string(),
            tag: format!(r#"<script src="{escaped}" {ENGINE_ATTR}></script>"#),
        }
    }

    fn is_engine(&self, doc: &ParsedDocument, node: NodeId) -> bool {
        doc.attr(node, ENGINE_ATTR).is_some()
            && doc.attr(node, "src").as_deref() == Some(self.src.as_str())
    }
}

impl Sanitizer for ScriptInjector {
    fn sanitize(&self, html: &str, page: &Url) -> String {
        let mut doc = ParsedDocument::parse(html, Some(page.clone()));
        if doc
            .elements(&["script"])
            .into_iter()
            .any(|node| self.is_engine(&doc, node))
        {
            return html.to_string();
        }

        let anchor = ["head", "body"]
            .iter()
            .find_map(|&tag| doc.elements(&[tag]).first().copied());
        let injected = anchor.is_some_and(|node| doc.append_markup(node, &self.tag).is_ok());

        let mut out = doc.to_html();
        if !injected {
            tracing::warn!(url = %page, "No head or body to inject the engine into");
            out.push_str(&self.tag);
        }
        out
    }
}
