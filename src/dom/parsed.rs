//! Server-side [`Document`] backed by a `scraper` parse tree.
//!
//! The parse tree itself is never mutated: attribute changes and appended
//! markup are kept in overlays keyed by [`NodeId`] and applied when the tree
//! is serialized back to HTML.

use std::collections::{BTreeMap, HashMap};

use ego_tree::{NodeId, NodeRef};
use scraper::{ElementRef, Html, node::Node};
use url::Url;

use super::{Document, Geometry, Layout};
use crate::error::{Result, SentinelError};

/// HTML5 void elements that must not have a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text children are serialized without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

/// Elements that never produce a rendered box.
const NON_RENDERED: &[&str] = &[
    "script", "style", "noscript", "template", "head", "meta", "link", "title",
];

/// A parsed HTML document with an attribute overlay.
pub struct ParsedDocument {
    html: Html,
    fragment: bool,
    base: Option<Url>,
    overrides: HashMap<NodeId, BTreeMap<String, String>>,
    appended: HashMap<NodeId, String>,
    activated: Vec<NodeId>,
    exposed: HashMap<NodeId, Geometry>,
}

impl ParsedDocument {
    /// Parse a complete HTML document fetched from `base`.
    pub fn parse(html: &str, base: Option<Url>) -> Self {
        Self::from_html(Html::parse_document(html), false, base)
    }

    /// Parse an HTML fragment; serialization omits the implied `<html>` wrapper.
    pub fn parse_fragment(html: &str, base: Option<Url>) -> Self {
        Self::from_html(Html::parse_fragment(html), true, base)
    }

    fn from_html(html: Html, fragment: bool, base: Option<Url>) -> Self {
        Self {
            html,
            fragment,
            base,
            overrides: HashMap::new(),
            appended: HashMap::new(),
            activated: Vec::new(),
            exposed: HashMap::new(),
        }
    }

    /// Serialize the tree with every attribute change applied.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        if self.fragment {
            for child in self.html.root_element().children() {
                self.serialize_node(child, false, &mut out);
            }
        } else {
            self.serialize_node(self.html.tree.root(), false, &mut out);
        }
        out
    }

    /// Emit `markup` verbatim as the last child of `node` when serializing.
    pub fn append_markup(&mut self, node: NodeId, markup: &str) -> Result<()> {
        if self.element(node).is_none() {
            return Err(SentinelError::Document(format!("no element {node:?}")));
        }
        self.appended.entry(node).or_default().push_str(markup);
        Ok(())
    }

    /// Nodes activated through [`Document::activate`], in order.
    pub fn activated(&self) -> &[NodeId] {
        &self.activated
    }

    /// Geometry last exposed for `node`, if any.
    pub fn exposed_geometry(&self, node: NodeId) -> Option<Geometry> {
        self.exposed.get(&node).copied()
    }

    /// First element matching `tag` whose `name` attribute equals `value`.
    pub fn find_by_attr(&self, tag: &str, name: &str, value: &str) -> Option<NodeId> {
        self.elements(&[tag])
            .into_iter()
            .find(|&id| self.attr(id, name).as_deref() == Some(value))
    }

    fn element(&self, node: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(node).and_then(ElementRef::wrap)
    }

    /// Source attributes with the overlay applied, sorted by name so that
    /// serialization is stable across re-parses.
    fn effective_attrs(&self, el: ElementRef<'_>) -> BTreeMap<String, String> {
        let mut attrs: BTreeMap<String, String> = el
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Some(overlay) = self.overrides.get(&el.id()) {
            attrs.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        attrs
    }

    fn write_start_tag(&self, el: ElementRef<'_>, out: &mut String) {
        out.push('<');
        out.push_str(el.value().name());
        for (k, v) in self.effective_attrs(el) {
            out.push(' ');
            out.push_str(&k);
            out.push_str("=\"");
            push_escaped(out, &v, true);
            out.push('"');
        }
        out.push('>');
    }

    fn serialize_node(&self, node: NodeRef<'_, Node>, raw_text: bool, out: &mut String) {
        match node.value() {
            Node::Document | Node::Fragment => {
                for child in node.children() {
                    self.serialize_node(child, false, out);
                }
            }
            Node::Doctype(doctype) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(doctype.name());
                out.push('>');
            }
            Node::Element(el) => {
                let Some(element) = ElementRef::wrap(node) else {
                    return;
                };
                let tag = el.name();
                self.write_start_tag(element, out);

                if VOID_ELEMENTS.contains(&tag) {
                    return;
                }

                let raw = RAW_TEXT_ELEMENTS.contains(&tag);
                for child in node.children() {
                    self.serialize_node(child, raw, out);
                }
                if let Some(markup) = self.appended.get(&node.id()) {
                    out.push_str(markup);
                }

                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            Node::Text(text) => {
                if raw_text {
                    out.push_str(text.as_ref());
                } else {
                    push_escaped(out, text.as_ref(), false);
                }
            }
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment.as_ref());
                out.push_str("-->");
            }
            _ => {}
        }
    }
}

fn push_escaped(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

/// `name: value` pairs of an inline style attribute, names lowercased.
fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_ascii_lowercase()))
        .collect()
}

fn parse_px(value: &str) -> Option<f64> {
    let value = value.trim().trim_end_matches("!important").trim();
    let value = value.strip_suffix("px").unwrap_or(value);
    value.trim().parse().ok()
}

impl Document for ParsedDocument {
    type Node = NodeId;

    fn base_url(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    fn elements(&self, tags: &[&str]) -> Vec<NodeId> {
        self.html
            .tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| tags.is_empty() || tags.contains(&el.value().name()))
            .map(|el| el.id())
            .collect()
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.element(node).map(|el| el.value().name().to_string())
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(&node).and_then(|o| o.get(name)) {
            return Some(value.clone());
        }
        self.element(node)
            .and_then(|el| el.value().attr(name).map(str::to_string))
    }

    fn attr_names(&self, node: NodeId) -> Vec<String> {
        self.element(node)
            .map(|el| self.effective_attrs(el).into_keys().collect())
            .unwrap_or_default()
    }

    fn set_attr(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
        if self.element(node).is_none() {
            return Err(SentinelError::Document(format!("no element {node:?}")));
        }
        self.overrides
            .entry(node)
            .or_default()
            .insert(name.to_ascii_lowercase(), value.to_string());
        Ok(())
    }

    fn text(&self, node: NodeId) -> String {
        self.element(node)
            .map(|el| el.text().collect())
            .unwrap_or_default()
    }

    fn start_tag(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let Some(el) = self.element(node) {
            self.write_start_tag(el, &mut out);
        }
        out
    }

    fn layout(&self, node: NodeId) -> Option<Layout> {
        let el = self.element(node)?;
        let style = parse_style(&self.attr(node, "style").unwrap_or_default());
        let declared = |name: &str| {
            style
                .iter()
                .rev()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        let not_rendered = NON_RENDERED.contains(&el.value().name())
            || declared("display").is_some_and(|d| d.starts_with("none"));

        let (width, height) = if not_rendered {
            (Some(0.0), Some(0.0))
        } else {
            let dimension = |name: &str| {
                declared(name)
                    .and_then(parse_px)
                    .or_else(|| self.attr(node, name).as_deref().and_then(parse_px))
            };
            (dimension("width"), dimension("height"))
        };

        Some(Layout {
            position: declared("position").map(|p| p.trim_end_matches("!important").trim().to_string()),
            z_index: declared("z-index").and_then(|z| z.trim_end_matches("!important").trim().parse().ok()),
            width,
            height,
        })
    }

    fn activate(&mut self, node: NodeId) -> Result<()> {
        if self.element(node).is_none() {
            return Err(SentinelError::Document(format!("no element {node:?}")));
        }
        self.activated.push(node);
        Ok(())
    }

    fn expose_geometry(&mut self, node: NodeId, geometry: Geometry) -> Result<()> {
        if self.element(node).is_none() {
            return Err(SentinelError::Document(format!("no element {node:?}")));
        }
        self.exposed.insert(node, geometry);
        Ok(())
    }
}
