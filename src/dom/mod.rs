//! Minimal capability interface over a document tree.
//!
//! Every pass depends only on the [`Document`] trait, so the same
//! classification and rewriting code runs against a server-side parsed tree
//! ([`ParsedDocument`]) in the gateway and against a live page in an in-page
//! session.

mod parsed;

pub use parsed::ParsedDocument;

use std::fmt;
use std::hash::Hash;

use url::Url;

use crate::error::Result;
use crate::fingerprint::{self, Fingerprint};
use crate::trust;

/// Marker attribute set on elements hidden by the sanitization pass.
pub const HIDDEN_ATTR: &str = "data-arx-hidden";
/// Marker attribute set on neutralized references.
pub const BLOCKED_ATTR: &str = "data-arx-blocked";

/// Subset of computed style and rendered box size.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    pub position: Option<String>,
    pub z_index: Option<i64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl Layout {
    /// Fixed positioning or a z-index above 100.
    pub fn is_floating(&self) -> bool {
        self.position.as_deref() == Some("fixed") || self.z_index.is_some_and(|z| z > 100)
    }

    /// Shorter than 120px or narrower than 300px. Unknown dimensions never
    /// count as undersized.
    pub fn is_undersized(&self) -> bool {
        self.height.is_some_and(|h| h < 120.0) || self.width.is_some_and(|w| w < 300.0)
    }
}

/// Externally observable geometry reported for a hidden element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub width: f64,
    pub height: f64,
    pub natural_width: f64,
    pub natural_height: f64,
    pub complete: bool,
}

impl Geometry {
    /// A medium-rectangle ad slot that finished loading.
    pub const PLAUSIBLE_SLOT: Geometry = Geometry {
        width: 300.0,
        height: 250.0,
        natural_width: 300.0,
        natural_height: 250.0,
        complete: true,
    };
}

/// Capabilities the engine needs from a document tree.
///
/// Tag and attribute names are lowercase. Methods taking a node return
/// empty values (or an error, for mutations) when the node is detached.
pub trait Document {
    type Node: Copy + Eq + Hash + fmt::Debug;

    /// URL the document was loaded from, used to resolve relative references.
    fn base_url(&self) -> Option<&Url>;

    /// Elements whose tag is in `tags`, in document order. An empty slice
    /// selects every element.
    fn elements(&self, tags: &[&str]) -> Vec<Self::Node>;

    fn tag_name(&self, node: Self::Node) -> Option<String>;

    fn attr(&self, node: Self::Node, name: &str) -> Option<String>;

    fn attr_names(&self, node: Self::Node) -> Vec<String>;

    fn set_attr(&mut self, node: Self::Node, name: &str, value: &str) -> Result<()>;

    /// Concatenated descendant text.
    fn text(&self, node: Self::Node) -> String;

    /// Serialized opening tag, including attributes.
    fn start_tag(&self, node: Self::Node) -> String;

    fn layout(&self, node: Self::Node) -> Option<Layout>;

    /// Trigger the element's default activation (a click).
    fn activate(&mut self, node: Self::Node) -> Result<()>;

    /// Report `geometry` to page scripts probing this element.
    fn expose_geometry(&mut self, node: Self::Node, geometry: Geometry) -> Result<()>;

    fn is_hidden(&self, node: Self::Node) -> bool {
        self.attr(node, HIDDEN_ATTR).is_some()
    }

    fn class_name(&self, node: Self::Node) -> String {
        self.attr(node, "class").unwrap_or_default().to_lowercase()
    }
}

/// Resource reference of an element after resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    None,
    DataImage,
    Resolved(Url),
    Malformed(String),
}

/// Everything the classifier looks at, captured fresh per scoring call.
#[derive(Debug, Clone)]
pub struct ElementDescriptor {
    pub tag: String,
    pub class: String,
    pub excerpt: String,
    pub markup: String,
    /// Inline script source, event-handler values and `javascript:` URLs.
    pub code: String,
    pub resource: Resource,
    pub attributes: Vec<String>,
    pub layout: Option<Layout>,
}

impl ElementDescriptor {
    /// Capture `node`, or `None` if it is no longer attached.
    pub fn capture<D: Document>(doc: &D, node: D::Node) -> Option<Self> {
        let tag = doc.tag_name(node)?;
        let class = doc.class_name(node);
        let attributes = doc.attr_names(node);
        let text = doc.text(node);

        let raw = ["src", "href", "data-href"]
            .iter()
            .find_map(|name| doc.attr(node, name))
            .filter(|v| !v.trim().is_empty());

        let resource = match raw {
            None => Resource::None,
            Some(raw) if trust::is_data_image(&raw) => Resource::DataImage,
            Some(raw) => match trust::resolve(&raw, doc.base_url()) {
                Some(url) => Resource::Resolved(url),
                None => Resource::Malformed(raw),
            },
        };

        let mut code = Vec::new();
        if tag == "script" {
            code.push(text.clone());
        }
        for name in attributes.iter().filter(|n| n.starts_with("on")) {
            if let Some(value) = doc.attr(node, name) {
                code.push(value);
            }
        }
        if let Some(href) = doc.attr(node, "href") {
            if href.trim_start().to_ascii_lowercase().starts_with("javascript:") {
                code.push(href);
            }
        }

        Some(Self {
            excerpt: fingerprint::excerpt(&text),
            markup: doc.start_tag(node),
            code: code.join("\n"),
            layout: doc.layout(node),
            tag,
            class,
            resource,
            attributes,
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_element(&self.tag, &self.class, &self.excerpt)
    }

    /// Text block patterns are matched against: tag, class, excerpt, markup,
    /// attribute names and the resolved resource URL.
    pub fn pattern_haystack(&self) -> String {
        let resource = match &self.resource {
            Resource::Resolved(url) => url.as_str(),
            Resource::Malformed(raw) => raw.as_str(),
            Resource::None | Resource::DataImage => "",
        };
        format!(
            "{} {} {} {} {} {}",
            self.tag,
            self.class,
            self.excerpt,
            self.markup,
            self.attributes.join(" "),
            resource
        )
    }

    pub fn has_event_handler(&self) -> bool {
        self.attributes
            .iter()
            .any(|a| a.len() > 2 && a.starts_with("on") && a[2..].chars().all(|c| c.is_ascii_alphabetic()))
    }
}
