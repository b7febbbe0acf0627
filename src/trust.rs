//! The single trusted-destination predicate.
//!
//! The Classifier, the Rewriter and every Evasion Guard stage decide trust
//! through [`TrustResolver`]; none of them re-implements the check.

use url::Url;

use crate::route::GatewayRoute;
use crate::rules::RuleSet;

/// Decides whether a destination is on the trusted allow-list.
#[derive(Debug, Clone, Copy)]
pub struct TrustResolver<'a> {
    rules: &'a RuleSet,
    route: Option<&'a GatewayRoute>,
}

impl<'a> TrustResolver<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules, route: None }
    }

    /// Unwrap gateway-routed URLs before evaluating them.
    pub fn with_route(mut self, route: &'a GatewayRoute) -> Self {
        self.route = Some(route);
        self
    }

    pub fn rules(&self) -> &'a RuleSet {
        self.rules
    }

    /// `true` iff the hostname matches a trusted-domain pattern or the path
    /// matches a trusted-path pattern.
    pub fn is_trusted_destination(&self, url: &Url) -> bool {
        let url = self.effective(url);
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let host_trusted = url
            .host_str()
            .is_some_and(|host| self.rules.is_trusted_host(host));
        host_trusted || self.rules.is_trusted_path(url.path())
    }

    /// Resolve `raw` against `base` and check it. Anything that fails to
    /// resolve is untrusted.
    pub fn is_trusted_reference(&self, raw: &str, base: Option<&Url>) -> bool {
        resolve(raw, base).is_some_and(|url| self.is_trusted_destination(&url))
    }

    /// The destination behind a gateway URL, or `url` itself.
    pub fn effective(&self, url: &Url) -> Url {
        match self.route {
            Some(route) => route.effective(url),
            None => url.clone(),
        }
    }
}

/// Resolve a possibly relative reference.
pub fn resolve(raw: &str, base: Option<&Url>) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match base {
        Some(base) => base.join(raw).ok(),
        None => Url::parse(raw).ok(),
    }
}

/// `true` for inline `data:image/...` URIs.
pub fn is_data_image(raw: &str) -> bool {
    raw.trim_start()
        .get(..11)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:image/"))
}
