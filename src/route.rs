//! Routing references back through the gateway.

use url::Url;

use crate::error::{Result, SentinelError};

/// File name of the in-page engine, served next to the `/proxy` endpoint.
pub const ENGINE_SCRIPT: &str = "arx.js";

/// The public `/proxy` endpoint of the gateway.
///
/// Routed URLs have the form `<base>?url=<percent-encoded absolute URL>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRoute {
    base: Url,
}

impl GatewayRoute {
    /// `base` must be an absolute `http(s)` URL without a query, e.g.
    /// `https://gateway.example/proxy`.
    pub fn new(base: &str) -> Result<Self> {
        let mut base =
            Url::parse(base).map_err(|e| SentinelError::Config(format!("gateway base: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(SentinelError::Config(format!(
                "gateway base must be http(s): {base}"
            )));
        }
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Default location of the in-page engine: [`ENGINE_SCRIPT`] resolved
    /// against the endpoint, e.g. `https://gateway.example/arx.js`.
    pub fn engine_script_url(&self) -> String {
        self.base
            .join(ENGINE_SCRIPT)
            .map(String::from)
            .unwrap_or_else(|_| format!("/{ENGINE_SCRIPT}"))
    }

    /// Gateway URL that fetches `target` through the filter.
    pub fn route(&self, target: &Url) -> String {
        format!("{}?url={}", self.base, urlencoding::encode(target.as_str()))
    }

    /// `true` if `url` already points at this gateway endpoint.
    pub fn is_routed(&self, url: &Url) -> bool {
        url.scheme() == self.base.scheme()
            && url.host_str() == self.base.host_str()
            && url.port_or_known_default() == self.base.port_or_known_default()
            && url.path() == self.base.path()
    }

    /// The destination wrapped in a gateway URL, if `url` is one.
    pub fn unwrap(&self, url: &Url) -> Option<Url> {
        if !self.is_routed(url) {
            return None;
        }
        url.query_pairs()
            .find(|(k, _)| k == "url")
            .and_then(|(_, v)| Url::parse(&v).ok())
    }

    /// The destination `url` effectively points at: unwrapped if routed,
    /// unchanged otherwise.
    pub fn effective(&self, url: &Url) -> Url {
        self.unwrap(url).unwrap_or_else(|| url.clone())
    }
}
