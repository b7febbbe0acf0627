//! Upstream document fetching.

use std::time::Duration;

use bytes::Bytes;
use encoding_rs::Encoding;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

use crate::error::{Result, SentinelError};

/// A fetched upstream resource.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl Fetched {
    /// Whether the body is an HTML document that should be sanitized.
    pub fn is_html(&self) -> bool {
        self.content_type.as_deref().is_none_or(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/html") || ct.starts_with("application/xhtml")
        })
    }

    /// Body decoded with the charset named in the content type, falling back
    /// to a `charset=` declaration near the top of the document and then to
    /// UTF-8. A byte order mark overrides both.
    pub fn decode_text(&self) -> String {
        let encoding = self
            .content_type
            .as_deref()
            .and_then(charset_param)
            .or_else(|| declared_charset(&self.body))
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(encoding_rs::UTF_8);

        let (text, used, had_errors) = encoding.decode(&self.body);
        if had_errors {
            tracing::debug!(encoding = used.name(), "Replaced malformed sequences in body");
        }
        text.into_owned()
    }
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|part| part.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches(['"', '\'']).to_string())
        .filter(|label| !label.is_empty())
}

/// `<meta charset>` or `http-equiv` declaration in the first kilobyte.
fn declared_charset(body: &[u8]) -> Option<String> {
    let prefix = String::from_utf8_lossy(&body[..body.len().min(1024)]).to_ascii_lowercase();
    let start = prefix.find("charset=")? + "charset=".len();
    let label: String = prefix[start..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        .collect();
    (!label.is_empty()).then_some(label)
}

/// Abstraction over the HTTP client that retrieves documents for the
/// gateway. Shared across handlers via `Arc`.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Fetched>;
}

/// [`Fetcher`] backed by `reqwest`.
///
/// Requests carry a browser-like header set; if that attempt fails the
/// request is retried once with only a `User-Agent` header.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl ReqwestFetcher {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SentinelError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }

    fn browser_headers(&self) -> HeaderMap {
        let mut headers = self.reduced_headers();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers
    }

    fn reduced_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, value);
        }
        headers
    }

    async fn attempt(&self, url: &Url, headers: HeaderMap) -> Result<Fetched> {
        let response = self
            .client
            .get(url.as_str())
            .headers(headers)
            .send()
            .await
            .map_err(|e| SentinelError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SentinelError::Upstream(format!("{url} returned {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| SentinelError::Upstream(e.to_string()))?;

        Ok(Fetched {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &Url) -> Result<Fetched> {
        match self.attempt(url, self.browser_headers()).await {
            Ok(fetched) => Ok(fetched),
            Err(e) => {
                tracing::warn!(%url, "Fetch failed, retrying with reduced headers: {e}");
                self.attempt(url, self.reduced_headers()).await
            }
        }
    }
}
