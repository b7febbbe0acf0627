//! Gateway HTTP endpoint.
//!
//! `GET /proxy?url=<percent-encoded absolute URL>` fetches the target,
//! runs it through the [`SanitizerPipeline`] and returns the cleaned
//! document. Responses are cached per source URL in a [`ResultCache`].
//! Non-HTML resources routed through the endpoint are passed back
//! unmodified.

mod cache;
mod fetch;

pub use cache::ResultCache;
pub use fetch::{Fetched, Fetcher, ReqwestFetcher};

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use url::Url;

use crate::error::{Result, SentinelError};
use crate::passes::RewriteMode;
use crate::route::GatewayRoute;
use crate::rules::RuleSet;
use crate::sanitizer::{DocumentSanitizer, SanitizerPipeline, ScriptInjector};
use crate::trust::TrustResolver;

/// Response header reporting whether the document came from the cache.
pub const CACHE_HEADER: HeaderName = HeaderName::from_static("x-arx-cache");

impl IntoResponse for SentinelError {
    fn into_response(self) -> Response {
        let (status, public_message) = match &self {
            SentinelError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "URL missing or invalid"),
            SentinelError::UnsupportedScheme(_) => (StatusCode::BAD_REQUEST, "Invalid protocol"),
            SentinelError::Blocked(_) => (StatusCode::FORBIDDEN, "Destination blocked"),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch or process the content",
            ),
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {self}");
        } else {
            tracing::warn!("Request rejected: {self}");
        }
        (status, public_message).into_response()
    }
}

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub rules: Arc<RuleSet>,
    pub route: GatewayRoute,
    pub pipeline: Arc<SanitizerPipeline>,
    pub cache: ResultCache,
    pub fetcher: Arc<dyn Fetcher>,
}

impl AppState {
    /// State with the standard pipeline (strict rewriting, engine served
    /// next to the endpoint) and a 600 s result cache.
    pub fn new(rules: Arc<RuleSet>, route: GatewayRoute, fetcher: Arc<dyn Fetcher>) -> Self {
        let script_url = route.engine_script_url();
        let pipeline = standard_pipeline(rules.clone(), route.clone(), RewriteMode::Strict, &script_url);
        Self {
            rules,
            route,
            pipeline: Arc::new(pipeline),
            cache: ResultCache::new(Duration::from_secs(600)),
            fetcher,
        }
    }

    pub fn with_pipeline(mut self, pipeline: SanitizerPipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = cache;
        self
    }
}

/// Document pass followed by injection of the engine served at `script_url`.
pub fn standard_pipeline(
    rules: Arc<RuleSet>,
    route: GatewayRoute,
    mode: RewriteMode,
    script_url: &str,
) -> SanitizerPipeline {
    let mut pipeline = SanitizerPipeline::new();
    pipeline.add(DocumentSanitizer::new(rules, route, mode));
    pipeline.add(ScriptInjector::new(script_url));
    pipeline
}

#[derive(Debug, Deserialize)]
pub struct ProxyParams {
    pub url: Option<String>,
}

pub async fn health() -> &'static str {
    "ok"
}

/// `GET /proxy?url=...`
pub async fn proxy_handler(
    State(state): State<AppState>,
    Query(params): Query<ProxyParams>,
) -> Response {
    match serve(&state, params.url.as_deref()).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn serve(state: &AppState, raw: Option<&str>) -> Result<Response> {
    let target = parse_target(raw)?;
    let target = state.route.effective(&target);

    let trusted = TrustResolver::new(&state.rules).is_trusted_destination(&target);
    if !trusted && state.rules.matches_block(target.as_str()) {
        return Err(SentinelError::Blocked(target.to_string()));
    }

    let key = target.as_str();
    if let Some(document) = state.cache.get(key) {
        tracing::debug!(url = key, "Cache hit");
        return Ok(([(CACHE_HEADER, "hit")], Html(document.to_string())).into_response());
    }

    let fetched = state.fetcher.fetch(&target).await?;
    if !fetched.is_html() {
        let content_type = fetched
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        return Ok(([(header::CONTENT_TYPE, content_type)], fetched.body).into_response());
    }

    let html = fetched.decode_text();
    let cleaned = state.pipeline.sanitize(&html, &target);
    state.cache.insert(key, cleaned.as_str());

    Ok(([(CACHE_HEADER, "miss")], Html(cleaned)).into_response())
}

fn parse_target(raw: Option<&str>) -> Result<Url> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SentinelError::InvalidUrl("missing url parameter".to_string()))?;
    let url = Url::parse(raw).map_err(|e| SentinelError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SentinelError::UnsupportedScheme(url.scheme().to_string()));
    }
    Ok(url)
}

/// Build the axum router with the proxy and health endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/proxy", get(proxy_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_must_be_absolute_http() {
        assert!(matches!(parse_target(None), Err(SentinelError::InvalidUrl(_))));
        assert!(matches!(parse_target(Some("  ")), Err(SentinelError::InvalidUrl(_))));
        assert!(matches!(
            parse_target(Some("/relative")),
            Err(SentinelError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_target(Some("ftp://files.example/a")),
            Err(SentinelError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            parse_target(Some("javascript:alert(1)")),
            Err(SentinelError::UnsupportedScheme(_))
        ));
        assert_eq!(
            parse_target(Some("https://site.example/a?b=1")).unwrap().as_str(),
            "https://site.example/a?b=1"
        );
    }

    #[test]
    fn errors_map_to_status_codes() {
        let status = |e: SentinelError| e.into_response().status();
        assert_eq!(status(SentinelError::InvalidUrl("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(SentinelError::UnsupportedScheme("ftp".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(SentinelError::Blocked("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status(SentinelError::Upstream("timeout".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
