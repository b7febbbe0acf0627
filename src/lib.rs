//! # arx_sentinel
//!
//! A heuristic ad and tracker filtering engine with two deployment contexts
//! sharing one rule set:
//!
//! - a **gateway** ([`gateway`]) that fetches a page on behalf of a client,
//!   sanitizes it, rewrites its links so browsing stays behind the gateway,
//!   injects the in-page engine and caches the result;
//! - an **in-page session** ([`page`]) that keeps a live document clean as it
//!   mutates, accepts cookie banners, learns from user feedback and guards
//!   the page's navigation and network primitives ([`guard`]).
//!
//! ## Overview
//!
//! Elements are scored by the [`Classifier`] from independently weighted
//! signals (ad vocabulary, tag type, inline handlers, fixed positioning,
//! undersized boxes, block and malicious patterns, prior feedback). Trusted
//! destinations, consent UI and whitelisted containers short-circuit to a
//! low score. Elements at or above the threshold are hidden by the
//! sanitization pass ([`passes::sweep`]); references are rewritten by the
//! [`Rewriter`].
//!
//! Passes work against the [`Document`] capability trait; [`ParsedDocument`]
//! is the scraper-backed implementation used by the gateway and the tests.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use arx_sentinel::{gateway, GatewayRoute, ReqwestFetcher, RuleSet};
//!
//! # async fn example() -> arx_sentinel::Result<()> {
//! let rules = Arc::new(RuleSet::defaults()?);
//! let route = GatewayRoute::new("http://localhost:3000/proxy")?;
//! let fetcher = Arc::new(ReqwestFetcher::new("ArxSentinel/0.1", std::time::Duration::from_secs(10))?);
//!
//! let app = gateway::build_router(gateway::AppState::new(rules, route, fetcher));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `native-tls` | **yes** | Platform TLS for upstream fetches. |
//! | `rustls-tls` | no | Use `rustls` instead of the platform TLS. |

pub mod classifier;
pub mod config;
pub mod dom;
pub mod error;
pub mod feedback;
pub mod fingerprint;
pub mod gateway;
pub mod guard;
pub mod page;
pub mod passes;
pub mod route;
pub mod rules;
pub mod sanitizer;
pub mod storage;
pub mod trust;

pub use classifier::{Classifier, FeedbackLookup, ScoreCache};
pub use config::SentinelConfig;
pub use dom::{Document, ElementDescriptor, ParsedDocument};
pub use error::{Result, SentinelError};
pub use feedback::{FeedbackPolicy, FeedbackRejection, FeedbackStore, Label};
pub use fingerprint::Fingerprint;
pub use gateway::{Fetcher, ReqwestFetcher, ResultCache};
pub use guard::{EvasionGuard, GuardChain, Interceptor, PageAction, PageHost, Verdict};
pub use page::{SessionApi, SessionBuilder, SessionHandle, Stats};
pub use passes::{ConsentAcceptor, RewriteMode, Rewriter, SweepReport};
pub use route::GatewayRoute;
pub use rules::{RuleSet, RuleSetBuilder, Weights};
pub use sanitizer::{DocumentSanitizer, Sanitizer, SanitizerPipeline, ScriptInjector};
pub use storage::{FsStorage, MemoryStorage, Storage};
pub use trust::TrustResolver;
