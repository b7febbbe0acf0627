//! In-page engine session.
//!
//! A session owns the live [`Document`], a [`PageContext`] (session weights,
//! feedback store, counters) and a background worker that debounces
//! mutation-driven rescans, retries consent acceptance at startup and runs
//! the periodic guard countermeasures. The hosting page talks to it through
//! a [`SessionApi`], optionally installed once into a process-wide slot
//! with [`install`].
//!
//! The in-page context is single-threaded: the worker is spawned with
//! [`tokio::task::spawn_local`], so sessions must be started inside a
//! [`LocalSet`](tokio::task::LocalSet).

mod handle;
mod worker;

pub use handle::{SessionApi, SessionBuilder, SessionHandle};

use std::sync::{Arc, OnceLock};

use serde::Serialize;

use crate::classifier::{Classifier, ScoreCache};
use crate::dom::Document;
use crate::error::{Result, SentinelError};
use crate::feedback::FeedbackStore;
use crate::passes::{self, ConsentAcceptor, RewriteMode, Rewriter, SweepReport};
use crate::route::GatewayRoute;
use crate::rules::{RuleSet, Weights};
use crate::storage::Storage;
use crate::trust::TrustResolver;

/// Engine version reported to the page.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Session counters reported by `getStats()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Elements hidden over the whole session.
    pub blocked_count: usize,
    pub feedback_count: usize,
    /// Current session weights, including feedback nudges.
    pub weights: Weights,
    /// Sanitization passes run so far.
    pub scans: usize,
}

/// Per-session engine state, passed explicitly into every pass.
pub struct PageContext<S> {
    rules: Arc<RuleSet>,
    weights: Weights,
    route: GatewayRoute,
    mode: RewriteMode,
    feedback: FeedbackStore,
    storage: S,
    consent: ConsentAcceptor,
    blocked_total: usize,
    scans: usize,
}

impl<S: Storage> PageContext<S> {
    pub fn new(
        rules: Arc<RuleSet>,
        route: GatewayRoute,
        feedback: FeedbackStore,
        storage: S,
        consent: ConsentAcceptor,
    ) -> Self {
        Self {
            weights: rules.weights().clone(),
            rules,
            route,
            mode: RewriteMode::default(),
            feedback,
            storage,
            consent,
            blocked_total: 0,
            scans: 0,
        }
    }

    pub fn with_mode(mut self, mode: RewriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    pub fn route(&self) -> &GatewayRoute {
        &self.route
    }

    /// Sanitization pass followed by the rewrite pass.
    pub fn clean<D: Document>(&mut self, doc: &mut D) -> SweepReport {
        let trust = TrustResolver::new(&self.rules).with_route(&self.route);
        let classifier = Classifier::new(trust)
            .with_weights(&self.weights)
            .with_feedback(&self.feedback);

        let report = passes::sweep(doc, &classifier, &mut ScoreCache::new());
        Rewriter::new(trust, &self.route)
            .with_mode(self.mode)
            .rewrite(doc);

        self.blocked_total += report.hidden;
        self.scans += 1;
        report
    }

    pub async fn accept_consent<D: Document>(&self, doc: &mut D) -> bool {
        self.consent.accept(doc).await
    }

    /// Record a user label, nudge the tag's session weight and persist the
    /// store. The caller re-runs the sanitization pass on success.
    pub async fn feedback(
        &mut self,
        text: &str,
        label: &str,
        tag: Option<&str>,
        now_ms: u64,
    ) -> Result<()> {
        let fingerprint = match self.feedback.record(text, label, tag, now_ms) {
            Ok(fp) => fp,
            Err(rejection) => {
                tracing::warn!(%rejection, "Rejected feedback");
                return Err(rejection.into());
            }
        };

        if let Some(record) = self.feedback.get(fingerprint) {
            if let Some(tag) = &record.tag {
                self.weights.nudge(tag, record.label);
            }
            tracing::info!(%fingerprint, label = %record.label, "Recorded feedback");
        }

        if let Err(e) = self.feedback.persist(&self.storage).await {
            tracing::error!("Failed to persist feedback: {e}");
        }
        Ok(())
    }

    pub fn stats(&self) -> Stats {
        Stats {
            blocked_count: self.blocked_total,
            feedback_count: self.feedback.len(),
            weights: self.weights.clone(),
            scans: self.scans,
        }
    }
}

static API: OnceLock<SessionApi> = OnceLock::new();

/// Install `api` as the page-global engine API.
///
/// The slot can be filled once; later calls fail with
/// [`SentinelError::AlreadyInstalled`] and leave the installed API in place.
pub fn install(api: SessionApi) -> Result<&'static SessionApi> {
    API.set(api).map_err(|_| SentinelError::AlreadyInstalled)?;
    tracing::info!(version = VERSION, "Engine API installed");
    API.get().ok_or(SentinelError::SessionClosed)
}

/// The page-global engine API, if installed.
pub fn api() -> Option<&'static SessionApi> {
    API.get()
}
