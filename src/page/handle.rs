//! Session builder, the handle owning the worker, and the page-facing API.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::worker::{self, Command, Timings};
use super::{PageContext, Stats, VERSION};
use crate::dom::Document;
use crate::error::{Result, SentinelError};
use crate::feedback::{self, FeedbackPolicy, FeedbackStore};
use crate::guard::{EvasionGuard, PageHost};
use crate::passes::{ConsentAcceptor, RewriteMode, SweepReport};
use crate::route::GatewayRoute;
use crate::rules::{RuleSetBuilder, blocklist};
use crate::storage::Storage;

/// Builder for configuring and starting an in-page session.
///
/// # Example
///
/// ```rust,no_run
/// use arx_sentinel::{GatewayRoute, MemoryStorage, ParsedDocument, SessionBuilder};
/// use std::time::Duration;
///
/// # async fn example<H: arx_sentinel::PageHost + Clone + 'static>(host: H) -> arx_sentinel::Result<()> {
/// let route = GatewayRoute::new("https://gateway.example/proxy")?;
/// let doc = ParsedDocument::parse("<html><body></body></html>", None);
///
/// let session = SessionBuilder::new(MemoryStorage::new(), route)
///     .debounce(Duration::from_millis(300))
///     .feedback_secret("per-deployment secret")
///     .start(doc, host)
///     .await?;
///
/// session.api().notify_mutation()?;
/// let stats = session.api().stats().await?;
/// # let _ = stats;
/// session.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder<S: Storage> {
    storage: S,
    route: GatewayRoute,
    rules: RuleSetBuilder,
    mode: RewriteMode,
    policy: FeedbackPolicy,
    blocklist: Option<String>,
    timings: Timings,
    jitter: (Duration, Duration),
    channel_buffer: usize,
}

impl<S: Storage> SessionBuilder<S> {
    /// Create a builder with the default rule set and timings.
    ///
    /// Defaults: debounce 200 ms, consent settle 500 ms, startup consent
    /// retries at 1 s, 3 s and 6 s, guard interval 1 s, consent jitter
    /// 30-150 ms, channel buffer 256.
    pub fn new(storage: S, route: GatewayRoute) -> Self {
        Self {
            storage,
            route,
            rules: RuleSetBuilder::new(),
            mode: RewriteMode::default(),
            policy: FeedbackPolicy::default(),
            blocklist: None,
            timings: Timings::default(),
            jitter: (Duration::from_millis(30), Duration::from_millis(150)),
            channel_buffer: 256,
        }
    }

    pub fn rules(mut self, rules: RuleSetBuilder) -> Self {
        self.rules = rules;
        self
    }

    pub fn rewrite_mode(mut self, mode: RewriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn feedback_policy(mut self, policy: FeedbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Secret mixed into the feedback store's integrity digest.
    pub fn feedback_secret(mut self, secret: impl Into<String>) -> Self {
        self.policy.secret = secret.into();
        self
    }

    /// EasyList text to derive supplementary block patterns from. The parsed
    /// list is cached in storage; without this, the cached list is used.
    pub fn blocklist(mut self, text: impl Into<String>) -> Self {
        self.blocklist = Some(text.into());
        self
    }

    /// Quiet period after the last mutation before a rescan runs.
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.timings.debounce = debounce;
        self
    }

    /// Delay before re-sanitizing after a consent affordance was activated.
    pub fn consent_settle(mut self, settle: Duration) -> Self {
        self.timings.settle = settle;
        self
    }

    /// Offsets from start at which consent acceptance is retried.
    pub fn startup_retries(mut self, offsets: Vec<Duration>) -> Self {
        self.timings.startup_retries = offsets;
        self
    }

    /// Period of the hidden-slot geometry and hidden-redirect checks.
    pub fn guard_interval(mut self, interval: Duration) -> Self {
        self.timings.guard_interval = interval;
        self
    }

    pub fn consent_jitter(mut self, min: Duration, max: Duration) -> Self {
        self.jitter = (min, max);
        self
    }

    pub fn channel_buffer(mut self, size: usize) -> Self {
        self.channel_buffer = size;
        self
    }

    /// Load persisted state, spawn the session worker on the current
    /// [`LocalSet`](tokio::task::LocalSet) and return its handle.
    ///
    /// The worker runs an initial sanitization pass right away.
    pub async fn start<D, H>(self, doc: D, host: H) -> Result<SessionHandle<D, H>>
    where
        D: Document + 'static,
        H: PageHost + Clone + 'static,
    {
        let supplementary = match &self.blocklist {
            Some(text) => {
                let patterns = blocklist::parse_easylist(text);
                if let Err(e) = blocklist::store_cached(&self.storage, &patterns).await {
                    tracing::error!("Failed to cache block list: {e}");
                }
                patterns
            }
            None => blocklist::load_cached(&self.storage)
                .await
                .unwrap_or_default(),
        };
        let rules = Arc::new(self.rules.supplementary_patterns(supplementary).build()?);

        let feedback =
            FeedbackStore::load(self.policy, &self.storage, feedback::unix_millis()).await;
        let consent = ConsentAcceptor::new()?.with_jitter(self.jitter.0, self.jitter.1);
        let context = PageContext::new(rules.clone(), self.route.clone(), feedback, self.storage, consent)
            .with_mode(self.mode);

        let guard = EvasionGuard::new(host.clone(), rules, self.route);

        let (tx, rx) = mpsc::channel(self.channel_buffer);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = tokio::task::spawn_local(worker::run(
            doc,
            context,
            host,
            rx,
            shutdown_rx,
            self.timings,
        ));

        tracing::info!(version = VERSION, "Session started");
        Ok(SessionHandle {
            api: SessionApi::new(tx),
            guard,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        })
    }
}

/// Handle returned by [`SessionBuilder::start`].
///
/// Owns the shutdown signal, the worker task and the [`EvasionGuard`] the
/// page's navigation and network primitives are routed through.
pub struct SessionHandle<D, H> {
    api: SessionApi,
    guard: EvasionGuard<H>,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<D>>,
}

impl<D, H> SessionHandle<D, H> {
    pub fn api(&self) -> &SessionApi {
        &self.api
    }

    pub fn guard(&self) -> &EvasionGuard<H> {
        &self.guard
    }

    /// Stop the worker and hand back the document.
    pub async fn shutdown(mut self) -> Option<D> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.worker.take() {
            Some(handle) => handle.await.ok(),
            None => None,
        }
    }
}

/// Page-facing engine API. Cheap to clone.
#[derive(Clone)]
pub struct SessionApi {
    tx: mpsc::Sender<Command>,
}

impl SessionApi {
    pub(super) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Report a DOM mutation. Bursts collapse into a single debounced
    /// rescan, so a full channel is not an error.
    pub fn notify_mutation(&self) -> Result<()> {
        match self.tx.try_send(Command::Mutated) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SentinelError::SessionClosed),
        }
    }

    /// `feedback(text, label, tag?)`.
    pub async fn feedback(&self, text: &str, label: &str, tag: Option<&str>) -> Result<()> {
        self.request(|reply| Command::Feedback {
            text: text.to_string(),
            label: label.to_string(),
            tag: tag.map(str::to_string),
            reply,
        })
        .await?
    }

    /// `getStats()`.
    pub async fn stats(&self) -> Result<Stats> {
        self.request(Command::Stats).await
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    /// `limparAds()`: run the sanitization pass now.
    pub async fn clean(&self) -> Result<SweepReport> {
        self.request(Command::Clean).await
    }

    /// `acceptCookies()`: run the consent acceptor now.
    pub async fn accept_cookies(&self) -> Result<bool> {
        self.request(Command::AcceptConsent).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| SentinelError::SessionClosed)?;
        rx.await.map_err(|_| SentinelError::SessionClosed)
    }
}
