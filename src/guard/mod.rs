//! Evasion Guard: interception of page-initiated actions.
//!
//! Hostile pages open popups, reassign `location`, schedule redirecting
//! callbacks, call tracking endpoints and probe hidden ad slots. Instead of
//! patching page globals, every such action is described as a
//! [`PageAction`] and evaluated by a [`GuardChain`] of [`Interceptor`]
//! stages. The first stage that returns a [`Verdict`] decides; an action no
//! stage objects to is allowed.
//!
//! [`EvasionGuard`] wraps a [`PageHost`] (the real navigation/network
//! boundary of the page) and only forwards what the chain admits.

mod countermeasures;
mod stages;

pub use countermeasures::{halt_hidden_redirect, spoof_hidden_geometry};
pub use stages::{ClickGuard, NavigationGuard, NetworkGuard, TimerGuard, WindowGuard};

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::route::GatewayRoute;
use crate::rules::RuleSet;
use crate::trust::{self, TrustResolver};

/// An action initiated by page script or by the user on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    /// `window.open`. `navigational` is set when the window replaces the
    /// current browsing context (`_self`/`_top`).
    OpenWindow { url: String, navigational: bool },
    /// Programmatic assignment to the page location.
    Navigate { url: String },
    /// A click on a link or an element with an inline handler.
    Click { url: String, handler: Option<String> },
    /// `setTimeout`/`setInterval` with the callback's source text.
    Schedule { source: String },
    /// An outbound network request.
    Fetch { url: String },
}

/// Outcome of evaluating a [`PageAction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Forward unchanged.
    Allow,
    /// Forward, but to this (gateway) URL instead.
    Route(String),
    /// Drop without effect.
    Suppress,
    /// Answer with a synthetic failure instead of reaching the network.
    Fail,
}

/// What interceptors may consult.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub trust: TrustResolver<'a>,
    pub route: &'a GatewayRoute,
    /// URL of the page the action originates from.
    pub base: Option<&'a Url>,
}

impl<'a> GuardContext<'a> {
    pub fn rules(&self) -> &'a RuleSet {
        self.trust.rules()
    }

    /// Resolve a possibly relative target. `None` means untrusted.
    pub fn resolve(&self, raw: &str) -> Option<Url> {
        trust::resolve(raw, self.base)
    }

    pub fn is_trusted(&self, raw: &str) -> bool {
        self.trust.is_trusted_reference(raw, self.base)
    }

    /// Route a trusted destination through the gateway, unless it already is.
    pub fn route_verdict(&self, url: &Url) -> Verdict {
        if self.route.is_routed(url) {
            Verdict::Allow
        } else {
            Verdict::Route(self.route.route(url))
        }
    }
}

/// A single interception stage.
pub trait Interceptor {
    fn name(&self) -> &'static str;

    /// `None` when this stage has no opinion on `action`.
    fn inspect(&self, action: &PageAction, cx: &GuardContext<'_>) -> Option<Verdict>;
}

/// Ordered interception stages.
pub struct GuardChain {
    stages: Vec<Box<dyn Interceptor>>,
}

impl GuardChain {
    /// A chain without stages, allowing everything.
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Window, navigation, click, timer and network stages.
    pub fn standard() -> Self {
        let mut chain = Self::new();
        chain.push(WindowGuard);
        chain.push(NavigationGuard);
        chain.push(ClickGuard);
        chain.push(TimerGuard);
        chain.push(NetworkGuard);
        chain
    }

    pub fn push(&mut self, stage: impl Interceptor + 'static) {
        self.stages.push(Box::new(stage));
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn evaluate(&self, action: &PageAction, cx: &GuardContext<'_>) -> Verdict {
        for stage in &self.stages {
            if let Some(verdict) = stage.inspect(action, cx) {
                tracing::debug!(stage = stage.name(), ?action, ?verdict, "Guard verdict");
                return verdict;
            }
        }
        Verdict::Allow
    }
}

impl Default for GuardChain {
    fn default() -> Self {
        Self::standard()
    }
}

/// Response of a guarded network request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// `true` if the guard answered without touching the network.
    pub synthetic: bool,
}

impl FetchResponse {
    /// Network-error-like answer for blocked requests.
    pub const BLOCKED: FetchResponse = FetchResponse {
        status: 0,
        synthetic: true,
    };
}

/// Page visibility as seen by the hidden-redirect countermeasure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Visibility {
    /// The document is actually backgrounded.
    pub hidden: bool,
    pub focused: bool,
    /// What the page currently claims about its own visibility.
    pub reported_visible: bool,
}

/// The page's real navigation and network primitives.
pub trait PageHost {
    fn page_url(&self) -> Option<Url>;
    fn open_window(&self, url: &str);
    fn navigate(&self, url: &str);
    fn schedule(&self, source: &str, delay: Duration);
    fn fetch(&self, url: &str) -> FetchResponse;
    fn visibility(&self) -> Visibility;
    /// Abort any in-flight navigation.
    fn stop_navigation(&self);
}

impl<H: PageHost + ?Sized> PageHost for Rc<H> {
    fn page_url(&self) -> Option<Url> {
        (**self).page_url()
    }

    fn open_window(&self, url: &str) {
        (**self).open_window(url)
    }

    fn navigate(&self, url: &str) {
        (**self).navigate(url)
    }

    fn schedule(&self, source: &str, delay: Duration) {
        (**self).schedule(source, delay)
    }

    fn fetch(&self, url: &str) -> FetchResponse {
        (**self).fetch(url)
    }

    fn visibility(&self) -> Visibility {
        (**self).visibility()
    }

    fn stop_navigation(&self) {
        (**self).stop_navigation()
    }
}

/// What happened to a click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The page's default action proceeds.
    Default,
    /// The default action was prevented and the host navigated here instead.
    Rerouted(String),
    /// The default action was prevented and nothing happened.
    Suppressed,
}

/// Guarded facade over a [`PageHost`].
pub struct EvasionGuard<H> {
    host: H,
    rules: Arc<RuleSet>,
    route: GatewayRoute,
    chain: GuardChain,
}

impl<H: PageHost> EvasionGuard<H> {
    pub fn new(host: H, rules: Arc<RuleSet>, route: GatewayRoute) -> Self {
        Self {
            host,
            rules,
            route,
            chain: GuardChain::standard(),
        }
    }

    /// Replace the interception chain.
    pub fn with_chain(mut self, chain: GuardChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Evaluate `action` against the chain.
    pub fn check(&self, action: &PageAction) -> Verdict {
        let base = self.host.page_url();
        let cx = GuardContext {
            trust: TrustResolver::new(&self.rules).with_route(&self.route),
            route: &self.route,
            base: base.as_ref(),
        };
        self.chain.evaluate(action, &cx)
    }

    /// Returns `true` if a window was opened.
    pub fn open_window(&self, url: &str, navigational: bool) -> bool {
        let action = PageAction::OpenWindow {
            url: url.to_string(),
            navigational,
        };
        match self.check(&action) {
            Verdict::Allow => self.host.open_window(url),
            Verdict::Route(routed) => self.host.open_window(&routed),
            Verdict::Suppress | Verdict::Fail => {
                tracing::warn!(url, "Suppressed window");
                return false;
            }
        }
        true
    }

    /// Location assignment. Rejected targets are discarded silently.
    pub fn assign_location(&self, url: &str) {
        match self.check(&PageAction::Navigate { url: url.to_string() }) {
            Verdict::Allow => self.host.navigate(url),
            Verdict::Route(routed) => self.host.navigate(&routed),
            Verdict::Suppress | Verdict::Fail => {
                tracing::warn!(url, "Discarded navigation");
            }
        }
    }

    pub fn click(&self, url: &str, handler: Option<&str>) -> ClickOutcome {
        let action = PageAction::Click {
            url: url.to_string(),
            handler: handler.map(str::to_string),
        };
        match self.check(&action) {
            Verdict::Allow => ClickOutcome::Default,
            Verdict::Route(routed) => {
                self.host.navigate(&routed);
                ClickOutcome::Rerouted(routed)
            }
            Verdict::Suppress | Verdict::Fail => {
                tracing::warn!(url, "Suppressed click navigation");
                ClickOutcome::Suppressed
            }
        }
    }

    /// Returns `true` if the callback was handed to the host scheduler.
    pub fn schedule(&self, source: &str, delay: Duration) -> bool {
        let action = PageAction::Schedule {
            source: source.to_string(),
        };
        match self.check(&action) {
            Verdict::Allow | Verdict::Route(_) => {
                self.host.schedule(source, delay);
                true
            }
            Verdict::Suppress | Verdict::Fail => {
                tracing::warn!(delay_ms = delay.as_millis() as u64, "Dropped scheduled callback");
                false
            }
        }
    }

    pub fn fetch(&self, url: &str) -> FetchResponse {
        match self.check(&PageAction::Fetch { url: url.to_string() }) {
            Verdict::Allow => self.host.fetch(url),
            Verdict::Route(routed) => self.host.fetch(&routed),
            Verdict::Suppress | Verdict::Fail => {
                tracing::warn!(url, "Blocked network request");
                FetchResponse::BLOCKED
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct FakeHost {
        opened: RefCell<Vec<String>>,
        navigated: RefCell<Vec<String>>,
        scheduled: RefCell<Vec<String>>,
        fetched: RefCell<Vec<String>>,
    }

    impl PageHost for FakeHost {
        fn page_url(&self) -> Option<Url> {
            Url::parse("https://reader.example/title/1").ok()
        }
        fn open_window(&self, url: &str) {
            self.opened.borrow_mut().push(url.to_string());
        }
        fn navigate(&self, url: &str) {
            self.navigated.borrow_mut().push(url.to_string());
        }
        fn schedule(&self, source: &str, _delay: Duration) {
            self.scheduled.borrow_mut().push(source.to_string());
        }
        fn fetch(&self, url: &str) -> FetchResponse {
            self.fetched.borrow_mut().push(url.to_string());
            FetchResponse {
                status: 200,
                synthetic: false,
            }
        }
        fn visibility(&self) -> Visibility {
            Visibility::default()
        }
        fn stop_navigation(&self) {}
    }

    fn guard() -> EvasionGuard<Rc<FakeHost>> {
        EvasionGuard::new(
            Rc::new(FakeHost::default()),
            Arc::new(RuleSet::defaults().unwrap()),
            GatewayRoute::new("https://gw.example/proxy").unwrap(),
        )
    }

    #[test]
    fn untrusted_popup_is_suppressed() {
        let guard = guard();
        assert!(!guard.open_window("https://popunder.example/win", false));
        assert!(guard.host().opened.borrow().is_empty());
    }

    #[test]
    fn trusted_popup_is_routed_unless_navigational() {
        let guard = guard();
        assert!(guard.open_window("/chapter/2", false));
        assert!(guard.open_window("https://www.webtoons.com/x", true));
        assert_eq!(
            *guard.host().opened.borrow(),
            vec![
                "https://gw.example/proxy?url=https%3A%2F%2Freader.example%2Fchapter%2F2".to_string(),
                "https://www.webtoons.com/x".to_string(),
            ]
        );
    }

    #[test]
    fn untrusted_location_assignment_has_no_effect() {
        let guard = guard();
        guard.assign_location("https://evil.example/landing");
        guard.assign_location("http://[::1");
        assert!(guard.host().navigated.borrow().is_empty());

        guard.assign_location("/chapter/3");
        assert_eq!(guard.host().navigated.borrow().len(), 1);
    }

    #[test]
    fn clicks_are_rerouted_or_suppressed() {
        let guard = guard();
        assert_eq!(
            guard.click("/chapter/4", None),
            ClickOutcome::Rerouted(
                "https://gw.example/proxy?url=https%3A%2F%2Freader.example%2Fchapter%2F4".to_string()
            )
        );
        assert_eq!(guard.click("https://ads.example/go", None), ClickOutcome::Suppressed);
        assert_eq!(
            guard.click("#", Some("window.location.href='https://evil.example'")),
            ClickOutcome::Suppressed
        );
        assert_eq!(guard.click("#", Some("toggleMenu()")), ClickOutcome::Default);
    }

    #[test]
    fn redirecting_callback_is_dropped() {
        let guard = guard();
        assert!(!guard.schedule("function(){ location.replace('https://evil.example') }", Duration::from_secs(3)));
        assert!(guard.schedule("function(){ render() }", Duration::from_millis(10)));
        assert_eq!(*guard.host().scheduled.borrow(), vec!["function(){ render() }".to_string()]);
    }

    #[test]
    fn tracker_requests_fail_synthetically() {
        let guard = guard();
        assert_eq!(guard.fetch("https://www.google-analytics.com/collect"), FetchResponse::BLOCKED);
        assert_eq!(guard.fetch("https://cdn.example.net/ads.json").status, 200);
        assert_eq!(guard.fetch("/api/comments").status, 200);
        assert_eq!(
            *guard.host().fetched.borrow(),
            vec!["https://cdn.example.net/ads.json".to_string(), "/api/comments".to_string()]
        );
    }

    #[test]
    fn empty_chain_allows_everything() {
        let guard = guard().with_chain(GuardChain::new());
        assert!(guard.open_window("https://popunder.example/win", false));
    }
}
