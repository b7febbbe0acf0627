//! Built-in interception stages. Each stage only looks at its own kind of
//! [`PageAction`] and defers on everything else.

use super::{GuardContext, Interceptor, PageAction, Verdict};

/// New-window requests: trusted targets only.
pub struct WindowGuard;

impl Interceptor for WindowGuard {
    fn name(&self) -> &'static str {
        "window"
    }

    fn inspect(&self, action: &PageAction, cx: &GuardContext<'_>) -> Option<Verdict> {
        let PageAction::OpenWindow { url, navigational } = action else {
            return None;
        };
        let verdict = match cx.resolve(url) {
            Some(target) if cx.trust.is_trusted_destination(&target) => {
                if *navigational {
                    Verdict::Allow
                } else {
                    cx.route_verdict(&target)
                }
            }
            _ => Verdict::Suppress,
        };
        Some(verdict)
    }
}

/// Programmatic navigation: trusted targets are routed, everything else is
/// discarded.
pub struct NavigationGuard;

impl Interceptor for NavigationGuard {
    fn name(&self) -> &'static str {
        "navigation"
    }

    fn inspect(&self, action: &PageAction, cx: &GuardContext<'_>) -> Option<Verdict> {
        let PageAction::Navigate { url } = action else {
            return None;
        };
        Some(match cx.resolve(url) {
            Some(target) if cx.trust.is_trusted_destination(&target) => cx.route_verdict(&target),
            _ => Verdict::Suppress,
        })
    }
}

/// Click-driven navigation, including inline handlers.
pub struct ClickGuard;

impl ClickGuard {
    fn is_inert_target(url: &str) -> bool {
        let url = url.trim();
        url.is_empty() || url.starts_with('#') || url.to_ascii_lowercase().starts_with("javascript:void")
    }
}

impl Interceptor for ClickGuard {
    fn name(&self) -> &'static str {
        "click"
    }

    fn inspect(&self, action: &PageAction, cx: &GuardContext<'_>) -> Option<Verdict> {
        let PageAction::Click { url, handler } = action else {
            return None;
        };

        if handler
            .as_deref()
            .is_some_and(|code| cx.rules().matches_malicious(code))
        {
            return Some(Verdict::Suppress);
        }
        if Self::is_inert_target(url) {
            return None;
        }
        if cx.rules().matches_malicious(url) {
            return Some(Verdict::Suppress);
        }

        Some(match cx.resolve(url) {
            Some(target) if cx.trust.is_trusted_destination(&target) => cx.route_verdict(&target),
            _ => Verdict::Suppress,
        })
    }
}

/// Delayed and periodic callbacks whose source looks like a redirect or
/// popup are dropped. Textual matching only; not a security boundary.
pub struct TimerGuard;

impl Interceptor for TimerGuard {
    fn name(&self) -> &'static str {
        "timer"
    }

    fn inspect(&self, action: &PageAction, cx: &GuardContext<'_>) -> Option<Verdict> {
        let PageAction::Schedule { source } = action else {
            return None;
        };
        cx.rules()
            .matches_malicious(source)
            .then_some(Verdict::Suppress)
    }
}

/// Outbound requests: trusted destinations pass, block-pattern matches fail
/// without reaching the network.
pub struct NetworkGuard;

impl Interceptor for NetworkGuard {
    fn name(&self) -> &'static str {
        "network"
    }

    fn inspect(&self, action: &PageAction, cx: &GuardContext<'_>) -> Option<Verdict> {
        let PageAction::Fetch { url } = action else {
            return None;
        };

        let resolved = cx.resolve(url);
        if resolved
            .as_ref()
            .is_some_and(|target| cx.trust.is_trusted_destination(target))
        {
            tracing::info!(url = %url, "Allowed trusted request");
            return Some(Verdict::Allow);
        }

        let haystack = resolved.as_ref().map_or(url.as_str(), |u| u.as_str());
        cx.rules()
            .matches_block(haystack)
            .then_some(Verdict::Fail)
    }
}
