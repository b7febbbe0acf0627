//! Session worker: owns the document and serializes every pass over it.
//!
//! This module is internal -- pages interact with it through
//! [`SessionApi`](super::SessionApi).

use std::collections::VecDeque;
use std::time::Duration;

use futures::future::OptionFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

use super::{PageContext, Stats};
use crate::dom::Document;
use crate::error::Result;
use crate::feedback;
use crate::guard::{self, PageHost};
use crate::passes::SweepReport;
use crate::storage::Storage;

pub(crate) enum Command {
    Mutated,
    Clean(oneshot::Sender<SweepReport>),
    AcceptConsent(oneshot::Sender<bool>),
    Feedback {
        text: String,
        label: String,
        tag: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    Stats(oneshot::Sender<Stats>),
}

#[derive(Debug, Clone)]
pub(crate) struct Timings {
    pub debounce: Duration,
    pub settle: Duration,
    pub startup_retries: Vec<Duration>,
    pub guard_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            settle: Duration::from_millis(500),
            startup_retries: vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(6),
            ],
            guard_interval: Duration::from_secs(1),
        }
    }
}

pub(crate) async fn run<D, S, H>(
    mut doc: D,
    mut cx: PageContext<S>,
    host: H,
    mut rx: mpsc::Receiver<Command>,
    mut shutdown_rx: oneshot::Receiver<()>,
    timings: Timings,
) -> D
where
    D: Document,
    S: Storage,
    H: PageHost,
{
    let started = Instant::now();
    let mut startup: VecDeque<Instant> = timings
        .startup_retries
        .iter()
        .map(|offset| started + *offset)
        .collect();
    let mut rescan_at: Option<Instant> = None;
    let mut settle_at: Option<Instant> = None;

    let mut interval = time::interval(timings.guard_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Skip the first immediate tick
    interval.tick().await;

    cx.clean(&mut doc);

    loop {
        let rescan = OptionFuture::from(rescan_at.map(time::sleep_until));
        let settle = OptionFuture::from(settle_at.map(time::sleep_until));
        let retry = OptionFuture::from(startup.front().copied().map(time::sleep_until));

        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                rx.close();
                tracing::info!(scans = cx.stats().scans, "Session worker shut down");
                return doc;
            }

            Some(command) = rx.recv() => match command {
                Command::Mutated => {
                    rescan_at = Some(Instant::now() + timings.debounce);
                }
                Command::Clean(reply) => {
                    let _ = reply.send(cx.clean(&mut doc));
                }
                Command::AcceptConsent(reply) => {
                    let accepted = cx.accept_consent(&mut doc).await;
                    if accepted {
                        settle_at = Some(Instant::now() + timings.settle);
                    }
                    let _ = reply.send(accepted);
                }
                Command::Feedback { text, label, tag, reply } => {
                    let result = cx
                        .feedback(&text, &label, tag.as_deref(), feedback::unix_millis())
                        .await;
                    if result.is_ok() {
                        cx.clean(&mut doc);
                    }
                    let _ = reply.send(result);
                }
                Command::Stats(reply) => {
                    let _ = reply.send(cx.stats());
                }
            },

            Some(()) = rescan => {
                rescan_at = None;
                let report = cx.clean(&mut doc);
                tracing::debug!(hidden = report.hidden, "Debounced rescan");
                if cx.accept_consent(&mut doc).await {
                    settle_at = Some(Instant::now() + timings.settle);
                }
            }

            Some(()) = settle => {
                settle_at = None;
                cx.clean(&mut doc);
            }

            Some(()) = retry => {
                startup.pop_front();
                if cx.accept_consent(&mut doc).await {
                    settle_at = Some(Instant::now() + timings.settle);
                }
            }

            _ = interval.tick() => {
                let spoofed = guard::spoof_hidden_geometry(&mut doc);
                let halted = guard::halt_hidden_redirect(&host);
                if spoofed > 0 || halted {
                    tracing::debug!(spoofed, halted, "Guard countermeasures ran");
                }
            }
        }
    }
}
