//! Replay injector.
//!
//! Drives a transfer payload into the receiving page's input control one
//! part at a time. Each part walks the same state machine:
//!
//! ```text
//! Idle → AwaitInputReady → ContentSet → AwaitSubmitConfirmed → Done
//! ```
//!
//! Parts are strictly sequential: part N+1 does not start until part N is
//! `Done`. A part whose input control never appears aborts the replay and
//! later parts are not attempted.
//!
//! Submission races an Enter key press against a poll for an enabled send
//! button. Both paths share one `submitted` flag and only the path that
//! claims it first fires. The one exception is an Enter press the page
//! ignored: if the input still holds the part one poll interval after the
//! key press, the button is clicked once it becomes enabled.
//!
//! Chat sites give no "message accepted" callback. An emptied input is the
//! confirmation signal; running out of verification polls is reported as
//! [`PartOutcome::TimedOut`] and treated as delivered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use botbranch_core::codec::{frame_part, Payload};

use crate::adapter::{InputControl, SiteAdapter};
use crate::config::{ms, ReplayConfig};
use crate::poll::{await_condition, settle};
use crate::progress::{ProgressEvent, ProgressReporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    AwaitInputReady,
    ContentSet,
    AwaitSubmitConfirmed,
    Done,
}

/// Which submission path fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPath {
    EnterKey,
    Button,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOutcome {
    /// The input emptied after submission.
    Confirmed,
    /// Verification ran out of attempts; assumed delivered.
    TimedOut,
    /// No input control appeared; the replay stopped here.
    InputMissing,
}

impl PartOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PartOutcome::Confirmed | PartOutcome::TimedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartReport {
    /// Zero-based part index.
    pub index: usize,
    pub outcome: PartOutcome,
    pub submitted_by: Option<SubmitPath>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub total: usize,
    pub parts: Vec<PartReport>,
}

impl ReplayReport {
    pub fn delivered(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| p.outcome.is_delivered())
            .count()
    }

    /// Every part was attempted and delivered.
    pub fn is_complete(&self) -> bool {
        self.delivered() == self.total
    }
}

pub struct ReplayInjector<'a> {
    adapter: &'a dyn SiteAdapter,
    config: &'a ReplayConfig,
    state: Mutex<ReplayState>,
    busy: AtomicBool,
}

impl<'a> ReplayInjector<'a> {
    pub fn new(adapter: &'a dyn SiteAdapter, config: &'a ReplayConfig) -> Self {
        Self {
            adapter,
            config,
            state: Mutex::new(ReplayState::Idle),
            busy: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ReplayState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True while a replay is in flight. UI injection should stand down
    /// while this is set.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Replay every part of `payload` in order.
    pub async fn replay(&self, payload: &Payload, progress: &dyn ProgressReporter) -> ReplayReport {
        self.busy.store(true, Ordering::SeqCst);
        let _busy = BusyGuard(&self.busy);

        let parts = payload.parts();
        let total = parts.len();
        info!(site = %self.adapter.site(), total, "replaying transfer");

        let mut reports = Vec::with_capacity(total);
        for (index, data) in parts.iter().enumerate() {
            progress.report(&ProgressEvent::Replaying {
                part: index + 1,
                total,
            });
            let report = self.replay_part(data, index, total).await;
            let abort = report.outcome == PartOutcome::InputMissing;
            reports.push(report);
            if abort {
                warn!(part = index + 1, total, "input control lost, abandoning remaining parts");
                break;
            }
        }

        let report = ReplayReport {
            total,
            parts: reports,
        };
        info!(
            delivered = report.delivered(),
            total, "replay finished"
        );
        report
    }

    async fn replay_part(&self, data: &str, index: usize, total: usize) -> PartReport {
        let cfg = self.config;
        self.transition(ReplayState::AwaitInputReady);

        let adapter = self.adapter;
        let input = await_condition(
            move || adapter.input_control(),
            ms(cfg.input_poll_interval_ms),
            cfg.input_poll_attempts,
        )
        .await
        .into_option();
        let Some(input) = input else {
            self.transition(ReplayState::Idle);
            return PartReport {
                index,
                outcome: PartOutcome::InputMissing,
                submitted_by: None,
            };
        };
        let input: &dyn InputControl = input.as_ref();

        input.set_text(&frame_part(data, index, total)).await;
        input.notify_changed().await;
        self.transition(ReplayState::ContentSet);

        let submitted_by = self.submit(input).await;
        self.transition(ReplayState::AwaitSubmitConfirmed);

        let emptied = await_condition(
            move || async move { input.text().await.trim().is_empty().then_some(()) },
            ms(cfg.verify_interval_ms),
            cfg.verify_attempts,
        )
        .await;
        let outcome = if emptied.is_satisfied() {
            PartOutcome::Confirmed
        } else {
            debug!(part = index + 1, "input never emptied, assuming sent");
            PartOutcome::TimedOut
        };

        settle(ms(cfg.post_submit_settle_ms)).await;
        self.transition(ReplayState::Done);
        debug!(part = index + 1, ?outcome, ?submitted_by, "part done");

        PartReport {
            index,
            outcome,
            submitted_by,
        }
    }

    /// Race Enter against the send button. Returns the path that fired.
    async fn submit(&self, input: &dyn InputControl) -> Option<SubmitPath> {
        let cfg = self.config;
        let adapter = self.adapter;
        let submitted = AtomicBool::new(false);
        let submitted = &submitted;

        let enter = async move {
            settle(ms(cfg.enter_delay_ms)).await;
            if !claim(submitted) {
                return None;
            }
            input.press_enter().await;
            Some(SubmitPath::EnterKey)
        };

        let enter_seen = AtomicBool::new(false);
        let enter_seen = &enter_seen;

        let button = async move {
            await_condition(
                move || async move {
                    let enter_fired = submitted.load(Ordering::SeqCst);
                    if enter_fired {
                        if input.text().await.trim().is_empty() {
                            return Some(None);
                        }
                        // Give the page one interval to act on the key press.
                        if !enter_seen.swap(true, Ordering::SeqCst) {
                            return None;
                        }
                    }
                    let Some(affordance) = adapter.submit_affordance().await else {
                        return None;
                    };
                    if !affordance.is_enabled().await {
                        return None;
                    }
                    if !enter_fired && !claim(submitted) {
                        return None;
                    }
                    affordance.activate().await;
                    Some(Some(SubmitPath::Button))
                },
                ms(cfg.submit_poll_interval_ms),
                cfg.submit_poll_attempts,
            )
            .await
            .into_option()
            .flatten()
        };

        let (by_enter, by_button) = tokio::join!(enter, button);
        let path = by_button.or(by_enter);
        debug!(?path, "submission fired");
        path
    }

    fn transition(&self, next: ReplayState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug!(from = ?*state, to = ?next, "replay state");
        *state = next;
    }
}

fn claim(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
