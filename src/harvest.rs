//! Scroll harvester and ordering pass.
//!
//! Chat UIs virtualize long transcripts: only turns near the viewport are
//! mounted. The harvester moves the scroll position through four bounded
//! phases and resamples the mounted turns after every move, absorbing each
//! sample into a fingerprint-keyed [`HarvestSet`]. Redundant samples cost
//! nothing because insertion is idempotent.
//!
//! # Algorithm
//!
//! 1. **Top-loading.** Scroll to 0 and resample until neither the scroll
//!    extent nor the set size has changed for `stable_threshold` iterations
//!    in a row, or `top_max_iterations` is reached.
//! 2. **Sweep.** Advance the offset by `scroll_step`, resampling at each
//!    stop, until the offset reaches the (re-measured) extent, the step cap
//!    is hit, or `stable_threshold` steps past the halfway point add nothing.
//! 3. **Bottom settle.** Scroll to the extent and take `bottom_samples`
//!    samples to catch late-mounting turns.
//! 4. **Reconciliation.** One top-then-bottom round trip with a sample at
//!    each end, for lists that mount by scroll direction.
//!
//! Without a scroll container the harvester takes exactly one sample.
//!
//! After harvesting, [`ScrollHarvester::order`] takes one more sample of
//! the mounted turns and sorts the set by the position each fingerprint
//! was seen at (see [`botbranch_core::ordering`]).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

use botbranch_core::codec::contains_replay_marker;
use botbranch_core::dedup::HarvestSet;
use botbranch_core::fingerprint::Fingerprinter;
use botbranch_core::models::Message;
use botbranch_core::ordering::{order_transcript, OrderRanks};

use crate::adapter::{ScrollContainer, SiteAdapter};
use crate::config::{ms, HarvestConfig};
use crate::poll::{await_condition, settle, PollOutcome};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Result of one harvest run followed by the ordering pass.
#[derive(Debug, Clone)]
pub struct HarvestOutcome {
    /// Ordered transcript.
    pub transcript: Vec<Message>,
    /// Number of times the mounted turns were sampled, ordering pass excluded.
    pub samples: u32,
    /// Messages that received a document-order rank.
    pub ranked: usize,
    /// False when no scroll container was found and a single pass was used.
    pub scrolled: bool,
}

pub struct ScrollHarvester<'a> {
    adapter: &'a dyn SiteAdapter,
    config: &'a HarvestConfig,
    fingerprinter: Fingerprinter,
}

impl<'a> ScrollHarvester<'a> {
    pub fn new(
        adapter: &'a dyn SiteAdapter,
        config: &'a HarvestConfig,
        fingerprinter: Fingerprinter,
    ) -> Self {
        Self {
            adapter,
            config,
            fingerprinter,
        }
    }

    /// Harvest, then order.
    pub async fn run(&self, progress: &dyn ProgressReporter) -> HarvestOutcome {
        let (set, samples, scrolled) = self.harvest(progress).await;
        progress.report(&ProgressEvent::Harvested {
            collected: set.len(),
        });
        let (transcript, ranked) = self.order(set).await;
        HarvestOutcome {
            transcript,
            samples,
            ranked,
            scrolled,
        }
    }

    /// Run the harvest phases. Returns the set, the sample count, and
    /// whether a scroll container was driven.
    pub async fn harvest(&self, progress: &dyn ProgressReporter) -> (HarvestSet, u32, bool) {
        let sampler = Sampler::new(self.adapter, self.fingerprinter);

        match self.adapter.scroll_container().await {
            Some(container) => {
                info!(site = %self.adapter.site(), "starting scroll harvest");
                self.load_history(container.as_ref(), &sampler, progress)
                    .await;
                self.sweep(container.as_ref(), &sampler, progress).await;
                self.settle_bottom(container.as_ref(), &sampler, progress)
                    .await;
                self.reconcile(container.as_ref(), &sampler, progress).await;
                let samples = sampler.samples();
                let set = sampler.into_set();
                info!(samples, unique = set.len(), "harvest complete");
                (set, samples, true)
            }
            None => {
                warn!(site = %self.adapter.site(), "no scroll container found, using single-pass harvest");
                sampler.resample().await;
                let samples = sampler.samples();
                (sampler.into_set(), samples, false)
            }
        }
    }

    /// Sort `set` by the document order of the currently mounted turns.
    ///
    /// Returns the ordered transcript and the number of ranked messages.
    pub async fn order(&self, set: HarvestSet) -> (Vec<Message>, usize) {
        let mounted: Vec<Message> =
            harvestable(self.adapter.list_visible_messages().await).collect();
        let ranks = OrderRanks::observe(&mounted, &set);
        debug!(
            ranked = ranks.len(),
            total = set.len(),
            "ordering pass complete"
        );
        (order_transcript(set, &ranks), ranks.len())
    }

    async fn load_history(
        &self,
        container: &dyn ScrollContainer,
        sampler: &Sampler<'_>,
        progress: &dyn ProgressReporter,
    ) {
        let cfg = self.config;
        info!("phase 1: scrolling to top to load older messages");
        container.scroll_to(0).await;
        settle(ms(cfg.initial_settle_ms)).await;
        sampler.resample().await;

        let streak = StableStreak::new(container.scroll_extent().await, sampler.len());
        let iteration = AtomicU32::new(0);
        let (streak, iteration) = (&streak, &iteration);
        let (max, threshold, delay) = (
            cfg.top_max_iterations,
            cfg.stable_threshold,
            ms(cfg.top_settle_ms),
        );

        let outcome = await_condition(
            move || async move {
                let i = iteration.fetch_add(1, Ordering::SeqCst) + 1;
                progress.report(&ProgressEvent::LoadingHistory {
                    iteration: i,
                    max,
                    collected: sampler.len(),
                });
                container.scroll_to(0).await;
                settle(delay).await;
                sampler.resample().await;
                let extent = container.scroll_extent().await;
                (streak.observe(extent, sampler.len()) >= threshold).then_some(i)
            },
            Duration::ZERO,
            max,
        )
        .await;

        match outcome {
            PollOutcome::Satisfied { value, .. } => {
                debug!(iterations = value, "top scroll stabilized")
            }
            PollOutcome::TimedOut => debug!(max, "top scroll hit iteration cap"),
        }
    }

    async fn sweep(
        &self,
        container: &dyn ScrollContainer,
        sampler: &Sampler<'_>,
        progress: &dyn ProgressReporter,
    ) {
        let cfg = self.config;
        info!("phase 2: progressive scroll from top to bottom");
        let start_extent = container.scroll_extent().await;
        let halfway = start_extent / 2;
        let position = AtomicU64::new(0);
        let dry_steps = AtomicU32::new(0);
        let (position, dry_steps) = (&position, &dry_steps);
        let (step, threshold, delay) = (cfg.scroll_step, cfg.stable_threshold, ms(cfg.sweep_settle_ms));

        let outcome = await_condition(
            move || async move {
                let offset = position.fetch_add(step, Ordering::SeqCst) + step;
                progress.report(&ProgressEvent::Scanning {
                    percent: percent_of(offset, start_extent),
                    collected: sampler.len(),
                });
                container.scroll_to(offset).await;
                settle(delay).await;

                let added = sampler.resample().await;
                let dry = if added == 0 {
                    dry_steps.fetch_add(1, Ordering::SeqCst) + 1
                } else {
                    dry_steps.store(0, Ordering::SeqCst);
                    0
                };

                let extent = container.scroll_extent().await;
                if extent > start_extent {
                    debug!(from = start_extent, to = extent, "scroll extent grew");
                }
                if offset >= extent {
                    return Some("reached bottom");
                }
                if dry >= threshold && offset > halfway {
                    return Some("no growth past halfway");
                }
                None
            },
            Duration::ZERO,
            cfg.sweep_max_iterations,
        )
        .await;

        match outcome {
            PollOutcome::Satisfied { value, attempt } => {
                debug!(steps = attempt, reason = value, "sweep complete")
            }
            PollOutcome::TimedOut => debug!(
                max = cfg.sweep_max_iterations,
                "sweep hit iteration cap"
            ),
        }
    }

    async fn settle_bottom(
        &self,
        container: &dyn ScrollContainer,
        sampler: &Sampler<'_>,
        progress: &dyn ProgressReporter,
    ) {
        let cfg = self.config;
        info!("phase 3: final scroll to bottom");
        container.scroll_to(container.scroll_extent().await).await;
        settle(ms(cfg.bottom_settle_ms)).await;

        for pass in 1..=cfg.bottom_samples {
            progress.report(&ProgressEvent::Finalizing {
                pass,
                total: cfg.bottom_samples,
            });
            sampler.resample().await;
            if pass < cfg.bottom_samples {
                settle(ms(cfg.bottom_sample_interval_ms)).await;
            }
        }
    }

    async fn reconcile(
        &self,
        container: &dyn ScrollContainer,
        sampler: &Sampler<'_>,
        progress: &dyn ProgressReporter,
    ) {
        let cfg = self.config;
        info!("phase 4: top-then-bottom reconciliation");
        progress.report(&ProgressEvent::FinalCheck);

        container.scroll_to(0).await;
        settle(ms(cfg.reconcile_top_settle_ms)).await;
        sampler.resample().await;

        container.scroll_to(container.scroll_extent().await).await;
        settle(ms(cfg.reconcile_bottom_settle_ms)).await;
        sampler.resample().await;
    }
}

/// Trim each message and drop empty turns and replayed transfers.
pub fn harvestable(messages: Vec<Message>) -> impl Iterator<Item = Message> {
    messages.into_iter().filter_map(|m| {
        let content = m.content.trim();
        if content.is_empty() || contains_replay_marker(content) {
            return None;
        }
        Some(Message::new(m.role, content))
    })
}

fn percent_of(offset: u64, extent: u64) -> u8 {
    if extent == 0 {
        return 100;
    }
    (offset.saturating_mul(100) / extent).min(100) as u8
}

/// Shared sampling state for one harvest run.
///
/// The set sits behind a mutex only so the phase closures can share it;
/// the lock is never held across an await.
struct Sampler<'a> {
    adapter: &'a dyn SiteAdapter,
    set: Mutex<HarvestSet>,
    samples: AtomicU32,
}

impl<'a> Sampler<'a> {
    fn new(adapter: &'a dyn SiteAdapter, fingerprinter: Fingerprinter) -> Self {
        Self {
            adapter,
            set: Mutex::new(HarvestSet::new(fingerprinter)),
            samples: AtomicU32::new(0),
        }
    }

    /// Sample the mounted turns once. Returns how many were new.
    async fn resample(&self) -> usize {
        let visible = self.adapter.list_visible_messages().await;
        let (added, total) = {
            let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
            let added = set.absorb(harvestable(visible));
            (added, set.len())
        };
        self.samples.fetch_add(1, Ordering::SeqCst);
        if added > 0 {
            debug!(added, total, "harvested new messages");
        }
        added
    }

    fn len(&self) -> usize {
        self.set.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn samples(&self) -> u32 {
        self.samples.load(Ordering::SeqCst)
    }

    fn into_set(self) -> HarvestSet {
        self.set.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

/// Counts consecutive identical (extent, size) observations.
struct StableStreak {
    state: Mutex<((u64, usize), u32)>,
}

impl StableStreak {
    fn new(extent: u64, size: usize) -> Self {
        Self {
            state: Mutex::new(((extent, size), 0)),
        }
    }

    fn observe(&self, extent: u64, size: usize) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.0 == (extent, size) {
            state.1 += 1;
        } else {
            state.0 = (extent, size);
            state.1 = 0;
        }
        state.1
    }
}
