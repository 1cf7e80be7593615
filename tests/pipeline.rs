//! End-to-end tests for the transfer pipeline.
//!
//! A simulated virtualized chat page stands in for a real site: turns are
//! 100px tall, only the ones inside a 500px viewport are mounted, and
//! older history can be loaded lazily each time the page is scrolled to
//! the top. All timings run on tokio's paused clock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use url::Url;

use botbranch::adapter::{InputControl, ScrollContainer, SiteAdapter, SubmitAffordance};
use botbranch::config::{Config, HarvestConfig};
use botbranch::core::chunk::chunk_messages;
use botbranch::core::codec::{Payload, REPLAY_MARKER};
use botbranch::core::models::{Message, PendingTransfer, Site};
use botbranch::core::store::memory::InMemoryStore;
use botbranch::core::store::{KvStore, StoreError};
use botbranch::error::BranchError;
use botbranch::gateway::PersistenceGateway;
use botbranch::harvest::ScrollHarvester;
use botbranch::progress::{
    NoProgress, ProgressEvent, ProgressReporter, TriggerControl, TriggerState, TRIGGER_IDLE_LABEL,
};
use botbranch::receive::{ReceiveOutcome, Receiver};
use botbranch::replay::{PartOutcome, ReplayInjector, ReplayState, SubmitPath};
use botbranch::sites::ConsoleAdapter;
use botbranch::transfer::Exporter;

// ─── Simulated page ─────────────────────────────────────────────────

const TURN_HEIGHT: u64 = 100;
const VIEWPORT: u64 = 500;
const POINTER_KEY: &str = "botbranch_pending";

struct VirtualPage {
    site: Site,
    transcript: Vec<Message>,
    fallback: Vec<Message>,
    unloaded: AtomicUsize,
    load_batch: usize,
    offset: AtomicU64,
    draft: Mutex<String>,
    submitted: Mutex<Vec<String>>,
    has_container: bool,
    has_input: bool,
    has_button: bool,
    accepts_submit: bool,
    accepts_enter: bool,
    button_delay: Duration,
    draft_set_at: Mutex<Option<Instant>>,
    growth: u64,
    measurements: AtomicU64,
}

impl VirtualPage {
    fn new(site: Site, transcript: Vec<Message>) -> Self {
        Self {
            site,
            transcript,
            fallback: Vec::new(),
            unloaded: AtomicUsize::new(0),
            load_batch: 0,
            offset: AtomicU64::new(0),
            draft: Mutex::new(String::new()),
            submitted: Mutex::new(Vec::new()),
            has_container: true,
            has_input: true,
            has_button: true,
            accepts_submit: true,
            accepts_enter: true,
            button_delay: Duration::ZERO,
            draft_set_at: Mutex::new(None),
            growth: 0,
            measurements: AtomicU64::new(0),
        }
    }

    /// Hide the oldest `hidden` turns until the page is scrolled to the top.
    fn lazy(mut self, hidden: usize, batch: usize) -> Self {
        self.unloaded = AtomicUsize::new(hidden);
        self.load_batch = batch;
        self
    }

    fn without_container(mut self) -> Self {
        self.has_container = false;
        self
    }

    fn without_input(mut self) -> Self {
        self.has_input = false;
        self
    }

    fn without_button(mut self) -> Self {
        self.has_button = false;
        self
    }

    fn ignoring_submit(mut self) -> Self {
        self.accepts_submit = false;
        self
    }

    fn ignoring_enter(mut self) -> Self {
        self.accepts_enter = false;
        self
    }

    /// Keep the send button disabled for `delay` after the input changes.
    fn with_button_delay(mut self, delay: Duration) -> Self {
        self.button_delay = delay;
        self
    }

    /// Report a scroll extent `growth` pixels taller on every measurement.
    fn growing(mut self, growth: u64) -> Self {
        self.growth = growth;
        self
    }

    fn with_draft(self, text: &str) -> Self {
        *self.draft.lock().unwrap() = text.to_string();
        self
    }

    fn with_fallback(mut self, fallback: Vec<Message>) -> Self {
        self.fallback = fallback;
        self
    }

    fn mount(self) -> VirtualSite {
        VirtualSite(Arc::new(self))
    }

    fn loaded(&self) -> &[Message] {
        &self.transcript[self.unloaded.load(Ordering::SeqCst)..]
    }

    fn content_height(&self) -> u64 {
        self.loaded().len() as u64 * TURN_HEIGHT
    }

    fn mounted(&self) -> Vec<Message> {
        let loaded = self.loaded();
        if !self.has_container {
            return loaded.to_vec();
        }
        let offset = self.offset.load(Ordering::SeqCst);
        loaded
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let top = *i as u64 * TURN_HEIGHT;
                top < offset + VIEWPORT && top + TURN_HEIGHT > offset
            })
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn submit(&self) {
        if !self.accepts_submit {
            return;
        }
        let text = std::mem::take(&mut *self.draft.lock().unwrap());
        if !text.trim().is_empty() {
            self.submitted.lock().unwrap().push(text);
        }
    }
}

struct VirtualSite(Arc<VirtualPage>);

impl VirtualSite {
    fn submitted(&self) -> Vec<String> {
        self.0.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SiteAdapter for VirtualSite {
    fn site(&self) -> Site {
        self.0.site
    }

    async fn list_visible_messages(&self) -> Vec<Message> {
        self.0.mounted()
    }

    async fn scroll_container(&self) -> Option<Arc<dyn ScrollContainer>> {
        self.0
            .has_container
            .then(|| self.0.clone() as Arc<dyn ScrollContainer>)
    }

    async fn input_control(&self) -> Option<Arc<dyn InputControl>> {
        self.0
            .has_input
            .then(|| self.0.clone() as Arc<dyn InputControl>)
    }

    async fn submit_affordance(&self) -> Option<Arc<dyn SubmitAffordance>> {
        self.0
            .has_button
            .then(|| self.0.clone() as Arc<dyn SubmitAffordance>)
    }

    async fn fallback_messages(&self) -> Vec<Message> {
        self.0.fallback.clone()
    }
}

#[async_trait]
impl ScrollContainer for VirtualPage {
    async fn scroll_extent(&self) -> u64 {
        let measured = self.measurements.fetch_add(1, Ordering::SeqCst) + 1;
        self.content_height() + self.growth * measured
    }

    async fn scroll_to(&self, offset: u64) {
        if offset == 0 {
            let hidden = self.unloaded.load(Ordering::SeqCst);
            self.unloaded
                .store(hidden.saturating_sub(self.load_batch), Ordering::SeqCst);
        }
        let max = self.content_height().saturating_sub(VIEWPORT);
        self.offset.store(offset.min(max), Ordering::SeqCst);
    }
}

#[async_trait]
impl InputControl for VirtualPage {
    async fn text(&self) -> String {
        self.draft.lock().unwrap().clone()
    }

    async fn set_text(&self, text: &str) {
        *self.draft.lock().unwrap() = text.to_string();
        *self.draft_set_at.lock().unwrap() = Some(Instant::now());
    }

    async fn notify_changed(&self) {}

    async fn press_enter(&self) {
        if self.accepts_enter {
            self.submit();
        }
    }
}

#[async_trait]
impl SubmitAffordance for VirtualPage {
    async fn is_enabled(&self) -> bool {
        let ready = self
            .draft_set_at
            .lock()
            .unwrap()
            .map_or(true, |at| at.elapsed() >= self.button_delay);
        ready && !self.draft.lock().unwrap().trim().is_empty()
    }

    async fn activate(&self) {
        self.submit();
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder(Mutex<Vec<ProgressEvent>>);

impl Recorder {
    fn events(&self) -> Vec<ProgressEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl ProgressReporter for Recorder {
    fn report(&self, event: &ProgressEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

/// A store that rejects every write to the pending-pointer key, and
/// optionally every removal.
struct PointerRejectingStore {
    inner: InMemoryStore,
    rejects_remove: bool,
}

impl PointerRejectingStore {
    fn new(rejects_remove: bool) -> Self {
        Self {
            inner: InMemoryStore::new(),
            rejects_remove,
        }
    }
}

#[async_trait]
impl KvStore for PointerRejectingStore {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        if key == POINTER_KEY {
            return Err(StoreError::CapacityExceeded {
                requested: value.len(),
                available: 0,
            });
        }
        self.inner.set(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        if self.rejects_remove {
            return Err(StoreError::Backend("removal refused".to_string()));
        }
        self.inner.remove(keys).await
    }

    async fn bytes_in_use(&self) -> Result<usize, StoreError> {
        self.inner.bytes_in_use().await
    }
}

/// `count` alternating turns, each starting with a unique prefix.
fn conversation(count: usize, chars: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            let mut text = format!("turn {:03}: ", i);
            while text.len() < chars {
                text.push('x');
            }
            if i % 2 == 0 {
                Message::user(text)
            } else {
                Message::assistant(text)
            }
        })
        .collect()
}

fn count(events: &[ProgressEvent], phase: fn(&ProgressEvent) -> bool) -> usize {
    events.iter().filter(|e| phase(e)).count()
}

fn loading_history(e: &ProgressEvent) -> bool {
    matches!(e, ProgressEvent::LoadingHistory { .. })
}

fn scanning(e: &ProgressEvent) -> bool {
    matches!(e, ProgressEvent::Scanning { .. })
}

fn finalizing(e: &ProgressEvent) -> bool {
    matches!(e, ProgressEvent::Finalizing { .. })
}

fn contents(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.content.clone()).collect()
}

fn gateway(store: Arc<dyn KvStore>) -> PersistenceGateway {
    PersistenceGateway::new(store, POINTER_KEY, Duration::from_secs(120))
}

fn payload_of(messages: &[Message]) -> Payload {
    Payload::from_chunks(&chunk_messages(messages, 12_000), 0).unwrap()
}

// ─── Harvest ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_harvest_collects_every_turn_of_virtualized_list() {
    let transcript = conversation(40, 40);
    let site = VirtualPage::new(Site::ChatGpt, transcript.clone()).mount();
    let cfg = Config::default();
    let recorder = Recorder::default();

    let harvester = ScrollHarvester::new(&site, &cfg.harvest, cfg.fingerprint.fingerprinter());
    let outcome = harvester.run(&recorder).await;

    assert!(outcome.scrolled);
    assert_eq!(outcome.transcript.len(), 40);
    assert!(outcome.samples > 8, "expected repeated sampling, got {}", outcome.samples);

    let events = recorder.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::LoadingHistory { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::Scanning { .. })));
    assert!(events.contains(&ProgressEvent::Finalizing { pass: 3, total: 3 }));
    assert!(events.contains(&ProgressEvent::FinalCheck));
    assert!(events.contains(&ProgressEvent::Harvested { collected: 40 }));
}

#[tokio::test(start_paused = true)]
async fn test_ordering_ranks_mounted_window_first() {
    let transcript = conversation(40, 40);
    let site = VirtualPage::new(Site::ChatGpt, transcript.clone()).mount();
    let cfg = Config::default();

    let harvester = ScrollHarvester::new(&site, &cfg.harvest, cfg.fingerprint.fingerprinter());
    let outcome = harvester.run(&NoProgress).await;

    // The harvest ends at the bottom, so the last five turns are the only
    // ones mounted during the ordering pass. Everything else keeps the
    // top-down harvest order behind them.
    let mut expected = contents(&transcript[35..]);
    expected.extend(contents(&transcript[..35]));
    assert_eq!(outcome.ranked, 5);
    assert_eq!(contents(&outcome.transcript), expected);
}

#[tokio::test(start_paused = true)]
async fn test_harvest_loads_lazy_history_from_top() {
    let transcript = conversation(40, 40);
    let site = VirtualPage::new(Site::Gemini, transcript.clone())
        .lazy(20, 5)
        .mount();
    let cfg = Config::default();

    let harvester = ScrollHarvester::new(&site, &cfg.harvest, cfg.fingerprint.fingerprinter());
    let (set, _, scrolled) = harvester.harvest(&NoProgress).await;

    assert!(scrolled);
    let mut got = contents(set.values());
    got.sort();
    assert_eq!(got, contents(&transcript));
}

#[tokio::test(start_paused = true)]
async fn test_harvest_of_short_static_list_stops_at_each_phase_minimum() {
    let transcript = conversation(3, 20);
    let site = VirtualPage::new(Site::ChatGpt, transcript.clone()).mount();
    let cfg = Config::default();
    let recorder = Recorder::default();

    let harvester = ScrollHarvester::new(&site, &cfg.harvest, cfg.fingerprint.fingerprinter());
    let outcome = harvester.run(&recorder).await;

    // 1 + 3 while loading history, 1 sweep step, 3 at the bottom, 2 to reconcile.
    assert_eq!(outcome.samples, 10);
    assert_eq!(outcome.transcript, transcript);

    let events = recorder.events();
    assert_eq!(count(&events, loading_history), 3);
    assert_eq!(count(&events, scanning), 1);
    assert_eq!(count(&events, finalizing), 3);
    assert_eq!(count(&events, |e| *e == ProgressEvent::FinalCheck), 1);
}

#[tokio::test(start_paused = true)]
async fn test_harvest_of_growing_extent_is_bounded() {
    let transcript = conversation(3, 20);
    let site = VirtualPage::new(Site::Gemini, transcript.clone())
        .growing(1_000)
        .mount();
    let cfg = Config::default();
    let recorder = Recorder::default();

    let harvester = ScrollHarvester::new(&site, &cfg.harvest, cfg.fingerprint.fingerprinter());
    let outcome = harvester.run(&recorder).await;
    assert_eq!(outcome.transcript, transcript);

    // The extent never settles, so loading history runs to its cap.
    let events = recorder.events();
    assert_eq!(count(&events, loading_history), 50);
    assert!(events.contains(&ProgressEvent::LoadingHistory {
        iteration: 50,
        max: 50,
        collected: 3
    }));

    // The sweep starts against a 52_300px extent and never catches the
    // growing bottom. Every step is dry, so it stops at the first step
    // past the 26_150px halfway mark.
    assert_eq!(count(&events, scanning), 53);
    assert_eq!(outcome.samples, 1 + 50 + 53 + 3 + 2);
}

#[tokio::test(start_paused = true)]
async fn test_harvest_sweep_stops_at_iteration_cap() {
    let transcript = conversation(100, 20);
    let site = VirtualPage::new(Site::DeepSeek, transcript.clone()).mount();
    let mut cfg = Config::default();
    cfg.harvest = HarvestConfig {
        sweep_max_iterations: 4,
        ..HarvestConfig::default()
    };
    let recorder = Recorder::default();

    let harvester = ScrollHarvester::new(&site, &cfg.harvest, cfg.fingerprint.fingerprinter());
    let (set, samples, scrolled) = harvester.harvest(&recorder).await;

    assert!(scrolled);
    assert_eq!(count(&recorder.events(), scanning), 4);
    assert_eq!(samples, 4 + 4 + 3 + 2);

    // Four 500px steps reach turn 24; the bottom passes add the last five.
    let mut expected = contents(&transcript[..25]);
    expected.extend(contents(&transcript[95..]));
    let mut got = contents(set.values());
    got.sort();
    assert_eq!(got, expected);
}

#[tokio::test(start_paused = true)]
async fn test_harvest_without_container_takes_one_sample() {
    let transcript = conversation(6, 20);
    let site = VirtualPage::new(Site::DeepSeek, transcript.clone())
        .without_container()
        .mount();
    let cfg = Config::default();

    let harvester = ScrollHarvester::new(&site, &cfg.harvest, cfg.fingerprint.fingerprinter());
    let outcome = harvester.run(&NoProgress).await;

    assert!(!outcome.scrolled);
    assert_eq!(outcome.samples, 1);
    assert_eq!(outcome.transcript, transcript);
}

#[tokio::test(start_paused = true)]
async fn test_harvest_skips_replayed_parts_and_blank_turns() {
    let transcript = vec![
        Message::user("original question"),
        Message::user(format!("{} PART 1/2 START]\n<start_botbranch)>[]", REPLAY_MARKER)),
        Message::assistant("   "),
        Message::assistant("answer"),
    ];
    let site = VirtualPage::new(Site::ChatGpt, transcript)
        .without_container()
        .mount();
    let cfg = Config::default();

    let harvester = ScrollHarvester::new(&site, &cfg.harvest, cfg.fingerprint.fingerprinter());
    let outcome = harvester.run(&NoProgress).await;
    assert_eq!(
        outcome.transcript,
        vec![Message::user("original question"), Message::assistant("answer")]
    );
}

// ─── Export ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_export_short_transcript_stores_single_part() {
    let site = VirtualPage::new(Site::ChatGpt, conversation(3, 30))
        .without_container()
        .mount();
    let store = Arc::new(InMemoryStore::new());
    let gw = gateway(store.clone());
    let cfg = Config::default();
    let trigger = TriggerControl::new();
    let recorder = Recorder::default();

    let report = Exporter::new(&site, &gw, &cfg, &trigger)
        .export(Site::Gemini, &recorder)
        .await
        .unwrap();

    assert!(report.id.starts_with("bb_"));
    assert_eq!(report.parts, 1);
    assert_eq!(report.messages, 3);
    assert_eq!(
        report.url.as_str(),
        format!("https://gemini.google.com/app?bb_id={}", report.id)
    );

    let payload = gw.load(&report.id).await.unwrap().unwrap();
    assert!(!payload.is_multi_part());
    assert_eq!(payload.decode_messages().unwrap(), conversation(3, 30));

    let pointer = gw.load_pending_pointer().await.unwrap().unwrap();
    assert_eq!(pointer.id, report.id);
    assert_eq!(pointer.target, Site::Gemini);

    let events = recorder.events();
    assert_eq!(
        events.first(),
        Some(&ProgressEvent::Started {
            source: Site::ChatGpt,
            target: Site::Gemini
        })
    );
    assert!(matches!(events.last(), Some(ProgressEvent::Stored { parts: 1, .. })));
    assert_eq!(trigger.state().label, TRIGGER_IDLE_LABEL);
}

#[tokio::test(start_paused = true)]
async fn test_export_long_transcript_is_chunked() {
    let transcript = conversation(50, 500);
    let site = VirtualPage::new(Site::DeepSeek, transcript.clone()).mount();
    let gw = gateway(Arc::new(InMemoryStore::new()));
    let cfg = Config::default();
    let trigger = TriggerControl::new();

    let report = Exporter::new(&site, &gw, &cfg, &trigger)
        .export(Site::ChatGpt, &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.parts, 3);
    assert_eq!(report.messages, 50);

    let payload = gw.load(&report.id).await.unwrap().unwrap();
    assert!(payload.is_multi_part());
    for part in payload.parts() {
        assert!(part.chars().count() <= cfg.chunking.budget);
    }
    let mut got = contents(&payload.decode_messages().unwrap());
    got.sort();
    assert_eq!(got, contents(&transcript));
}

#[tokio::test(start_paused = true)]
async fn test_export_splits_oversized_message() {
    let huge = "y".repeat(20_000);
    let site = VirtualPage::new(Site::ChatGpt, vec![Message::user(huge.clone())])
        .without_container()
        .mount();
    let gw = gateway(Arc::new(InMemoryStore::new()));
    let cfg = Config::default();
    let trigger = TriggerControl::new();

    let report = Exporter::new(&site, &gw, &cfg, &trigger)
        .export(Site::Gemini, &NoProgress)
        .await
        .unwrap();
    assert_eq!(report.parts, 2);
    assert_eq!(report.messages, 2);

    let messages = gw
        .load(&report.id)
        .await
        .unwrap()
        .unwrap()
        .decode_messages()
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].char_len(), 10_000);
    assert_eq!(format!("{}{}", messages[0].content, messages[1].content), huge);
}

#[tokio::test(start_paused = true)]
async fn test_export_appends_unsent_draft() {
    let site = VirtualPage::new(Site::ChatGpt, conversation(2, 30))
        .without_container()
        .with_draft("  and what about async?  ")
        .mount();
    let gw = gateway(Arc::new(InMemoryStore::new()));
    let cfg = Config::default();
    let trigger = TriggerControl::new();

    let report = Exporter::new(&site, &gw, &cfg, &trigger)
        .export(Site::DeepSeek, &NoProgress)
        .await
        .unwrap();
    assert!(report.appended_draft);

    let messages = gw
        .load(&report.id)
        .await
        .unwrap()
        .unwrap()
        .decode_messages()
        .unwrap();
    assert_eq!(messages.last(), Some(&Message::user("and what about async?")));
}

#[tokio::test(start_paused = true)]
async fn test_export_uses_fallback_when_harvest_is_empty() {
    let site = VirtualPage::new(Site::ChatGpt, Vec::new())
        .with_fallback(vec![Message::system("whole page text")])
        .mount();
    let gw = gateway(Arc::new(InMemoryStore::new()));
    let cfg = Config::default();
    let trigger = TriggerControl::new();

    let report = Exporter::new(&site, &gw, &cfg, &trigger)
        .export(Site::Gemini, &NoProgress)
        .await
        .unwrap();
    assert!(report.used_fallback);
    assert_eq!(report.messages, 1);
}

#[tokio::test(start_paused = true)]
async fn test_export_empty_page_fails_and_restores_trigger() {
    let site = VirtualPage::new(Site::Gemini, Vec::new()).mount();
    let store = Arc::new(InMemoryStore::new());
    let gw = gateway(store.clone());
    let cfg = Config::default();
    let trigger = TriggerControl::new();

    let err = Exporter::new(&site, &gw, &cfg, &trigger)
        .export(Site::ChatGpt, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, BranchError::EmptyTranscript));
    assert!(store.keys().is_empty());
    assert_eq!(
        trigger.state(),
        TriggerState {
            label: TRIGGER_IDLE_LABEL.to_string(),
            enabled: true
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_export_capacity_error_restores_trigger() {
    let site = VirtualPage::new(Site::ChatGpt, conversation(10, 200))
        .without_container()
        .mount();
    let gw = gateway(Arc::new(InMemoryStore::with_quota(64)));
    let cfg = Config::default();
    let trigger = TriggerControl::new();

    let err = Exporter::new(&site, &gw, &cfg, &trigger)
        .export(Site::Gemini, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, BranchError::CapacityExceeded { .. }));
    assert!(err.user_message().contains("too MASSIVE"));
    assert!(!trigger.is_busy());
    assert_eq!(trigger.state().label, TRIGGER_IDLE_LABEL);
}

#[tokio::test(start_paused = true)]
async fn test_export_invalidated_context_is_reported() {
    let site = VirtualPage::new(Site::ChatGpt, conversation(2, 30))
        .without_container()
        .mount();
    let store = Arc::new(InMemoryStore::new());
    store.invalidate();
    let gw = gateway(store);
    let cfg = Config::default();
    let trigger = TriggerControl::new();

    let err = Exporter::new(&site, &gw, &cfg, &trigger)
        .export(Site::Gemini, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, BranchError::ContextInvalidated));
    assert!(err.user_message().contains("REFRESH"));
    assert!(!trigger.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_export_removes_payload_when_pointer_write_fails() {
    let site = VirtualPage::new(Site::ChatGpt, conversation(2, 30))
        .without_container()
        .mount();
    let store = Arc::new(PointerRejectingStore::new(false));
    let gw = gateway(store.clone());
    let cfg = Config::default();
    let trigger = TriggerControl::new();

    let err = Exporter::new(&site, &gw, &cfg, &trigger)
        .export(Site::Gemini, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, BranchError::CapacityExceeded { .. }));
    assert!(store.inner.keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_export_reports_pointer_error_when_rollback_also_fails() {
    let site = VirtualPage::new(Site::ChatGpt, conversation(2, 30))
        .without_container()
        .mount();
    let store = Arc::new(PointerRejectingStore::new(true));
    let gw = gateway(store.clone());
    let cfg = Config::default();
    let trigger = TriggerControl::new();

    let err = Exporter::new(&site, &gw, &cfg, &trigger)
        .export(Site::Gemini, &NoProgress)
        .await
        .unwrap_err();

    // The pointer failure is what the caller sees; the orphaned payload
    // is left behind and logged.
    assert!(matches!(err, BranchError::CapacityExceeded { .. }));
    let keys = store.inner.keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("bb_"));
    assert!(!trigger.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_export_refused_while_trigger_is_held() {
    let site = VirtualPage::new(Site::ChatGpt, conversation(2, 30))
        .without_container()
        .mount();
    let gw = gateway(Arc::new(InMemoryStore::new()));
    let cfg = Config::default();
    let trigger = TriggerControl::new();

    let _held = trigger.begin().unwrap();
    let err = Exporter::new(&site, &gw, &cfg, &trigger)
        .export(Site::Gemini, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, BranchError::Busy));
}

// ─── Replay ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_replay_prefers_enabled_send_button() {
    let site = VirtualPage::new(Site::Gemini, Vec::new()).mount();
    let cfg = Config::default();
    let payload = payload_of(&conversation(50, 500));

    let injector = ReplayInjector::new(&site, &cfg.replay);
    let report = injector.replay(&payload, &NoProgress).await;

    assert_eq!(report.total, 3);
    assert!(report.is_complete());
    for (i, part) in report.parts.iter().enumerate() {
        assert_eq!(part.index, i);
        assert_eq!(part.outcome, PartOutcome::Confirmed);
        assert_eq!(part.submitted_by, Some(SubmitPath::Button));
    }

    // One submission per part, in order, each framed.
    let submitted = site.submitted();
    assert_eq!(submitted.len(), 3);
    for (i, text) in submitted.iter().enumerate() {
        assert!(text.starts_with(&format!("{} PART {}/3 START]", REPLAY_MARKER, i + 1)));
    }
    assert_eq!(injector.state(), ReplayState::Done);
    assert!(!injector.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_replay_falls_back_to_enter_without_button() {
    let site = VirtualPage::new(Site::ChatGpt, Vec::new())
        .without_button()
        .mount();
    let cfg = Config::default();
    let payload = payload_of(&conversation(2, 30));

    let report = ReplayInjector::new(&site, &cfg.replay)
        .replay(&payload, &NoProgress)
        .await;

    assert_eq!(report.total, 1);
    assert_eq!(report.parts[0].submitted_by, Some(SubmitPath::EnterKey));
    assert_eq!(report.parts[0].outcome, PartOutcome::Confirmed);

    let submitted = site.submitted();
    assert_eq!(submitted.len(), 1);
    assert!(submitted[0].starts_with(&format!("{} START]", REPLAY_MARKER)));
}

#[tokio::test(start_paused = true)]
async fn test_replay_clicks_late_button_when_enter_is_ignored() {
    let site = VirtualPage::new(Site::Gemini, Vec::new())
        .ignoring_enter()
        .with_button_delay(Duration::from_millis(600))
        .mount();
    let cfg = Config::default();
    let payload = payload_of(&conversation(2, 30));

    let report = ReplayInjector::new(&site, &cfg.replay)
        .replay(&payload, &NoProgress)
        .await;

    assert_eq!(report.parts[0].submitted_by, Some(SubmitPath::Button));
    assert_eq!(report.parts[0].outcome, PartOutcome::Confirmed);
    assert_eq!(site.submitted().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_replay_late_button_stands_down_after_enter_submits() {
    let site = VirtualPage::new(Site::ChatGpt, Vec::new())
        .with_button_delay(Duration::from_millis(600))
        .mount();
    let cfg = Config::default();
    let payload = payload_of(&conversation(2, 30));

    let report = ReplayInjector::new(&site, &cfg.replay)
        .replay(&payload, &NoProgress)
        .await;

    assert_eq!(report.parts[0].submitted_by, Some(SubmitPath::EnterKey));
    assert_eq!(report.parts[0].outcome, PartOutcome::Confirmed);
    assert_eq!(site.submitted().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_replay_treats_unconfirmed_submit_as_delivered() {
    let site = VirtualPage::new(Site::DeepSeek, Vec::new())
        .ignoring_submit()
        .mount();
    let cfg = Config::default();
    let payload = payload_of(&conversation(2, 30));

    let report = ReplayInjector::new(&site, &cfg.replay)
        .replay(&payload, &NoProgress)
        .await;

    assert_eq!(report.parts[0].outcome, PartOutcome::TimedOut);
    assert_eq!(report.delivered(), 1);
    assert!(site.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_replay_aborts_when_input_never_appears() {
    let site = VirtualPage::new(Site::Gemini, Vec::new())
        .without_input()
        .mount();
    let cfg = Config::default();
    let payload = payload_of(&conversation(50, 500));

    let report = ReplayInjector::new(&site, &cfg.replay)
        .replay(&payload, &NoProgress)
        .await;

    assert_eq!(report.total, 3);
    assert_eq!(report.parts.len(), 1);
    assert_eq!(report.parts[0].outcome, PartOutcome::InputMissing);
    assert_eq!(report.delivered(), 0);
    assert!(site.submitted().is_empty());
}

// ─── Receive ────────────────────────────────────────────────────────

async fn export_to(target: Site, gw: &PersistenceGateway, transcript: Vec<Message>) -> Url {
    let site = VirtualPage::new(Site::ChatGpt, transcript)
        .without_container()
        .mount();
    let cfg = Config::default();
    let trigger = TriggerControl::new();
    Exporter::new(&site, gw, &cfg, &trigger)
        .export(target, &NoProgress)
        .await
        .unwrap()
        .url
}

#[tokio::test(start_paused = true)]
async fn test_export_then_receive_end_to_end() {
    let store = Arc::new(InMemoryStore::new());
    let gw = gateway(store.clone());
    let transcript = conversation(50, 500);
    let url = export_to(Site::Gemini, &gw, transcript).await;

    let console = ConsoleAdapter::new(Site::Gemini, Box::new(std::io::sink()));
    let cfg = Config::default();
    let recorder = Recorder::default();
    let receiver = Receiver::new(&console, &gw, &cfg);
    let report = receiver.receive(&url, &recorder).await.unwrap();

    let ReceiveOutcome::Replayed { report: replay, .. } = &report.outcome else {
        panic!("expected a replay, got {:?}", report.outcome);
    };
    assert!(replay.is_complete());
    assert_eq!(replay.total, 3);
    assert_eq!(report.url.as_str(), "https://gemini.google.com/app");

    let submitted = console.submitted();
    assert_eq!(submitted.len(), 3);
    assert!(submitted[2].contains("Now that you have all parts"));
    assert!(recorder
        .events()
        .contains(&ProgressEvent::Replaying { part: 3, total: 3 }));

    // Payload and pointer are consumed.
    assert!(store.keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_receive_recovers_id_from_pointer() {
    let gw = gateway(Arc::new(InMemoryStore::new()));
    let exported = export_to(Site::DeepSeek, &gw, conversation(3, 30)).await;
    let id = exported
        .query_pairs()
        .find(|(k, _)| k == "bb_id")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let console = ConsoleAdapter::new(Site::DeepSeek, Box::new(std::io::sink()));
    let cfg = Config::default();
    let page = Url::parse("https://chat.deepseek.com/").unwrap();
    let report = Receiver::new(&console, &gw, &cfg)
        .receive(&page, &NoProgress)
        .await
        .unwrap();

    assert!(matches!(
        report.outcome,
        ReceiveOutcome::Replayed { id: ref got, .. } if *got == id
    ));
    assert_eq!(console.submitted().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_receive_ignores_pointer_for_other_site() {
    let gw = gateway(Arc::new(InMemoryStore::new()));
    export_to(Site::Gemini, &gw, conversation(3, 30)).await;

    let console = ConsoleAdapter::new(Site::DeepSeek, Box::new(std::io::sink()));
    let cfg = Config::default();
    let page = Url::parse("https://chat.deepseek.com/").unwrap();
    let report = Receiver::new(&console, &gw, &cfg)
        .receive(&page, &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.outcome, ReceiveOutcome::NothingPending);
    assert!(console.submitted().is_empty());
    assert!(gw.load_pending_pointer_raw().await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_receive_ignores_expired_pointer() {
    let gw = gateway(Arc::new(InMemoryStore::new()));
    gw.store("bb_1", &payload_of(&conversation(2, 30)))
        .await
        .unwrap();
    let created = Utc::now() - chrono::Duration::minutes(5);
    gw.store_pending_pointer(&PendingTransfer::new("bb_1", Site::ChatGpt, created))
        .await
        .unwrap();

    let console = ConsoleAdapter::new(Site::ChatGpt, Box::new(std::io::sink()));
    let cfg = Config::default();
    let page = Url::parse("https://chatgpt.com/").unwrap();
    let report = Receiver::new(&console, &gw, &cfg)
        .receive(&page, &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.outcome, ReceiveOutcome::NothingPending);
    assert!(gw.load("bb_1").await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_receive_missing_payload_clears_pointer() {
    let gw = gateway(Arc::new(InMemoryStore::new()));
    gw.store_pending_pointer(&PendingTransfer::new("bb_404", Site::Gemini, Utc::now()))
        .await
        .unwrap();

    let console = ConsoleAdapter::new(Site::Gemini, Box::new(std::io::sink()));
    let cfg = Config::default();
    let page = Url::parse("https://gemini.google.com/app?bb_id=bb_404").unwrap();
    let report = Receiver::new(&console, &gw, &cfg)
        .receive(&page, &NoProgress)
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        ReceiveOutcome::PayloadMissing {
            id: "bb_404".to_string()
        }
    );
    assert!(gw.load_pending_pointer_raw().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_receive_prefills_prompt() {
    let gw = gateway(Arc::new(InMemoryStore::new()));
    let console = ConsoleAdapter::new(Site::ChatGpt, Box::new(std::io::sink()));
    let cfg = Config::default();
    let page = Url::parse("https://chatgpt.com/?botbranch_prompt=Summarize%20this&model=4").unwrap();

    let report = Receiver::new(&console, &gw, &cfg)
        .receive(&page, &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.outcome, ReceiveOutcome::Prefilled);
    assert_eq!(console.draft(), "Summarize this");
    assert!(console.submitted().is_empty());
    assert_eq!(report.url.as_str(), "https://chatgpt.com/?model=4");
}

#[tokio::test(start_paused = true)]
async fn test_receive_gives_up_without_input() {
    let gw = gateway(Arc::new(InMemoryStore::new()));
    gw.store("bb_5", &payload_of(&conversation(2, 30)))
        .await
        .unwrap();
    let site = VirtualPage::new(Site::Gemini, Vec::new())
        .without_input()
        .mount();
    let cfg = Config::default();
    let page = Url::parse("https://gemini.google.com/app?bb_id=bb_5").unwrap();

    let report = Receiver::new(&site, &gw, &cfg)
        .receive(&page, &NoProgress)
        .await
        .unwrap();
    assert_eq!(report.outcome, ReceiveOutcome::InputNotReady);
    assert!(gw.load("bb_5").await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_receiver_handles_one_handoff_per_page() {
    let gw = gateway(Arc::new(InMemoryStore::new()));
    let url = export_to(Site::Gemini, &gw, conversation(3, 30)).await;

    let console = ConsoleAdapter::new(Site::Gemini, Box::new(std::io::sink()));
    let cfg = Config::default();
    let receiver = Receiver::new(&console, &gw, &cfg);

    let first = receiver.receive(&url, &NoProgress).await.unwrap();
    assert!(matches!(first.outcome, ReceiveOutcome::Replayed { .. }));
    assert!(receiver.is_handled());

    let second = receiver.receive(&url, &NoProgress).await.unwrap();
    assert_eq!(second.outcome, ReceiveOutcome::AlreadyHandled);
    assert_eq!(console.submitted().len(), 1);
}
