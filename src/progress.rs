//! Export and replay progress reporting.
//!
//! Two channels carry progress. A [`ProgressReporter`] writes events to
//! **stderr** (human or JSON lines) so stdout stays parseable for scripts.
//! The [`TriggerControl`] models the branch button itself: its label tracks
//! the current phase while an export runs, and it is always restored to
//! its idle label and re-enabled when the export ends, whether it
//! succeeded or failed.

use std::io::Write;
use std::sync::Mutex;

use botbranch_core::models::Site;

/// Label shown on the trigger when no export is running.
pub const TRIGGER_IDLE_LABEL: &str = "Branch";

/// A single progress event from the export or replay pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Export requested; nothing sampled yet.
    Started { source: Site, target: Site },
    /// Phase 1 iteration `iteration` of `max`.
    LoadingHistory {
        iteration: u32,
        max: u32,
        collected: usize,
    },
    /// Phase 2 sweep position as a percentage of the scroll extent.
    Scanning { percent: u8, collected: usize },
    /// Phase 3 bottom sample `pass` of `total`.
    Finalizing { pass: u32, total: u32 },
    /// Phase 4 round trip.
    FinalCheck,
    /// Harvest finished with `collected` unique messages.
    Harvested { collected: usize },
    /// Payload and pointer written under `id`.
    Stored { id: String, parts: usize },
    /// Replaying part `part` (1-based) of `total` on the receiving page.
    Replaying { part: usize, total: usize },
}

impl ProgressEvent {
    /// Trigger label for this event.
    pub fn label(&self) -> String {
        match self {
            ProgressEvent::Started { .. } => "↺ Loading...".to_string(),
            ProgressEvent::LoadingHistory {
                iteration,
                max,
                collected,
            } => format!("↺ Phase 1: {}/{} ({} msgs)", iteration, max, collected),
            ProgressEvent::Scanning { percent, collected } => {
                format!("↺ Phase 2: {}% ({} msgs)", percent, collected)
            }
            ProgressEvent::Finalizing { pass, total } => {
                format!("↺ Phase 3: Final pass {}/{}", pass, total)
            }
            ProgressEvent::FinalCheck => "↺ Phase 4: Final check...".to_string(),
            ProgressEvent::Harvested { collected } => {
                format!("✓ {} messages", format_number(*collected as u64))
            }
            ProgressEvent::Stored { parts, .. } => format!("✓ Stored {} part(s)", parts),
            ProgressEvent::Replaying { part, total } => {
                format!("↺ Sending part {}/{}", part, total)
            }
        }
    }
}

/// Reports pipeline progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Human-friendly progress on stderr: "branch  ↺ Phase 2: 40% (12 msgs)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: &ProgressEvent) {
        let line = match event {
            ProgressEvent::Started { source, target } => format!(
                "branch {} -> {}  {}\n",
                source.display_name(),
                target.display_name(),
                event.label()
            ),
            ProgressEvent::Stored { id, .. } => format!("branch  {}  ({})\n", event.label(), id),
            _ => format!("branch  {}\n", event.label()),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: &ProgressEvent) {
        let obj = match event {
            ProgressEvent::Started { source, target } => serde_json::json!({
                "event": "started",
                "source": source,
                "target": target
            }),
            ProgressEvent::LoadingHistory {
                iteration,
                max,
                collected,
            } => serde_json::json!({
                "event": "progress",
                "phase": "loading_history",
                "n": iteration,
                "total": max,
                "collected": collected
            }),
            ProgressEvent::Scanning { percent, collected } => serde_json::json!({
                "event": "progress",
                "phase": "scanning",
                "percent": percent,
                "collected": collected
            }),
            ProgressEvent::Finalizing { pass, total } => serde_json::json!({
                "event": "progress",
                "phase": "finalizing",
                "n": pass,
                "total": total
            }),
            ProgressEvent::FinalCheck => serde_json::json!({
                "event": "progress",
                "phase": "final_check"
            }),
            ProgressEvent::Harvested { collected } => serde_json::json!({
                "event": "harvested",
                "collected": collected
            }),
            ProgressEvent::Stored { id, parts } => serde_json::json!({
                "event": "stored",
                "id": id,
                "parts": parts
            }),
            ProgressEvent::Replaying { part, total } => serde_json::json!({
                "event": "replaying",
                "n": part,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "unknown progress mode '{}'. Must be off, human, or json.",
                other
            )),
        }
    }
}

/// Observable state of the branch trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerState {
    pub label: String,
    pub enabled: bool,
}

/// The branch button.
///
/// [`TriggerControl::begin`] disables it and hands out a guard; dropping the
/// guard restores [`TRIGGER_IDLE_LABEL`] and re-enables it. A second
/// `begin` while a guard is alive is refused, so one trigger never runs two
/// exports at once.
pub struct TriggerControl {
    state: Mutex<TriggerState>,
}

impl TriggerControl {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TriggerState {
                label: TRIGGER_IDLE_LABEL.to_string(),
                enabled: true,
            }),
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// True while an export holds the trigger.
    pub fn is_busy(&self) -> bool {
        !self.state().enabled
    }

    pub fn begin(&self) -> Option<TriggerGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.enabled {
            return None;
        }
        state.enabled = false;
        Some(TriggerGuard { control: self })
    }

    fn set_label(&self, label: String) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).label = label;
    }
}

impl Default for TriggerControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the duration of one export.
pub struct TriggerGuard<'a> {
    control: &'a TriggerControl,
}

impl TriggerGuard<'_> {
    pub fn set_label(&self, label: impl Into<String>) {
        self.control.set_label(label.into());
    }
}

impl Drop for TriggerGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.control.state.lock().unwrap_or_else(|e| e.into_inner());
        state.label = TRIGGER_IDLE_LABEL.to_string();
        state.enabled = true;
    }
}
