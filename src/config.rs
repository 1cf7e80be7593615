//! TOML configuration parsing and validation.
//!
//! Every field has a default, so an empty file (or no file at all, via
//! [`Config::default`]) yields the timings the pipeline was tuned with.
//! Durations are configured in milliseconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use botbranch_core::chunk::DEFAULT_CHUNK_BUDGET;
use botbranch_core::fingerprint::Fingerprinter;
use botbranch_core::store::DEFAULT_QUOTA_BYTES;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub receive: ReceiveConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
}

/// Scroll harvester phases.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HarvestConfig {
    /// Wait after the first scroll to the top.
    pub initial_settle_ms: u64,
    /// Wait after each phase-1 scroll to the top.
    pub top_settle_ms: u64,
    /// Hard cap on phase-1 iterations.
    pub top_max_iterations: u32,
    /// Consecutive unchanged iterations that end phase 1 and phase 2.
    pub stable_threshold: u32,
    /// Pixels advanced per phase-2 step.
    pub scroll_step: u64,
    /// Wait after each phase-2 step.
    pub sweep_settle_ms: u64,
    /// Hard cap on phase-2 steps.
    pub sweep_max_iterations: u32,
    /// Wait after reaching the bottom in phase 3.
    pub bottom_settle_ms: u64,
    /// Samples taken at the bottom in phase 3.
    pub bottom_samples: u32,
    /// Wait between phase-3 samples.
    pub bottom_sample_interval_ms: u64,
    /// Wait after the phase-4 scroll to the top.
    pub reconcile_top_settle_ms: u64,
    /// Wait after the phase-4 scroll back to the bottom.
    pub reconcile_bottom_settle_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            initial_settle_ms: 600,
            top_settle_ms: 800,
            top_max_iterations: 50,
            stable_threshold: 3,
            scroll_step: 500,
            sweep_settle_ms: 400,
            sweep_max_iterations: 200,
            bottom_settle_ms: 1000,
            bottom_samples: 3,
            bottom_sample_interval_ms: 400,
            reconcile_top_settle_ms: 800,
            reconcile_bottom_settle_ms: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum encoded characters per chunk.
    pub budget: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_CHUNK_BUDGET,
        }
    }
}

/// Replay injector timings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReplayConfig {
    /// Interval between checks for the target input control.
    pub input_poll_interval_ms: u64,
    /// Checks before a part is abandoned for lack of an input control.
    pub input_poll_attempts: u32,
    /// Delay between setting content and pressing Enter.
    pub enter_delay_ms: u64,
    /// Interval between checks for an enabled submit affordance.
    pub submit_poll_interval_ms: u64,
    /// Checks for a submit affordance before giving up on clicking.
    pub submit_poll_attempts: u32,
    /// Interval between checks that the input emptied.
    pub verify_interval_ms: u64,
    /// Checks for an emptied input before assuming the part went out.
    pub verify_attempts: u32,
    /// Wait after a part is done before the next one begins.
    pub post_submit_settle_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input_poll_interval_ms: 500,
            input_poll_attempts: 20,
            enter_delay_ms: 300,
            submit_poll_interval_ms: 300,
            submit_poll_attempts: 15,
            verify_interval_ms: 300,
            verify_attempts: 9,
            post_submit_settle_ms: 1500,
        }
    }
}

/// Receiving-side handoff.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Interval between checks for the input control on page load.
    pub ready_poll_interval_ms: u64,
    /// Checks before the handoff is abandoned.
    pub ready_poll_attempts: u32,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            ready_poll_interval_ms: 500,
            ready_poll_attempts: 40,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file backing the CLI's store.
    pub path: PathBuf,
    /// Capacity of the store, in bytes.
    pub quota_bytes: usize,
    /// Key of the pending-transfer pointer.
    pub pointer_key: String,
    /// Age after which a pending pointer is ignored.
    pub pointer_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./botbranch-store.json"),
            quota_bytes: DEFAULT_QUOTA_BYTES,
            pointer_key: "botbranch_pending".to_string(),
            pointer_ttl_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Append a content digest to every fingerprint.
    pub widen: bool,
}

impl FingerprintConfig {
    pub fn fingerprinter(&self) -> Fingerprinter {
        if self.widen {
            Fingerprinter::widened()
        } else {
            Fingerprinter::standard()
        }
    }
}

impl StorageConfig {
    pub fn pointer_ttl(&self) -> Duration {
        Duration::from_secs(self.pointer_ttl_secs)
    }
}

pub(crate) fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Smallest chunk budget that leaves room for real content after framing.
const MIN_CHUNK_BUDGET: usize = 256;

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        // Validate chunking
        if self.chunking.budget < MIN_CHUNK_BUDGET {
            anyhow::bail!("chunking.budget must be >= {}", MIN_CHUNK_BUDGET);
        }

        // Validate harvest
        let h = &self.harvest;
        if h.stable_threshold == 0 {
            anyhow::bail!("harvest.stable_threshold must be > 0");
        }
        if h.scroll_step == 0 {
            anyhow::bail!("harvest.scroll_step must be > 0");
        }
        if h.top_max_iterations == 0 || h.sweep_max_iterations == 0 {
            anyhow::bail!("harvest iteration caps must be > 0");
        }

        // Validate replay
        let r = &self.replay;
        if r.input_poll_attempts == 0 || r.submit_poll_attempts == 0 || r.verify_attempts == 0 {
            anyhow::bail!("replay poll attempts must be > 0");
        }
        if self.receive.ready_poll_attempts == 0 {
            anyhow::bail!("receive.ready_poll_attempts must be > 0");
        }

        // Validate storage
        if self.storage.pointer_key.trim().is_empty() {
            anyhow::bail!("storage.pointer_key must not be empty");
        }
        if self.storage.quota_bytes == 0 {
            anyhow::bail!("storage.quota_bytes must be > 0");
        }

        Ok(())
    }
}
