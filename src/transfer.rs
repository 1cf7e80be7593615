//! Export pipeline: harvest a source page and store the transfer.
//!
//! # Steps
//!
//! 1. Claim the trigger (refused while another export holds it).
//! 2. Harvest and order the transcript ([`crate::harvest`]).
//! 3. If nothing was harvested, use the adapter's fallback extraction.
//! 4. Append the unsent draft in the input control as a `user` message,
//!    unless an identical message is already in the transcript.
//! 5. Chunk, encode, and store the payload plus a pending pointer.
//! 6. Build the handoff URL for the target site.
//!
//! The trigger is restored on every exit path.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use url::Url;

use botbranch_core::chunk::chunk_messages;
use botbranch_core::codec::Payload;
use botbranch_core::models::{Message, PendingTransfer, Site};

use crate::adapter::SiteAdapter;
use crate::config::Config;
use crate::error::BranchError;
use crate::gateway::PersistenceGateway;
use crate::harvest::ScrollHarvester;
use crate::progress::{ProgressEvent, ProgressReporter, TriggerControl, TriggerGuard};
use crate::receive::ID_PARAM;

/// Prefix of every transfer id.
pub const ID_PREFIX: &str = "bb_";

/// What an export stored and where to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub id: String,
    pub source: Site,
    pub target: Site,
    /// Target home URL carrying the transfer id.
    pub url: Url,
    /// Messages across all parts; a split message counts twice.
    pub messages: usize,
    pub parts: usize,
    pub samples: u32,
    pub used_fallback: bool,
    pub appended_draft: bool,
}

pub struct Exporter<'a> {
    adapter: &'a dyn SiteAdapter,
    gateway: &'a PersistenceGateway,
    config: &'a Config,
    trigger: &'a TriggerControl,
}

impl<'a> Exporter<'a> {
    pub fn new(
        adapter: &'a dyn SiteAdapter,
        gateway: &'a PersistenceGateway,
        config: &'a Config,
        trigger: &'a TriggerControl,
    ) -> Self {
        Self {
            adapter,
            gateway,
            config,
            trigger,
        }
    }

    pub async fn export(
        &self,
        target: Site,
        progress: &dyn ProgressReporter,
    ) -> Result<ExportReport, BranchError> {
        let guard = self.trigger.begin().ok_or(BranchError::Busy)?;
        let progress = TriggerReporter {
            guard: &guard,
            inner: progress,
        };
        let result = self.run(target, &progress).await;
        if let Err(e) = &result {
            warn!(error = %e, "export failed");
        }
        result
    }

    async fn run(&self, target: Site, progress: &dyn ProgressReporter) -> Result<ExportReport, BranchError> {
        let source = self.adapter.site();
        progress.report(&ProgressEvent::Started { source, target });

        let harvester = ScrollHarvester::new(
            self.adapter,
            &self.config.harvest,
            self.config.fingerprint.fingerprinter(),
        );
        let outcome = harvester.run(progress).await;
        let mut transcript = outcome.transcript;

        let mut used_fallback = false;
        if transcript.is_empty() {
            warn!("harvest found nothing, falling back to legacy extraction");
            transcript = self.adapter.fallback_messages().await;
            used_fallback = !transcript.is_empty();
        }

        let appended_draft = match self.pending_draft().await {
            Some(draft) if !transcript.iter().any(|m| m.content == draft) => {
                debug!(chars = draft.chars().count(), "appending unsent draft");
                transcript.push(Message::user(draft));
                true
            }
            _ => false,
        };

        if transcript.is_empty() {
            return Err(BranchError::EmptyTranscript);
        }

        let chunks = chunk_messages(&transcript, self.config.chunking.budget);
        let created = Utc::now();
        let payload = Payload::from_chunks(&chunks, created.timestamp_millis())?;
        let id = next_transfer_id(created);
        info!(
            id = %id,
            messages = transcript.len(),
            parts = payload.part_count(),
            "transfer encoded"
        );

        self.gateway.store(&id, &payload).await?;
        let pointer = PendingTransfer::new(id.clone(), target, created);
        if let Err(e) = self.gateway.store_pending_pointer(&pointer).await {
            if let Err(rollback) = self.gateway.remove(&id).await {
                warn!(id = %id, error = %rollback, "failed to remove payload after pointer write failed");
            }
            return Err(e);
        }

        let url = handoff_url(target, &id)?;
        progress.report(&ProgressEvent::Stored {
            id: id.clone(),
            parts: payload.part_count(),
        });

        Ok(ExportReport {
            id,
            source,
            target,
            url,
            messages: chunks.iter().map(|c| c.messages.len()).sum(),
            parts: payload.part_count(),
            samples: outcome.samples,
            used_fallback,
            appended_draft,
        })
    }

    async fn pending_draft(&self) -> Option<String> {
        let input = self.adapter.input_control().await?;
        let text = input.text().await;
        let draft = text.trim();
        (!draft.is_empty()).then(|| draft.to_string())
    }
}

/// Forwards events to the caller's reporter and mirrors them on the trigger label.
struct TriggerReporter<'a, 'g> {
    guard: &'a TriggerGuard<'g>,
    inner: &'a dyn ProgressReporter,
}

impl ProgressReporter for TriggerReporter<'_, '_> {
    fn report(&self, event: &ProgressEvent) {
        self.guard.set_label(event.label());
        self.inner.report(event);
    }
}

static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// `bb_<millis>`, strictly increasing within this process.
pub fn next_transfer_id(now: DateTime<Utc>) -> String {
    let wanted = now.timestamp_millis();
    let mut last = LAST_ID_MILLIS.load(Ordering::SeqCst);
    loop {
        let next = wanted.max(last + 1);
        match LAST_ID_MILLIS.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return format!("{}{}", ID_PREFIX, next),
            Err(actual) => last = actual,
        }
    }
}

/// The target's home URL with the transfer id appended as a query parameter.
pub fn handoff_url(target: Site, id: &str) -> Result<Url, BranchError> {
    let mut url = Url::parse(target.home_url())?;
    url.query_pairs_mut().append_pair(ID_PARAM, id);
    Ok(url)
}
