//! Receiving-side handoff.
//!
//! On page load the receiver looks for a transfer id in the `bb_id` query
//! parameter. If navigation dropped it, the pending pointer stands in, but
//! only while it is fresh and only when it names this site as the target.
//! Without an id, a `botbranch_prompt` parameter is written into the input
//! control as a plain prefill.
//!
//! A receiver handles at most one handoff per page load. After a replay
//! attempt the payload and pointer are removed whatever the outcome, and
//! the handoff parameters are stripped from the visible URL.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};
use url::Url;

use crate::adapter::SiteAdapter;
use crate::config::{ms, Config};
use crate::error::BranchError;
use crate::gateway::PersistenceGateway;
use crate::poll::await_condition;
use crate::progress::ProgressReporter;
use crate::replay::{ReplayInjector, ReplayReport};

/// Query parameter carrying the transfer id.
pub const ID_PARAM: &str = "bb_id";
/// Query parameter carrying a prompt to prefill.
pub const PROMPT_PARAM: &str = "botbranch_prompt";

/// Handoff parameters read from a page URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handoff {
    pub id: Option<String>,
    pub prompt: Option<String>,
}

impl Handoff {
    pub fn from_url(url: &Url) -> Self {
        let mut handoff = Handoff::default();
        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                ID_PARAM if handoff.id.is_none() => handoff.id = Some(value.into_owned()),
                PROMPT_PARAM if handoff.prompt.is_none() => {
                    handoff.prompt = Some(value.into_owned())
                }
                _ => {}
            }
        }
        handoff
    }
}

/// `url` without the handoff parameters. Other parameters keep their order.
pub fn strip_handoff_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != ID_PARAM && k != PROMPT_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut clean = url.clone();
    if kept.is_empty() {
        clean.set_query(None);
    } else {
        clean.query_pairs_mut().clear().extend_pairs(kept);
    }
    clean
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// No id, no usable pointer, no prompt.
    NothingPending,
    /// This receiver already handled a handoff.
    AlreadyHandled,
    /// The input control never appeared.
    InputNotReady,
    /// A prompt was written into the input control.
    Prefilled,
    /// The id pointed at nothing in the store.
    PayloadMissing { id: String },
    Replayed { id: String, report: ReplayReport },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveReport {
    pub outcome: ReceiveOutcome,
    /// The page URL as it should be shown after the handoff.
    pub url: Url,
}

pub struct Receiver<'a> {
    adapter: &'a dyn SiteAdapter,
    gateway: &'a PersistenceGateway,
    config: &'a Config,
    handled: AtomicBool,
}

impl<'a> Receiver<'a> {
    pub fn new(adapter: &'a dyn SiteAdapter, gateway: &'a PersistenceGateway, config: &'a Config) -> Self {
        Self {
            adapter,
            gateway,
            config,
            handled: AtomicBool::new(false),
        }
    }

    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::SeqCst)
    }

    /// Run the handoff for a page loaded at `page_url`.
    pub async fn receive(
        &self,
        page_url: &Url,
        progress: &dyn ProgressReporter,
    ) -> Result<ReceiveReport, BranchError> {
        if self.handled.swap(true, Ordering::SeqCst) {
            return Ok(ReceiveReport {
                outcome: ReceiveOutcome::AlreadyHandled,
                url: page_url.clone(),
            });
        }

        let handoff = Handoff::from_url(page_url);
        let clean = strip_handoff_params(page_url);
        let report = |outcome: ReceiveOutcome| ReceiveReport {
            outcome,
            url: clean.clone(),
        };

        let id = match handoff.id {
            Some(id) => Some(id),
            None if handoff.prompt.is_none() => self.pending_id().await?,
            None => None,
        };

        if id.is_none() && handoff.prompt.is_none() {
            debug!(site = %self.adapter.site(), "no transfer pending");
            return Ok(report(ReceiveOutcome::NothingPending));
        }

        if !self.await_input().await {
            warn!(site = %self.adapter.site(), "input control never appeared, handoff abandoned");
            return Ok(report(ReceiveOutcome::InputNotReady));
        }

        let Some(id) = id else {
            if let (Some(prompt), Some(input)) = (handoff.prompt, self.adapter.input_control().await) {
                input.set_text(&prompt).await;
                input.notify_changed().await;
                info!(chars = prompt.chars().count(), "prompt prefilled");
            }
            return Ok(report(ReceiveOutcome::Prefilled));
        };

        let Some(payload) = self.gateway.load(&id).await? else {
            warn!(id = %id, "no payload stored for transfer");
            self.gateway.remove_pending_pointer().await?;
            return Ok(report(ReceiveOutcome::PayloadMissing { id }));
        };

        info!(id = %id, parts = payload.part_count(), "received transfer");
        let injector = ReplayInjector::new(self.adapter, &self.config.replay);
        let replay = injector.replay(&payload, progress).await;
        self.gateway.remove_transfer(&id).await?;

        Ok(report(ReceiveOutcome::Replayed { id, report: replay }))
    }

    /// Id from a fresh pointer that targets this site.
    async fn pending_id(&self) -> Result<Option<String>, BranchError> {
        let Some(pointer) = self.gateway.load_pending_pointer().await? else {
            return Ok(None);
        };
        if pointer.target != self.adapter.site() {
            debug!(site = %pointer.target, "pending pointer is for another site");
            return Ok(None);
        }
        debug!(id = %pointer.id, "recovered transfer id from pending pointer");
        Ok(Some(pointer.id))
    }

    async fn await_input(&self) -> bool {
        let adapter = self.adapter;
        await_condition(
            move || async move { adapter.input_control().await.map(|_| ()) },
            ms(self.config.receive.ready_poll_interval_ms),
            self.config.receive.ready_poll_attempts,
        )
        .await
        .is_satisfied()
    }
}
