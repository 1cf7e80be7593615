//! Adapter over a saved HTML page.
//!
//! The document is parsed once, up front, and reduced to plain data:
//! `scraper::Html` is not `Send`, so it never crosses an await. A static
//! document has no scroll offset to drive, so [`SiteAdapter::scroll_container`]
//! is always `None` and the harvester takes its single-pass path.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scraper::Html;
use tracing::debug;

use botbranch_core::models::{Message, Site};

use crate::adapter::{InputControl, ScrollContainer, SiteAdapter, SubmitAffordance};

use super::{element_text, extract_fallback, extract_messages, profile, select_first};

pub struct SnapshotAdapter {
    site: Site,
    messages: Vec<Message>,
    fallback: Vec<Message>,
    input: Option<Arc<SnapshotInput>>,
    send: Option<Arc<SnapshotButton>>,
}

impl SnapshotAdapter {
    pub fn parse(site: Site, html: &str) -> Self {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let profile = profile(site);

        let input = select_first(root, profile.input).map(|el| {
            Arc::new(SnapshotInput {
                text: Mutex::new(element_text(el)),
            })
        });
        let send = select_first(root, profile.send).map(|el| {
            Arc::new(SnapshotButton {
                enabled: el.value().attr("disabled").is_none(),
            })
        });

        let adapter = Self {
            site,
            messages: extract_messages(site, &document),
            fallback: extract_fallback(site, &document),
            input,
            send,
        };
        debug!(
            site = %site,
            turns = adapter.messages.len(),
            has_input = adapter.input.is_some(),
            "parsed page snapshot"
        );
        adapter
    }
}

#[async_trait]
impl SiteAdapter for SnapshotAdapter {
    fn site(&self) -> Site {
        self.site
    }

    async fn list_visible_messages(&self) -> Vec<Message> {
        self.messages.clone()
    }

    async fn scroll_container(&self) -> Option<Arc<dyn ScrollContainer>> {
        None
    }

    async fn input_control(&self) -> Option<Arc<dyn InputControl>> {
        self.input
            .clone()
            .map(|input| input as Arc<dyn InputControl>)
    }

    async fn submit_affordance(&self) -> Option<Arc<dyn SubmitAffordance>> {
        self.send
            .clone()
            .map(|send| send as Arc<dyn SubmitAffordance>)
    }

    async fn fallback_messages(&self) -> Vec<Message> {
        self.fallback.clone()
    }
}

/// Input control text as captured in the snapshot.
struct SnapshotInput {
    text: Mutex<String>,
}

#[async_trait]
impl InputControl for SnapshotInput {
    async fn text(&self) -> String {
        self.text.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn set_text(&self, text: &str) {
        *self.text.lock().unwrap_or_else(|e| e.into_inner()) = text.to_string();
    }

    async fn notify_changed(&self) {}

    async fn press_enter(&self) {}
}

struct SnapshotButton {
    enabled: bool,
}

#[async_trait]
impl SubmitAffordance for SnapshotButton {
    async fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn activate(&self) {}
}
