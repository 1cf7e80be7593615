//! A receiving page that prints what it is sent.
//!
//! Submitting (Enter or the send button) writes the input's text to the
//! sink, records it as a user turn and clears the input, which is exactly
//! the confirmation signal the replay injector waits for. A sink that
//! fails to take the text leaves the input untouched, so the part goes
//! unconfirmed.

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::warn;

use botbranch_core::models::{Message, Site};

use crate::adapter::{InputControl, ScrollContainer, SiteAdapter, SubmitAffordance};

type Sink = Mutex<Box<dyn Write + Send>>;

pub struct ConsoleAdapter {
    site: Site,
    page: Arc<ConsolePage>,
}

struct ConsolePage {
    draft: Mutex<String>,
    submitted: Mutex<Vec<String>>,
    sink: Sink,
}

impl ConsoleAdapter {
    pub fn new(site: Site, sink: Box<dyn Write + Send>) -> Self {
        Self {
            site,
            page: Arc::new(ConsolePage {
                draft: Mutex::new(String::new()),
                submitted: Mutex::new(Vec::new()),
                sink: Mutex::new(sink),
            }),
        }
    }

    pub fn stdout(site: Site) -> Self {
        Self::new(site, Box::new(std::io::stdout()))
    }

    /// Everything submitted so far, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.page
            .submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Current input text.
    pub fn draft(&self) -> String {
        self.page
            .draft
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ConsolePage {
    fn submit(&self) {
        let mut draft = self.draft.lock().unwrap_or_else(|e| e.into_inner());
        if draft.trim().is_empty() {
            return;
        }
        let written = {
            let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
            writeln!(sink, "{}", draft.trim_end()).and_then(|_| sink.flush())
        };
        if let Err(e) = written {
            warn!(error = %e, chars = draft.chars().count(), "failed to write submitted text");
            return;
        }
        let text = std::mem::take(&mut *draft);
        drop(draft);
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text);
    }
}

#[async_trait]
impl SiteAdapter for ConsoleAdapter {
    fn site(&self) -> Site {
        self.site
    }

    async fn list_visible_messages(&self) -> Vec<Message> {
        self.submitted().into_iter().map(Message::user).collect()
    }

    async fn scroll_container(&self) -> Option<Arc<dyn ScrollContainer>> {
        None
    }

    async fn input_control(&self) -> Option<Arc<dyn InputControl>> {
        Some(self.page.clone() as Arc<dyn InputControl>)
    }

    async fn submit_affordance(&self) -> Option<Arc<dyn SubmitAffordance>> {
        Some(self.page.clone() as Arc<dyn SubmitAffordance>)
    }
}

#[async_trait]
impl InputControl for ConsolePage {
    async fn text(&self) -> String {
        self.draft.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn set_text(&self, text: &str) {
        *self.draft.lock().unwrap_or_else(|e| e.into_inner()) = text.to_string();
    }

    async fn notify_changed(&self) {}

    async fn press_enter(&self) {
        self.submit();
    }
}

#[async_trait]
impl SubmitAffordance for ConsolePage {
    async fn is_enabled(&self) -> bool {
        !self.draft.lock().unwrap_or_else(|e| e.into_inner()).trim().is_empty()
    }

    async fn activate(&self) {
        self.submit();
    }
}
