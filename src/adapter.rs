//! Page capabilities the pipeline depends on.
//!
//! A [`SiteAdapter`] is everything the harvester, injector and receiver
//! know about a chat site: how to list the messages currently mounted,
//! and how to reach the scroll container, the input control and the
//! submit affordance. None of the pipeline code touches markup directly.
//!
//! Handles are re-fetched on every poll, so an adapter may return `None`
//! now and `Some` a moment later as the page finishes rendering.
//!
//! # Implementations
//!
//! - [`crate::sites::SnapshotAdapter`]: a static HTML document parsed with
//!   per-site selector profiles. No scroll container.
//! - [`crate::sites::ConsoleAdapter`]: a receiving page that writes every
//!   submitted part to an output sink.

use std::sync::Arc;

use async_trait::async_trait;

use botbranch_core::models::{Message, Site};

/// Per-site access to a chat page.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// The site this adapter drives.
    fn site(&self) -> Site;

    /// Messages currently mounted in the page, in document order.
    ///
    /// Text is returned trimmed but otherwise raw: replayed transfers and
    /// empty turns are filtered by the harvester, not by the adapter.
    async fn list_visible_messages(&self) -> Vec<Message>;

    /// The element whose scroll offset virtualizes the transcript.
    async fn scroll_container(&self) -> Option<Arc<dyn ScrollContainer>>;

    /// The prompt input control, if rendered.
    async fn input_control(&self) -> Option<Arc<dyn InputControl>>;

    /// The send button, if rendered.
    async fn submit_affordance(&self) -> Option<Arc<dyn SubmitAffordance>>;

    /// One-shot extraction used when harvesting found nothing.
    async fn fallback_messages(&self) -> Vec<Message> {
        Vec::new()
    }
}

#[async_trait]
pub trait ScrollContainer: Send + Sync {
    /// Current total scroll extent in pixels. May grow as content mounts.
    async fn scroll_extent(&self) -> u64;

    async fn scroll_to(&self, offset: u64);
}

#[async_trait]
pub trait InputControl: Send + Sync {
    /// Current text content, untrimmed.
    async fn text(&self) -> String;

    async fn set_text(&self, text: &str);

    /// Fire the control's native input event so the host framework sees
    /// the new value.
    async fn notify_changed(&self);

    /// Dispatch a single Enter keydown.
    async fn press_enter(&self);
}

#[async_trait]
pub trait SubmitAffordance: Send + Sync {
    async fn is_enabled(&self) -> bool;

    async fn activate(&self);
}
