//! Gemini markup.
//!
//! The transcript lives under `#chat-history` as a sequence of
//! `user-query` and `model-response` custom elements.

use scraper::Html;

use botbranch_core::models::{Message, Site};

use super::{element_text, select_first, selector, SiteProfile};

pub const PROFILE: SiteProfile = SiteProfile {
    site: Site::Gemini,
    input: &[
        ".initial-input-area-container textarea",
        ".rich-textarea textarea",
        "#prompt-textarea",
        r#"[contenteditable="true"]"#,
    ],
    send: &[
        r#"button[aria-label="Send message"]"#,
        r#"button[aria-label="Send"]"#,
        ".send-button",
        "button.send",
    ],
    scroll: &["infinite-scroller", "main", "#chat-history", r#"[role="main"]"#],
};

pub fn extract(document: &Html) -> Vec<Message> {
    let Some(history) = select_first(document.root_element(), &["#chat-history"]) else {
        return Vec::new();
    };
    let turns = selector("user-query, model-response");
    let mut out = Vec::new();
    for turn in history.select(&turns) {
        let (body, user) = match turn.value().name() {
            "user-query" => (select_first(turn, &[".query-text"]), true),
            _ => (select_first(turn, &["message-content"]), false),
        };
        let Some(body) = body else { continue };
        let text = element_text(body);
        out.push(if user {
            Message::user(text)
        } else {
            Message::assistant(text)
        });
    }
    out
}
