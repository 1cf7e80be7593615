//! ChatGPT markup.
//!
//! Turns are `article` elements (or `conversation-turn-*` test ids). A turn
//! holding rendered markdown is the assistant's; otherwise the first
//! user-authored block is the user's.

use scraper::Html;

use botbranch_core::models::{Message, Site};

use super::{element_text, select_first, selector, SiteProfile};

pub const PROFILE: SiteProfile = SiteProfile {
    site: Site::ChatGpt,
    input: &["#prompt-textarea"],
    send: &[
        r#"[data-testid="send-button"]"#,
        r#"button[aria-label="Send prompt"]"#,
    ],
    scroll: &[
        r#"div[class*="react-scroll-to-bottom"] > div > div"#,
        "main .overflow-y-auto",
        "main",
    ],
};

const TURNS: &str = r#"article, [data-testid^="conversation-turn-"]"#;
const ASSISTANT: &str = r#".markdown, .prose, [data-message-author-role="assistant"]"#;
const USER: &str =
    r#"[data-message-author-role="user"], [data-testid*="user-message"], .whitespace-pre-wrap"#;

/// Page text above this many characters is not worth sending as a fallback.
const FALLBACK_MAX_PAGE_CHARS: usize = 50_000;
const FALLBACK_KEEP_CHARS: usize = 10_000;
const FALLBACK_PREFIX: &str = "History extraction failed. Full page context: ";

pub fn extract(document: &Html) -> Vec<Message> {
    let turns = selector(TURNS);
    let mut out = Vec::new();
    for turn in document.select(&turns) {
        if let Some(el) = select_first(turn, &[ASSISTANT]) {
            out.push(Message::assistant(element_text(el)));
        } else if let Some(el) = select_first(turn, &[USER]) {
            out.push(Message::user(element_text(el)));
        }
    }
    out
}

/// The whole of `main` as one system message.
pub fn fallback(document: &Html) -> Vec<Message> {
    let Some(main) = select_first(document.root_element(), &["main"]) else {
        return Vec::new();
    };
    let text = element_text(main);
    let chars = text.chars().count();
    if text.is_empty() || chars >= FALLBACK_MAX_PAGE_CHARS {
        return Vec::new();
    }
    let kept: String = text.chars().take(FALLBACK_KEEP_CHARS).collect();
    vec![Message::system(format!("{}{}", FALLBACK_PREFIX, kept))]
}
