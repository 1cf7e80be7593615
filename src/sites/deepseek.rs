//! DeepSeek markup.
//!
//! DeepSeek's class names are hashed, so turns are found by loose
//! attribute matches and classified by role attribute first, then by
//! class-name and descendant hints. A turn that looks like both roles, or
//! neither, is skipped.

use scraper::{ElementRef, Html};

use botbranch_core::codec::contains_replay_marker;
use botbranch_core::models::{Message, Role, Site};

use super::{element_text, select_first, selector, SiteProfile};

pub const PROFILE: SiteProfile = SiteProfile {
    site: Site::DeepSeek,
    input: &[
        r#"textarea[placeholder*="输入"], textarea[placeholder*="message"], [contenteditable="true"]"#,
        "textarea",
    ],
    send: &[
        r#"button[aria-label*="Send"]"#,
        r#"button[aria-label*="send"]"#,
        r#"button[aria-label*="发送"]"#,
        r#"button[type="submit"]"#,
        "button.send",
    ],
    scroll: &["main", "body"],
};

const TURNS: &str = r#"[class*="message"], [data-message], .chat-message, [class*="chat-item"], [class*="conversation-item"]"#;
const ROLE_TURNS: &str =
    r#"[data-role="user"], [data-role="assistant"], [role="user"], [role="assistant"]"#;
const USER_HINTS: &str = r#"[class*="user"], [data-role="user"]"#;
const ASSISTANT_HINTS: &str =
    r#"[class*="assistant"], [data-role="assistant"], .markdown, [class*="markdown"]"#;

/// Shorter text is UI chrome, not a turn.
const MIN_TURN_CHARS: usize = 5;

pub fn extract(document: &Html) -> Vec<Message> {
    let mut candidates: Vec<ElementRef<'_>> = document.select(&selector(TURNS)).collect();
    if candidates.is_empty() {
        candidates = document.select(&selector(ROLE_TURNS)).collect();
    }
    if candidates.is_empty() {
        candidates = document
            .select(&selector("div"))
            .filter(|div| is_loose_turn(*div))
            .collect();
    }

    candidates
        .into_iter()
        .filter_map(|el| {
            let text = element_text(el);
            if text.chars().count() < MIN_TURN_CHARS || contains_replay_marker(&text) {
                return None;
            }
            classify(el).map(|role| Message::new(role, text))
        })
        .collect()
}

fn classify(el: ElementRef<'_>) -> Option<Role> {
    let attr = el
        .value()
        .attr("data-role")
        .or_else(|| el.value().attr("role"))
        .unwrap_or("");
    match attr {
        "user" => return Some(Role::User),
        "assistant" => return Some(Role::Assistant),
        _ => {}
    }

    let class = el.value().attr("class").unwrap_or("");
    let is_user = class.contains("user")
        || class.contains("User")
        || select_first(el, &[USER_HINTS]).is_some();
    let is_assistant = class.contains("assistant")
        || class.contains("Assistant")
        || select_first(el, &[ASSISTANT_HINTS]).is_some();

    match (is_user, is_assistant) {
        (true, false) => Some(Role::User),
        (false, true) => Some(Role::Assistant),
        _ => None,
    }
}

/// Last-resort turn detection for pages with no recognizable turn markup.
fn is_loose_turn(div: ElementRef<'_>) -> bool {
    let has_role = div.value().attr("data-role").is_some() || div.value().attr("role").is_some();
    element_text(div).chars().count() > 10
        && (has_role
            || select_first(div, &[r#"[class*="message"]"#, r#"[class*="chat"]"#]).is_some())
}
