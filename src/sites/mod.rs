//! Per-site selector profiles and the adapters built on them.
//!
//! Each site module knows how to find turns, the input control and the
//! send button in that site's markup. [`SnapshotAdapter`] applies a
//! profile to a saved HTML document; [`ConsoleAdapter`] stands in for a
//! receiving page and writes each submitted part to an output sink.
//!
//! Selector chains are tried in order and the first match wins, the way
//! the sites' own fallbacks are layered.

pub mod chatgpt;
pub mod console;
pub mod deepseek;
pub mod gemini;
pub mod snapshot;

pub use console::ConsoleAdapter;
pub use snapshot::SnapshotAdapter;

use scraper::{ElementRef, Html, Selector};

use botbranch_core::models::{Message, Site};

/// Where a site keeps its controls.
#[derive(Debug, Clone, Copy)]
pub struct SiteProfile {
    pub site: Site,
    /// Prompt input candidates.
    pub input: &'static [&'static str],
    /// Send button candidates.
    pub send: &'static [&'static str],
    /// Scroll container candidates for a live page.
    pub scroll: &'static [&'static str],
}

pub fn profile(site: Site) -> &'static SiteProfile {
    match site {
        Site::ChatGpt => &chatgpt::PROFILE,
        Site::Gemini => &gemini::PROFILE,
        Site::DeepSeek => &deepseek::PROFILE,
    }
}

/// Turns in `document`, in document order, as the site's harvester sees them.
pub fn extract_messages(site: Site, document: &Html) -> Vec<Message> {
    match site {
        Site::ChatGpt => chatgpt::extract(document),
        Site::Gemini => gemini::extract(document),
        Site::DeepSeek => deepseek::extract(document),
    }
}

/// One-shot extraction used when the harvest comes back empty.
pub fn extract_fallback(site: Site, document: &Html) -> Vec<Message> {
    match site {
        Site::ChatGpt => chatgpt::fallback(document),
        Site::Gemini | Site::DeepSeek => Vec::new(),
    }
}

/// Parse a selector that is a compile-time constant of this module tree.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// First element matched by the first selector in `chain` that matches at all.
pub(crate) fn select_first<'a>(
    root: ElementRef<'a>,
    chain: &[&str],
) -> Option<ElementRef<'a>> {
    chain
        .iter()
        .find_map(|css| root.select(&selector(css)).next())
}

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "details", "div", "dl", "dt",
    "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "tr", "ul",
];

/// Descendant text with one line per block element.
///
/// Whitespace runs collapse to a single space except inside `pre`, where
/// the text is kept as written. `br` starts a new line.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_text(element, element.value().name() == "pre", &mut out);
    out.trim().to_string()
}

fn push_text(element: ElementRef<'_>, preformatted: bool, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            if preformatted {
                out.push_str(text);
            } else {
                push_collapsed(text, out);
            }
        } else if let Some(el) = ElementRef::wrap(child) {
            let name = el.value().name();
            if name == "br" {
                trim_trailing_spaces(out);
                out.push('\n');
                continue;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                line_break(out);
            }
            push_text(el, preformatted || name == "pre", out);
            if block {
                line_break(out);
            }
        }
    }
}

fn push_collapsed(text: &str, out: &mut String) {
    for c in text.chars() {
        if c.is_whitespace() {
            if !(out.is_empty() || out.ends_with(' ') || out.ends_with('\n')) {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
    }
}

fn line_break(out: &mut String) {
    trim_trailing_spaces(out);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn trim_trailing_spaces(out: &mut String) {
    let kept = out.trim_end_matches(' ').len();
    out.truncate(kept);
}
