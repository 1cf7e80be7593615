//! Core data models used throughout BotBranch.
//!
//! These types represent the messages harvested from a source chat UI,
//! the sites a transcript can travel between, and the pending-transfer
//! pointer written next to a stored payload.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One conversational turn, immutable once harvested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Content length in characters (Unicode scalar values).
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// A chat site that can act as a transfer source or destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    ChatGpt,
    Gemini,
    DeepSeek,
}

impl Site {
    pub const ALL: [Site; 3] = [Site::Gemini, Site::ChatGpt, Site::DeepSeek];

    /// Stable identifier used in pointers and on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            Site::ChatGpt => "chatgpt",
            Site::Gemini => "gemini",
            Site::DeepSeek => "deepseek",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Site::ChatGpt => "ChatGPT",
            Site::Gemini => "Gemini",
            Site::DeepSeek => "DeepSeek",
        }
    }

    /// Landing page a transfer is opened on.
    pub fn home_url(&self) -> &'static str {
        match self {
            Site::ChatGpt => "https://chatgpt.com",
            Site::Gemini => "https://gemini.google.com/app",
            Site::DeepSeek => "https://chat.deepseek.com",
        }
    }

    /// Every site a transcript from `self` can be branched to.
    pub fn destinations(&self) -> Vec<Site> {
        Site::ALL.iter().copied().filter(|s| s != self).collect()
    }

    /// The site served from `host`, if any.
    pub fn for_host(host: &str) -> Option<Site> {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        Site::ALL.iter().copied().find(|site| {
            let home = match site {
                Site::ChatGpt => "chatgpt.com",
                Site::Gemini => "gemini.google.com",
                Site::DeepSeek => "chat.deepseek.com",
            };
            host == home || host.ends_with(&format!(".{}", home))
        })
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Site {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chatgpt" => Ok(Site::ChatGpt),
            "gemini" => Ok(Site::Gemini),
            "deepseek" => Ok(Site::DeepSeek),
            other => Err(format!(
                "unknown site '{}'. Must be chatgpt, gemini, or deepseek.",
                other
            )),
        }
    }
}

/// Pointer to the most recent stored transfer, written under a well-known
/// key so a receiving page can recover a transfer whose URL parameter was
/// lost during navigation.
///
/// Field names match the persisted record layout: `{bb_id, target, ts}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
    #[serde(rename = "bb_id")]
    pub id: String,
    pub target: Site,
    /// Creation time in Unix milliseconds.
    #[serde(rename = "ts")]
    pub timestamp: i64,
}

impl PendingTransfer {
    pub fn new(id: impl Into<String>, target: Site, created: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            target,
            timestamp: created.timestamp_millis(),
        }
    }

    /// Whether the pointer is older than `ttl` at `now`.
    ///
    /// A pointer stamped in the future (clock skew) is not expired.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.timestamp_millis() - self.timestamp;
        age > ttl.as_millis() as i64
    }
}
