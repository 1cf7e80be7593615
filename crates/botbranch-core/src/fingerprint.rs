//! Heuristic message identity used for in-session deduplication.
//!
//! A fingerprint is `role:snippet_len`, where `snippet` is the first
//! [`SNIPPET_CHARS`] characters of the whitespace-collapsed content and
//! `len` is the character length of that collapsed content. Collapsing
//! happens before truncation, so two renders of the same turn that differ
//! only in whitespace layout produce the same key.
//!
//! This is a probabilistic identity: distinct turns sharing a role, the
//! same leading text and the same length collide. [`Fingerprinter::widened`]
//! appends a SHA-256 prefix of the full collapsed content for callers that
//! cannot accept that risk.
//!
//! # Example
//!
//! ```rust
//! use botbranch_core::fingerprint::Fingerprinter;
//! use botbranch_core::models::Message;
//!
//! let fp = Fingerprinter::default();
//! let a = fp.fingerprint(&Message::user("Hello   world"));
//! let b = fp.fingerprint(&Message::user("Hello\nworld"));
//! assert_eq!(a, b);
//! assert_eq!(a.as_str(), "user:Hello world_11");
//! ```

use std::fmt;

use sha2::{Digest, Sha256};

use crate::models::Message;

/// Leading characters of collapsed content that enter the key.
pub const SNIPPET_CHARS: usize = 100;

/// Hex characters of the content digest kept by a widened fingerprint.
const DIGEST_HEX_CHARS: usize = 16;

/// Stable identity key for a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes fingerprints, optionally widened with a content digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fingerprinter {
    widen: bool,
}

impl Fingerprinter {
    /// Role + snippet + length, matching the historical key format.
    pub fn standard() -> Self {
        Self { widen: false }
    }

    /// Standard key plus a digest of the whole collapsed content.
    pub fn widened() -> Self {
        Self { widen: true }
    }

    pub fn is_widened(&self) -> bool {
        self.widen
    }

    /// Deterministic and total: every message has exactly one key.
    pub fn fingerprint(&self, msg: &Message) -> Fingerprint {
        let collapsed = collapse_whitespace(&msg.content);
        let len = collapsed.chars().count();
        let snippet: String = collapsed.chars().take(SNIPPET_CHARS).collect();
        let mut key = format!("{}:{}_{}", msg.role, snippet, len);

        if self.widen {
            let mut hasher = Sha256::new();
            hasher.update(collapsed.as_bytes());
            let digest = format!("{:x}", hasher.finalize());
            key.push('#');
            key.push_str(&digest[..DIGEST_HEX_CHARS]);
        }

        Fingerprint(key)
    }
}

/// Trim and replace every whitespace run with a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
