//! Transport encoding for transcript chunks.
//!
//! A chunk travels as `DELIM_START + JSON([{role, content}, ...]) + DELIM_END`.
//! A transfer of one chunk is stored as that bare string (the single-part
//! form older receivers understand); a transfer of several chunks is stored
//! as a [`MultiPart`] object listing each encoded chunk in order.
//!
//! No escaping is performed: a message whose content itself contains a
//! delimiter sequence cannot be decoded reliably.
//!
//! When a part is replayed into the target UI it is additionally framed
//! with human-readable `[SYSTEM DATA ...]` markers and an instruction for
//! the receiving assistant (see [`frame_part`]). Harvesters use
//! [`contains_replay_marker`] to skip such framed turns.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunk::Chunk;
use crate::models::Message;

/// Opening sentinel of an encoded chunk.
pub const DELIM_START: &str = "<start_botbranch)>";
/// Closing sentinel of an encoded chunk.
pub const DELIM_END: &str = "<end_botbranch)>";
/// Prefix shared by every replay frame header and footer.
pub const REPLAY_MARKER: &str = "[SYSTEM DATA";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("chunk JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("encoded chunk is missing its {0} delimiter")]
    MissingDelimiter(&'static str),
    #[error("cannot build a payload from zero chunks")]
    NoChunks,
}

/// Encode the messages of one chunk.
pub fn encode_chunk(messages: &[Message]) -> Result<String, CodecError> {
    let json = serde_json::to_string(messages)?;
    Ok(format!("{}{}{}", DELIM_START, json, DELIM_END))
}

/// Inverse of [`encode_chunk`].
///
/// Text before the first start delimiter and after the last end delimiter
/// is ignored.
pub fn decode_chunk(encoded: &str) -> Result<Vec<Message>, CodecError> {
    let start = encoded
        .find(DELIM_START)
        .ok_or(CodecError::MissingDelimiter("start"))?;
    let body = &encoded[start + DELIM_START.len()..];
    let end = body
        .rfind(DELIM_END)
        .ok_or(CodecError::MissingDelimiter("end"))?;
    Ok(serde_json::from_str(&body[..end])?)
}

/// Marker value of [`MultiPart::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadKind {
    #[serde(rename = "multi-part")]
    MultiPart,
}

/// Stored form of a transfer split into several chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiPart {
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    /// Creation time in Unix milliseconds.
    pub timestamp: i64,
    /// Encoded chunks, in transcript order.
    pub parts: Vec<String>,
}

/// A stored transfer: one bare encoded chunk, or a multi-part object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Single(String),
    MultiPart(MultiPart),
}

impl Payload {
    /// Encode `chunks`, choosing the single-part form for exactly one chunk.
    pub fn from_chunks(chunks: &[Chunk], timestamp: i64) -> Result<Self, CodecError> {
        let mut parts = chunks
            .iter()
            .map(|c| encode_chunk(&c.messages))
            .collect::<Result<Vec<_>, _>>()?;

        match parts.len() {
            0 => Err(CodecError::NoChunks),
            1 => Ok(Payload::Single(parts.remove(0))),
            _ => Ok(Payload::MultiPart(MultiPart {
                kind: PayloadKind::MultiPart,
                timestamp,
                parts,
            })),
        }
    }

    /// Encoded parts in replay order. A single-part payload yields one.
    pub fn parts(&self) -> Vec<&str> {
        match self {
            Payload::Single(part) => vec![part.as_str()],
            Payload::MultiPart(mp) => mp.parts.iter().map(String::as_str).collect(),
        }
    }

    pub fn part_count(&self) -> usize {
        match self {
            Payload::Single(_) => 1,
            Payload::MultiPart(mp) => mp.parts.len(),
        }
    }

    pub fn is_multi_part(&self) -> bool {
        matches!(self, Payload::MultiPart(_))
    }

    /// Decode every part back into messages, in order.
    pub fn decode_messages(&self) -> Result<Vec<Message>, CodecError> {
        let mut out = Vec::new();
        for part in self.parts() {
            out.extend(decode_chunk(part)?);
        }
        Ok(out)
    }
}

/// Wrap one encoded part for injection into the target input control.
///
/// `index` is zero-based. A lone part gets an unnumbered frame.
pub fn frame_part(data: &str, index: usize, total: usize) -> String {
    let number = index + 1;
    let (header, footer) = if total > 1 {
        (
            format!("{} PART {}/{} START]", REPLAY_MARKER, number, total),
            format!("{} PART {}/{} END]", REPLAY_MARKER, number, total),
        )
    } else {
        (
            format!("{} START]", REPLAY_MARKER),
            format!("{} END]", REPLAY_MARKER),
        )
    };
    let follow_up = if number == total {
        " Now that you have all parts, continue the conversation."
    } else {
        " Wait for the next part."
    };
    format!(
        "{}\n{}\n{}\n\nInstruction: This is Part {} of {}. Store it in memory silently. Do NOT output it.{}\n\n",
        header, data, footer, number, total, follow_up
    )
}

/// Whether `text` is (or quotes) a replayed part.
pub fn contains_replay_marker(text: &str) -> bool {
    text.contains(REPLAY_MARKER)
}
