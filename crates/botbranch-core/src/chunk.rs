//! Budget-bounded transcript chunker.
//!
//! Splits an ordered transcript into [`Chunk`]s whose encoded form
//! (see [`crate::codec::encode_chunk`]) stays within a character budget,
//! so each chunk fits in one submission to the target chat UI.
//!
//! # Algorithm
//!
//! 1. Measure each message as the character length of its JSON encoding.
//! 2. Accumulate messages into the open chunk while the chunk's encoded
//!    length (delimiters, brackets and separators included) stays `<= budget`.
//! 3. When the next message would overflow, close the open chunk and start
//!    a new one with that message.
//! 4. If a message alone would overflow an empty chunk, close the open
//!    chunk, split the message at its character midpoint into two messages
//!    of the same role, close a chunk holding the first half and open the
//!    next chunk with the second half. Halves are never re-split, so a
//!    pathological half may still exceed the budget.
//!
//! Concatenating the messages of all chunks in order reproduces the input,
//! except that each split message appears as its two halves, first half
//! first.
//!
//! # Example
//!
//! ```rust
//! use botbranch_core::chunk::chunk_messages;
//! use botbranch_core::models::Message;
//!
//! let transcript = vec![Message::user("Hi"), Message::assistant("Hello!")];
//! let chunks = chunk_messages(&transcript, 12_000);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].messages, transcript);
//! ```

use crate::codec::{DELIM_END, DELIM_START};
use crate::models::Message;

/// Default encoded-size budget per chunk, in characters.
pub const DEFAULT_CHUNK_BUDGET: usize = 12_000;

/// One transfer unit of the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the transfer, starting at 0.
    pub index: usize,
    pub messages: Vec<Message>,
    /// Whether the chunk holds half of a message that was split because
    /// it exceeded the budget on its own.
    pub contains_split: bool,
}

impl Chunk {
    /// Character length of this chunk once encoded.
    pub fn encoded_len(&self) -> usize {
        frame_overhead()
            + self.messages.iter().map(encoded_message_len).sum::<usize>()
            + self.messages.len().saturating_sub(1)
    }
}

/// Split `transcript` into chunks of at most `budget` encoded characters.
///
/// Returns no chunks for an empty transcript. Chunk indices are contiguous
/// from 0.
pub fn chunk_messages(transcript: &[Message], budget: usize) -> Vec<Chunk> {
    let mut builder = ChunkBuilder::default();

    for msg in transcript {
        let size = encoded_message_len(msg);

        if frame_overhead() + size > budget {
            builder.close();
            let (first, second) = split_message(msg);
            let first_size = encoded_message_len(&first);
            builder.push(first, first_size, true);
            builder.close();
            let second_size = encoded_message_len(&second);
            builder.push(second, second_size, true);
            continue;
        }

        if !builder.is_empty() && builder.encoded_len() + 1 + size > budget {
            builder.close();
        }
        builder.push(msg.clone(), size, false);
    }

    builder.finish()
}

/// Split a message at its character midpoint into two same-role halves.
///
/// For odd lengths the second half is one character longer.
pub fn split_message(msg: &Message) -> (Message, Message) {
    let chars = msg.content.chars().count();
    let mid = snap_to_char_index(&msg.content, chars / 2);
    let (head, tail) = msg.content.split_at(mid);
    (Message::new(msg.role, head), Message::new(msg.role, tail))
}

/// Character length of a message's JSON encoding.
pub fn encoded_message_len(msg: &Message) -> usize {
    serde_json::to_string(msg)
        .map(|s| s.chars().count())
        .unwrap_or_else(|_| msg.char_len())
}

/// Characters an encoded chunk spends on delimiters and the JSON array.
fn frame_overhead() -> usize {
    DELIM_START.chars().count() + DELIM_END.chars().count() + 2
}

/// Byte offset of the `n`th character of `s` (or `s.len()`).
fn snap_to_char_index(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

#[derive(Default)]
struct ChunkBuilder {
    chunks: Vec<Chunk>,
    current: Vec<Message>,
    current_payload: usize,
    current_split: bool,
}

impl ChunkBuilder {
    fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    fn encoded_len(&self) -> usize {
        frame_overhead() + self.current_payload
    }

    fn push(&mut self, msg: Message, size: usize, split: bool) {
        if !self.current.is_empty() {
            self.current_payload += 1;
        }
        self.current_payload += size;
        self.current_split |= split;
        self.current.push(msg);
    }

    fn close(&mut self) {
        if self.current.is_empty() {
            return;
        }
        self.chunks.push(Chunk {
            index: self.chunks.len(),
            messages: std::mem::take(&mut self.current),
            contains_split: self.current_split,
        });
        self.current_payload = 0;
        self.current_split = false;
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.close();
        self.chunks
    }
}
