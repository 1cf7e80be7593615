//! Fingerprint-keyed harvest set.
//!
//! Grows monotonically during one harvest run: at most one message per
//! fingerprint, no removal. The first render of a fingerprint wins.
//! Accessed from a single harvesting sequence only, so it carries no
//! synchronization of its own.

use std::collections::HashMap;

use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::models::Message;

/// Dedup index mapping fingerprint → message.
#[derive(Debug, Clone, Default)]
pub struct HarvestSet {
    fingerprinter: Fingerprinter,
    index: HashMap<Fingerprint, usize>,
    messages: Vec<Message>,
}

impl HarvestSet {
    pub fn new(fingerprinter: Fingerprinter) -> Self {
        Self {
            fingerprinter,
            index: HashMap::new(),
            messages: Vec::new(),
        }
    }

    pub fn fingerprinter(&self) -> Fingerprinter {
        self.fingerprinter
    }

    /// Insert `msg` unless its fingerprint is already present.
    ///
    /// Returns `true` when the message was new.
    pub fn insert_if_absent(&mut self, msg: Message) -> bool {
        let fp = self.fingerprinter.fingerprint(&msg);
        if self.index.contains_key(&fp) {
            return false;
        }
        self.index.insert(fp, self.messages.len());
        self.messages.push(msg);
        true
    }

    /// Insert every message of one sample, returning how many were new.
    pub fn absorb<I>(&mut self, sample: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        let mut added = 0;
        for msg in sample {
            if self.insert_if_absent(msg) {
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.index.contains_key(fp)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// All messages in insertion order.
    pub fn values(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_values(self) -> Vec<Message> {
        self.messages
    }
}
