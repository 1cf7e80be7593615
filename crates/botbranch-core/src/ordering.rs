//! Chronological ordering for a harvest set.
//!
//! The harvest set only remembers insertion order, which follows scroll
//! direction rather than conversation order. An ordering pass samples the
//! currently mounted elements once, in document order, and records the
//! position at which each fingerprint is first seen. Messages that were
//! not mounted during that pass have no rank; they sort after every ranked
//! message and keep their relative harvest order (the sort is stable).
//!
//! For virtualized lists this is an approximation: only the mounted window
//! gets a true rank.

use std::collections::HashMap;

use crate::dedup::HarvestSet;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::models::Message;

/// Document-order rank per fingerprint, from one ordering sample.
#[derive(Debug, Clone, Default)]
pub struct OrderRanks {
    fingerprinter: Fingerprinter,
    ranks: HashMap<Fingerprint, usize>,
}

impl OrderRanks {
    /// Rank each message of `sample` by its position, keeping the first
    /// position per fingerprint and ignoring messages absent from `set`.
    pub fn observe(sample: &[Message], set: &HarvestSet) -> Self {
        let fingerprinter = set.fingerprinter();
        let mut ranks = HashMap::new();
        for (position, msg) in sample.iter().enumerate() {
            let fp = fingerprinter.fingerprint(msg);
            if set.contains(&fp) {
                ranks.entry(fp).or_insert(position);
            }
        }
        Self {
            fingerprinter,
            ranks,
        }
    }

    pub fn rank_of(&self, msg: &Message) -> Option<usize> {
        self.ranks
            .get(&self.fingerprinter.fingerprint(msg))
            .copied()
    }

    /// Number of ranked fingerprints.
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

/// Sort the harvest set into an ordered transcript.
pub fn order_transcript(set: HarvestSet, ranks: &OrderRanks) -> Vec<Message> {
    let mut keyed: Vec<(usize, Message)> = set
        .into_values()
        .into_iter()
        .map(|m| (ranks.rank_of(&m).unwrap_or(usize::MAX), m))
        .collect();
    keyed.sort_by_key(|(rank, _)| *rank);
    keyed.into_iter().map(|(_, m)| m).collect()
}
