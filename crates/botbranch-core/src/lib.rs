//! # BotBranch Core
//!
//! Pure logic for BotBranch: message models, fingerprints, the harvest
//! dedup index, ordering ranks, the budget-bounded chunker, the transport
//! codec and the key-value store abstraction.
//!
//! This crate contains no tokio, filesystem I/O, HTML parsing, or other
//! host-specific dependencies. Everything that waits on a page or talks
//! to a real store lives in the `botbranch` app crate.

pub mod chunk;
pub mod codec;
pub mod dedup;
pub mod fingerprint;
pub mod models;
pub mod ordering;
pub mod store;
