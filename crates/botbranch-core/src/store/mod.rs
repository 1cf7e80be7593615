//! Key-value storage abstraction for BotBranch.
//!
//! The [`KvStore`] trait models the host's persisted byte map: string keys,
//! opaque byte values, set/get/remove. It is shared with other writers and
//! has a finite capacity, so every write can fail. Failures are typed so a
//! caller can tell "too large" apart from "the runtime context is gone".
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

/// Default capacity of a host extension store, in bytes.
pub const DEFAULT_QUOTA_BYTES: usize = 10_485_760;

/// Why a store operation failed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write would push usage past the store's capacity.
    #[error("QUOTA_BYTES exceeded: write of {requested} bytes, {available} bytes available")]
    CapacityExceeded { requested: usize, available: usize },

    /// The runtime context backing the store was torn down.
    #[error("Extension context invalidated")]
    ContextInvalidated,

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Abstract persisted byte map.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`set`](KvStore::set) | Write one key, replacing any previous value |
/// | [`get`](KvStore::get) | Read one key |
/// | [`remove`](KvStore::remove) | Delete keys; missing keys are ignored |
/// | [`bytes_in_use`](KvStore::bytes_in_use) | Current usage, counted as key + value bytes |
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;

    async fn bytes_in_use(&self) -> Result<usize, StoreError>;
}

/// Check a prospective write against a quota.
///
/// `current` is usage before the write, `replaced` the size of the entry
/// the write overwrites (0 for a new key) and `incoming` the new entry size.
pub fn check_quota(
    quota: usize,
    current: usize,
    replaced: usize,
    incoming: usize,
) -> Result<(), StoreError> {
    let after = current.saturating_sub(replaced) + incoming;
    if after > quota {
        return Err(StoreError::CapacityExceeded {
            requested: incoming,
            available: quota.saturating_sub(current.saturating_sub(replaced)),
        });
    }
    Ok(())
}
