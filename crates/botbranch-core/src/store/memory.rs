//! In-memory [`KvStore`] implementation for tests and embedded hosts.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Enforces the same quota
//! accounting as a host extension store and can be switched into an
//! invalidated state to reproduce a torn-down runtime context.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{check_quota, KvStore, StoreError, DEFAULT_QUOTA_BYTES};

/// In-memory store with a byte quota.
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    quota_bytes: usize,
    invalidated: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes,
            invalidated: AtomicBool::new(false),
        }
    }

    /// Make every later operation fail with [`StoreError::ContextInvalidated`].
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn ensure_valid(&self) -> Result<(), StoreError> {
        if self.invalidated.load(Ordering::SeqCst) {
            return Err(StoreError::ContextInvalidated);
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn usage(entries: &HashMap<String, Vec<u8>>) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.ensure_valid()?;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let replaced = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
        check_quota(
            self.quota_bytes,
            usage(&entries),
            replaced,
            key.len() + value.len(),
        )?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.ensure_valid()?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.ensure_valid()?;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }

    async fn bytes_in_use(&self) -> Result<usize, StoreError> {
        self.ensure_valid()?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(usage(&entries))
    }
}
