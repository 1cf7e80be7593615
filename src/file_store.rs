//! JSON-file [`KvStore`] used by the CLI.
//!
//! The whole map lives in one JSON object on disk, key → UTF-8 value, and
//! is rewritten on every mutation through a temp file and a rename. Quota
//! accounting matches the in-memory store: key bytes plus value bytes.
//! A missing file reads as an empty store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use botbranch_core::store::{check_quota, KvStore, StoreError};

type Entries = BTreeMap<String, String>;

pub struct FileStore {
    path: PathBuf,
    quota_bytes: usize,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, quota_bytes: usize) -> Self {
        Self {
            path: path.into(),
            quota_bytes,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keys currently stored, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read().await?.into_keys().collect())
    }

    async fn read(&self) -> Result<Entries, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Entries::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::Backend(format!("{} is not a store file: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(backend(&self.path, e)),
        }
    }

    async fn write(&self, entries: &Entries) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| backend(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| backend(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| backend(&self.path, e))
    }
}

fn backend(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Backend(format!("{}: {}", path.display(), err))
}

fn usage(entries: &Entries) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

#[async_trait]
impl KvStore for FileStore {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let value = String::from_utf8(value)
            .map_err(|_| StoreError::Backend(format!("value for '{}' is not UTF-8", key)))?;
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read().await?;
        let replaced = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
        check_quota(
            self.quota_bytes,
            usage(&entries),
            replaced,
            key.len() + value.len(),
        )?;
        entries.insert(key.to_string(), value);
        self.write(&entries).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut entries = self.read().await?;
        Ok(entries.remove(key).map(String::into_bytes))
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read().await?;
        let before = entries.len();
        for key in keys {
            entries.remove(*key);
        }
        if entries.len() == before {
            return Ok(());
        }
        self.write(&entries).await
    }

    async fn bytes_in_use(&self) -> Result<usize, StoreError> {
        Ok(usage(&self.read().await?))
    }
}
