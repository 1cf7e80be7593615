//! Typed access to the key-value store.
//!
//! The gateway stores a transfer [`Payload`] under its opaque id and a
//! [`PendingTransfer`] pointer under one well-known key. Values are JSON
//! bytes. Pointers older than the configured TTL read as absent; they are
//! not deleted on expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use botbranch_core::codec::Payload;
use botbranch_core::models::PendingTransfer;
use botbranch_core::store::KvStore;

use crate::config::StorageConfig;
use crate::error::BranchError;

pub struct PersistenceGateway {
    store: Arc<dyn KvStore>,
    pointer_key: String,
    pointer_ttl: Duration,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn KvStore>, pointer_key: impl Into<String>, pointer_ttl: Duration) -> Self {
        Self {
            store,
            pointer_key: pointer_key.into(),
            pointer_ttl,
        }
    }

    pub fn from_config(store: Arc<dyn KvStore>, config: &StorageConfig) -> Self {
        Self::new(store, config.pointer_key.clone(), config.pointer_ttl())
    }

    pub fn pointer_key(&self) -> &str {
        &self.pointer_key
    }

    pub fn pointer_ttl(&self) -> Duration {
        self.pointer_ttl
    }

    /// Write `payload` under `id`.
    ///
    /// Capacity and invalidated-context rejections surface as
    /// [`BranchError::CapacityExceeded`] and [`BranchError::ContextInvalidated`].
    pub async fn store(&self, id: &str, payload: &Payload) -> Result<(), BranchError> {
        let bytes = serde_json::to_vec(payload)?;
        let size = bytes.len();
        self.store.set(id, bytes).await.map_err(|e| {
            warn!(id, size, error = %e, "payload write rejected");
            BranchError::from(e)
        })?;
        debug!(id, size, parts = payload.part_count(), "payload stored");
        Ok(())
    }

    pub async fn store_pending_pointer(&self, pointer: &PendingTransfer) -> Result<(), BranchError> {
        let bytes = serde_json::to_vec(pointer)?;
        self.store.set(&self.pointer_key, bytes).await?;
        debug!(id = %pointer.id, site = %pointer.target, "pending pointer stored");
        Ok(())
    }

    pub async fn load(&self, id: &str) -> Result<Option<Payload>, BranchError> {
        match self.store.get(id).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn remove(&self, id: &str) -> Result<(), BranchError> {
        self.store.remove(&[id]).await?;
        Ok(())
    }

    /// The pending pointer, unless absent or expired.
    pub async fn load_pending_pointer(&self) -> Result<Option<PendingTransfer>, BranchError> {
        self.load_pending_pointer_at(Utc::now()).await
    }

    /// [`load_pending_pointer`](Self::load_pending_pointer) against a given clock.
    pub async fn load_pending_pointer_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingTransfer>, BranchError> {
        let Some(pointer) = self.load_pending_pointer_raw().await? else {
            return Ok(None);
        };
        if pointer.is_expired(now, self.pointer_ttl) {
            debug!(id = %pointer.id, "pending pointer expired");
            return Ok(None);
        }
        Ok(Some(pointer))
    }

    /// The stored pointer regardless of age.
    pub async fn load_pending_pointer_raw(&self) -> Result<Option<PendingTransfer>, BranchError> {
        match self.store.get(&self.pointer_key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn remove_pending_pointer(&self) -> Result<(), BranchError> {
        self.store.remove(&[self.pointer_key.as_str()]).await?;
        Ok(())
    }

    /// Remove the payload and the pointer in one call.
    pub async fn remove_transfer(&self, id: &str) -> Result<(), BranchError> {
        self.store.remove(&[id, self.pointer_key.as_str()]).await?;
        Ok(())
    }
}
