//! Error taxonomy for the transfer pipeline.
//!
//! Each variant maps to one user-visible condition. Capacity and context
//! failures are kept apart from generic storage errors so the trigger
//! control can tell the user what to do about them.

use thiserror::Error;

use botbranch_core::codec::CodecError;
use botbranch_core::store::StoreError;

#[derive(Debug, Error)]
pub enum BranchError {
    /// A required page capability (input control, scroll container) is absent.
    #[error("{0} not found")]
    NotFound(String),

    /// The store rejected the payload even after chunking.
    #[error("transfer payload too large for storage ({requested} bytes, {available} available)")]
    CapacityExceeded { requested: usize, available: usize },

    /// The host runtime was torn down mid-operation.
    #[error("extension context invalidated")]
    ContextInvalidated,

    /// A bounded poll ran out of attempts.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("no conversation content found")]
    EmptyTranscript,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("storage error: {0}")]
    Storage(String),

    /// The trigger is already running an export.
    #[error("a transfer is already in progress")]
    Busy,

    #[error("invalid handoff URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<StoreError> for BranchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CapacityExceeded {
                requested,
                available,
            } => BranchError::CapacityExceeded {
                requested,
                available,
            },
            StoreError::ContextInvalidated => BranchError::ContextInvalidated,
            StoreError::Backend(msg) => BranchError::Storage(msg),
        }
    }
}

impl From<serde_json::Error> for BranchError {
    fn from(err: serde_json::Error) -> Self {
        BranchError::Codec(CodecError::Json(err))
    }
}

impl BranchError {
    /// Text shown to the end user when an export or replay fails.
    pub fn user_message(&self) -> String {
        match self {
            BranchError::ContextInvalidated => {
                "Please REFRESH this page. The extension was reloaded.".to_string()
            }
            BranchError::CapacityExceeded { .. } => {
                "Conversation too MASSIVE to transfer. Even chunking failed.".to_string()
            }
            BranchError::EmptyTranscript => "No conversation content found to branch.".to_string(),
            BranchError::Busy => "A transfer is already in progress.".to_string(),
            other => format!("Error: {}", other),
        }
    }
}
