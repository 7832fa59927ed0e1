//! Clipshare Error Definitions
//!
//! Defines error types used by the metadata store and configuration layer.

use std::path::PathBuf;

use thiserror::Error;

use super::VideoId;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Store Errors
    // =========================================================================
    #[error("Video already exists: {0}")]
    VideoAlreadyExists(VideoId),

    #[error("Metadata store corrupted at {path}: {reason}")]
    StoreCorrupted { path: PathBuf, reason: String },

    #[error("Failed to lock metadata store: {0}")]
    StoreLockFailed(String),

    // =========================================================================
    // Settings Errors
    // =========================================================================
    #[error("Invalid settings file {path}: {reason}")]
    InvalidSettings { path: PathBuf, reason: String },

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// True when the error means the store cannot be trusted to serve requests.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            CoreError::StoreCorrupted { .. } | CoreError::StoreLockFailed(_)
        )
    }
}
