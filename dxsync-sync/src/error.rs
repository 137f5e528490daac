//! Error types for dxsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use dxsync_core::{ArtifactType, ManifestError};

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisted hash cache state could not be parsed.
    #[error("hash cache at {path} is corrupt: {source}")]
    CacheCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A manifest failed to load; raised before any transfer starts.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Neither flags nor a manifest put any artifact type in scope.
    #[error("no artifact type selected")]
    NoArtifactTypeSelected,

    /// One or more items of a type failed to transfer.
    #[error("{failed} {artifact_type} item(s) failed")]
    ItemOperationFailed {
        artifact_type: ArtifactType,
        failed: usize,
    },

    /// A helper call outside the per-item fan-out failed.
    #[error("{artifact_type} helper error: {source}")]
    Helper {
        artifact_type: ArtifactType,
        #[source]
        source: HelperError,
    },

    /// Several items matched a deletion and nobody could confirm them.
    #[error("{matches} items match; confirmation or quiet mode is required")]
    ConfirmationRequired { matches: usize },

    /// JSON serialization error (hash cache write path).
    #[error("hash cache JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of one helper operation against the remote service or disk.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HelperError {
    #[error("remote error: {0}")]
    Remote(String),

    #[error("local error: {0}")]
    Local(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
