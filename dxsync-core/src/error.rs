//! Error types for dxsync-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ArtifactType, ServiceTier};

/// Errors raised while loading or validating manifests.
///
/// Save failures are not represented here: they are logged and never
/// abort a run.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Underlying I/O failure, with the path that failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The read manifest did not exist at the resolved location.
    #[error("manifest not found at {location}")]
    NotFound { location: String },

    /// Manifest content was not valid manifest JSON.
    #[error("failed to parse manifest at {location}: {source}")]
    Invalid {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    /// The read manifest names a section the active tier cannot serve.
    #[error("manifest section '{artifact_type}' is not supported on the {tier} tier")]
    Incompatible {
        artifact_type: ArtifactType,
        tier: ServiceTier,
    },

    /// Remote fetch of a manifest failed before any bytes were parsed.
    #[error("failed to fetch manifest {location}: {reason}")]
    Fetch { location: String, reason: String },
}

/// Errors raised while loading `.dxsync/options.json`.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse options at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ManifestError {
    ManifestError::Io {
        path: path.into(),
        source,
    }
}
