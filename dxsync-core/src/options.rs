//! Run options for a working directory.
//!
//! Stored as `<working_dir>/.dxsync/options.json`:
//!
//! ```json
//! {
//!   "concurrentLimit": 5,
//!   "continueOnError": true,
//!   "tier": "base",
//!   "types": { "assets": { "concurrentLimit": 2 } }
//! }
//! ```
//!
//! Every key is optional; a missing file yields [`SyncOptions::default`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::OptionsError;
use crate::types::{ArtifactType, ServiceTier, SiteId};

/// Global fallback for simultaneous outstanding item operations.
pub const DEFAULT_CONCURRENT_LIMIT: usize = 5;

/// Per-type overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncOptions {
    pub concurrent_limit: usize,
    pub continue_on_error: bool,
    pub tier: ServiceTier,
    pub default_site_id: SiteId,
    pub types: BTreeMap<ArtifactType, TypeOptions>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrent_limit: DEFAULT_CONCURRENT_LIMIT,
            continue_on_error: false,
            tier: ServiceTier::default(),
            default_site_id: SiteId::default(),
            types: BTreeMap::new(),
        }
    }
}

/// `<working_dir>/.dxsync/options.json`. Pure, no I/O.
pub fn options_path_at(working_dir: &Path) -> PathBuf {
    working_dir.join(".dxsync").join("options.json")
}

impl SyncOptions {
    /// Load options for `working_dir`, falling back to defaults when the
    /// file does not exist.
    pub fn load_at(working_dir: &Path) -> Result<Self, OptionsError> {
        let path = options_path_at(working_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| OptionsError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| OptionsError::Parse { path, source })
    }

    pub fn with_concurrent_limit(mut self, limit: usize) -> Self {
        self.concurrent_limit = limit;
        self
    }

    pub fn with_type_limit(mut self, artifact_type: ArtifactType, limit: usize) -> Self {
        self.types.entry(artifact_type).or_default().concurrent_limit = Some(limit);
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_tier(mut self, tier: ServiceTier) -> Self {
        self.tier = tier;
        self
    }

    /// Concurrency bound for one artifact type; never 0.
    pub fn concurrency_for(&self, artifact_type: ArtifactType) -> usize {
        self.types
            .get(&artifact_type)
            .and_then(|t| t.concurrent_limit)
            .unwrap_or(self.concurrent_limit)
            .max(1)
    }
}
