//! dxsync core library: domain types, options, manifests, errors.
//!
//! - [`types`]: newtypes, artifact types, tiers, change flags
//! - [`options`]: [`SyncOptions`] loaded from `.dxsync/options.json`
//! - [`manifest`]: [`Manifest`] model and [`ManifestStore`]
//! - [`remote`]: remote manifest retrieval
//! - [`error`]: [`ManifestError`], [`OptionsError`]

pub mod error;
pub mod manifest;
pub mod options;
pub mod remote;
pub mod types;

pub use error::{ManifestError, OptionsError};
pub use manifest::{Manifest, ManifestItem, ManifestOptions, ManifestStore, Section, UpdateMode};
pub use options::SyncOptions;
pub use remote::{HttpManifestFetcher, ManifestFetcher};
pub use types::{
    ArtifactId, ArtifactType, LocalItem, ManifestKey, RemoteItem, ServiceTier, SiteId, SyncFlags,
    TenantId,
};
