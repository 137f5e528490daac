//! # dxsync-sync
//!
//! Local synchronization state engine: content fingerprints, the
//! per-directory [`HashCache`], and the [`Orchestrator`] that fans item
//! operations of each artifact type out through a bounded-concurrency
//! runner.

pub mod delete;
pub mod error;
pub mod fingerprint;
pub mod hash_cache;
pub mod helper;
pub mod orchestrator;
pub mod report;
pub mod runner;

pub use delete::{Confirm, DeleteOutcome, DeleteRequest, DeleteTarget};
pub use error::{HelperError, SyncError};
pub use fingerprint::{fingerprint, Fingerprint};
pub use hash_cache::{CacheEntry, CacheRecovery, HashCache, TenantCache, TenantScope};
pub use helper::{ArtifactHelper, HelperRegistry, SearchQuery};
pub use orchestrator::{Candidates, Orchestrator, RunState, TypeSelection};
pub use report::{ItemFailure, RunSummary, SyncEvent, TypeSummary};
pub use runner::run_bounded;
