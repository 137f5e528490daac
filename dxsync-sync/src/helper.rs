//! Per-artifact-type helper boundary.
//!
//! Helpers own the REST protocol and on-disk layout of one artifact type.
//! The orchestrator only sees item-level operations and composes them into
//! push-all / push-modified / push-manifest / delete runs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dxsync_core::{ArtifactId, ArtifactType, LocalItem, RemoteItem, SiteId};

use crate::error::HelperError;

/// Remote search criteria for delete-by-search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Path or name pattern, interpreted by the helper (`*` wildcards).
    pub pattern: Option<String>,
    pub tags: Vec<String>,
}

#[async_trait]
pub trait ArtifactHelper: Send + Sync {
    fn artifact_type(&self) -> ArtifactType;

    /// Site the helper's pages belong to; `None` means the default site.
    fn site_id(&self) -> Option<SiteId> {
        None
    }

    /// Local file an item is (or would be) stored at.
    fn local_path_for(&self, _item: &RemoteItem) -> Option<PathBuf> {
        None
    }

    /// Every local artifact file of this type.
    async fn list_local_items(&self) -> Result<Vec<LocalItem>, HelperError>;

    /// Upload one local artifact; returns the metadata the service now has.
    async fn push_item(&self, item: &LocalItem) -> Result<RemoteItem, HelperError>;

    /// Remote artifacts, optionally only those modified after `since`.
    async fn list_remote_items(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteItem>, HelperError>;

    /// Download one remote artifact; returns the local file written.
    async fn pull_item(&self, item: &RemoteItem) -> Result<PathBuf, HelperError>;

    async fn get_remote_item(&self, id: &ArtifactId) -> Result<Option<RemoteItem>, HelperError>;

    async fn get_remote_item_by_path(&self, path: &str)
        -> Result<Option<RemoteItem>, HelperError>;

    async fn search_remote(
        &self,
        query: &SearchQuery,
        recursive: bool,
    ) -> Result<Vec<RemoteItem>, HelperError>;

    async fn delete_remote_item(&self, item: &RemoteItem) -> Result<(), HelperError>;
}

/// Helpers available to a run, one per artifact type.
#[derive(Default)]
pub struct HelperRegistry {
    helpers: BTreeMap<ArtifactType, Box<dyn ArtifactHelper>>,
}

impl HelperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `helper`, replacing any helper for the same type.
    pub fn register(&mut self, helper: Box<dyn ArtifactHelper>) -> &mut Self {
        self.helpers.insert(helper.artifact_type(), helper);
        self
    }

    pub fn get(&self, artifact_type: ArtifactType) -> Option<&dyn ArtifactHelper> {
        self.helpers.get(&artifact_type).map(|h| h.as_ref())
    }

    /// Registered types in declared execution order.
    pub fn artifact_types(&self) -> Vec<ArtifactType> {
        self.helpers.keys().copied().collect()
    }
}

pub(crate) fn local_label(item: &LocalItem) -> String {
    item.name
        .clone()
        .or_else(|| item.id.as_ref().map(ToString::to_string))
        .unwrap_or_else(|| item.path.display().to_string())
}

pub(crate) fn remote_label(item: &RemoteItem) -> String {
    item.name
        .clone()
        .or_else(|| item.path.clone())
        .unwrap_or_else(|| item.id.to_string())
}
