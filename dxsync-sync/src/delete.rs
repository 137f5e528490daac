//! Remote deletion: by id, by exact path, by search, or everything of a type.
//!
//! A single match is deleted straight away. Several matches need either
//! `quiet` (bulk) or a per-item yes/no from a [`Confirm`] implementation;
//! items answered "no" are dropped from the batch. Preview lists matches
//! and touches nothing.

use tracing::{debug, warn};

use dxsync_core::{ArtifactId, ManifestItem, RemoteItem};

use crate::error::{HelperError, SyncError};
use crate::helper::{remote_label, ArtifactHelper, SearchQuery};
use crate::orchestrator::Orchestrator;
use crate::report::{SyncEvent, TypeSummary};
use crate::runner::run_bounded;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    ById(ArtifactId),
    /// Exact remote path.
    ByPath(String),
    BySearch { query: SearchQuery, recursive: bool },
    /// Every remote item of the helper's type.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub target: DeleteTarget,
    /// Delete every match without asking.
    pub quiet: bool,
    /// Only report what would be deleted.
    pub preview: bool,
}

impl DeleteRequest {
    pub fn new(target: DeleteTarget) -> Self {
        Self {
            target,
            quiet: false,
            preview: false,
        }
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn preview(mut self) -> Self {
        self.preview = true;
        self
    }
}

/// Interactive yes/no collaborator for multi-match deletions.
pub trait Confirm {
    fn confirm(&self, item: &RemoteItem) -> bool;
}

/// Result of a delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Every remote item the target matched.
    pub matched: Vec<RemoteItem>,
    /// Items actually deleted.
    pub deleted: Vec<RemoteItem>,
    pub summary: TypeSummary,
    pub preview: bool,
}

impl Orchestrator<'_> {
    /// Resolve `request` against the service and delete what it selects.
    pub async fn delete(
        &mut self,
        helper: &dyn ArtifactHelper,
        request: &DeleteRequest,
        confirm: Option<&dyn Confirm>,
    ) -> Result<DeleteOutcome, SyncError> {
        let artifact_type = helper.artifact_type();
        let matched = resolve_matches(helper, &request.target)
            .await
            .map_err(|source| SyncError::Helper {
                artifact_type,
                source,
            })?;
        debug!(%artifact_type, matches = matched.len(), "delete target resolved");

        if request.preview || matched.is_empty() {
            return Ok(DeleteOutcome {
                matched,
                deleted: Vec::new(),
                summary: TypeSummary::new(artifact_type),
                preview: request.preview,
            });
        }

        let selected: Vec<RemoteItem> = if matched.len() == 1 || request.quiet {
            matched.clone()
        } else {
            let Some(confirm) = confirm else {
                return Err(SyncError::ConfirmationRequired {
                    matches: matched.len(),
                });
            };
            matched
                .iter()
                .filter(|item| confirm.confirm(item))
                .cloned()
                .collect()
        };

        let (summary, deleted) = self.delete_items(helper, selected).await;
        let records: Vec<ManifestItem> = deleted.iter().map(ManifestItem::from).collect();
        let site = helper.site_id();
        self.manifests_mut()
            .record_deleted(artifact_type, &records, site.as_ref());
        self.manifests().save_all();

        Ok(DeleteOutcome {
            matched,
            deleted,
            summary,
            preview: false,
        })
    }

    /// Delete one known remote item.
    pub async fn delete_remote_item(
        &mut self,
        helper: &dyn ArtifactHelper,
        item: RemoteItem,
    ) -> TypeSummary {
        let (summary, deleted) = self.delete_items(helper, vec![item]).await;
        let records: Vec<ManifestItem> = deleted.iter().map(ManifestItem::from).collect();
        let site = helper.site_id();
        self.manifests_mut()
            .record_deleted(helper.artifact_type(), &records, site.as_ref());
        self.manifests().save_all();
        summary
    }

    /// Delete every remote item of the helper's type without prompting.
    pub async fn delete_remote_items(
        &mut self,
        helper: &dyn ArtifactHelper,
    ) -> Result<DeleteOutcome, SyncError> {
        self.delete(helper, &DeleteRequest::new(DeleteTarget::All).quiet(), None)
            .await
    }

    async fn delete_items(
        &self,
        helper: &dyn ArtifactHelper,
        items: Vec<RemoteItem>,
    ) -> (TypeSummary, Vec<RemoteItem>) {
        let artifact_type = helper.artifact_type();
        self.events().emit(SyncEvent::TypeStarted {
            artifact_type,
            candidates: items.len(),
        });
        let limit = self.options().concurrency_for(artifact_type);
        let outcomes = run_bounded(limit, items, |item| async move {
            match helper.delete_remote_item(&item).await {
                Ok(()) => {
                    self.cache().remove_artifact(&item.id);
                    self.events().emit(SyncEvent::Deleted {
                        artifact_type,
                        item: item.clone(),
                    });
                    Ok(item)
                }
                Err(error) => {
                    warn!(%artifact_type, item = %remote_label(&item), %error, "delete failed");
                    self.events().emit(SyncEvent::DeleteFailed {
                        artifact_type,
                        item: remote_label(&item),
                        error: error.clone(),
                    });
                    Err((remote_label(&item), error))
                }
            }
        })
        .await;

        let mut summary = TypeSummary::new(artifact_type);
        let mut deleted = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(item) => {
                    summary.succeeded += 1;
                    deleted.push(item);
                }
                Err((label, error)) => summary.record_failure(label, &error),
            }
        }
        self.events().emit(SyncEvent::TypeCompleted(summary.clone()));
        (summary, deleted)
    }
}

async fn resolve_matches(
    helper: &dyn ArtifactHelper,
    target: &DeleteTarget,
) -> Result<Vec<RemoteItem>, HelperError> {
    match target {
        DeleteTarget::ById(id) => Ok(helper.get_remote_item(id).await?.into_iter().collect()),
        DeleteTarget::ByPath(path) => Ok(helper
            .get_remote_item_by_path(path)
            .await?
            .into_iter()
            .collect()),
        DeleteTarget::BySearch { query, recursive } => {
            helper.search_remote(query, *recursive).await
        }
        DeleteTarget::All => helper.list_remote_items(None).await,
    }
}
