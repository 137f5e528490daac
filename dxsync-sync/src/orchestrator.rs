//! Sync orchestrator: drives per-type push and pull runs.
//!
//! ```text
//! Idle → Preparing → Executing(type₁) → … → Executing(typeₙ) → Completed
//! ```
//!
//! `Preparing` resolves the artifact types in scope and fails with
//! [`SyncError::NoArtifactTypeSelected`] when none resolve. Each
//! `Executing` step picks its candidates (hash cache, manifest, explicit
//! item or everything), fans them out through [`run_bounded`] and records
//! every success in the hash cache and the write manifest. A type with
//! failed items stops the run unless continue-on-error is set.

use std::path::Path;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use dxsync_core::{
    ArtifactType, LocalItem, ManifestItem, ManifestKey, ManifestStore, RemoteItem, SyncFlags,
    SyncOptions,
};

use crate::error::{HelperError, SyncError};
use crate::hash_cache::TenantCache;
use crate::helper::{local_label, remote_label, ArtifactHelper, HelperRegistry};
use crate::report::{EventSink, RunSummary, SyncEvent, TypeSummary};
use crate::runner::run_bounded;

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preparing,
    Executing(ArtifactType),
    Completed,
}

/// Which artifact types a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSelection {
    /// Explicitly named types; executed in declared order regardless of
    /// the order given.
    Explicit(Vec<ArtifactType>),
    /// Every type with a registered helper that the tier supports.
    All,
    /// The non-empty sections of the read manifest.
    Manifest,
}

/// How the items of one type are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates {
    /// Items the hash cache reports as new and/or modified.
    Modified(SyncFlags),
    /// Every item, ignoring the cache.
    All,
    /// Items listed in the read manifest's section for the type.
    Manifest,
    /// One item, matched by id or by path.
    Item(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Push,
    Pull,
}

/// Drives push and pull runs for one `(working directory, tenant)` scope.
pub struct Orchestrator<'a> {
    cache: TenantCache<'a>,
    options: SyncOptions,
    manifests: ManifestStore,
    events: EventSink,
    state: RunState,
    summary: RunSummary,
}

impl<'a> Orchestrator<'a> {
    pub fn new(cache: TenantCache<'a>, options: SyncOptions, manifests: ManifestStore) -> Self {
        Self {
            cache,
            options,
            manifests,
            events: EventSink::default(),
            state: RunState::Idle,
            summary: RunSummary::default(),
        }
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<SyncEvent>) -> Self {
        self.events = EventSink::new(Some(tx));
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Counts of the current (or last) run, including a run that aborted.
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    pub fn cache(&self) -> &TenantCache<'a> {
        &self.cache
    }

    pub(crate) fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub(crate) fn events(&self) -> &EventSink {
        &self.events
    }

    pub(crate) fn manifests_mut(&mut self) -> &mut ManifestStore {
        &mut self.manifests
    }

    /// Resolve the artifact types a run covers, in execution order.
    pub fn prepare(
        &mut self,
        selection: &TypeSelection,
        helpers: &HelperRegistry,
    ) -> Result<Vec<ArtifactType>, SyncError> {
        self.state = RunState::Preparing;
        self.summary = RunSummary::default();

        let mut types = match selection {
            TypeSelection::Explicit(types) => types.clone(),
            TypeSelection::All => helpers
                .artifact_types()
                .into_iter()
                .filter(|t| self.options.tier.supports(*t))
                .collect(),
            TypeSelection::Manifest => self.manifests.artifact_types(),
        };
        types.sort();
        types.dedup();

        if types.is_empty() {
            self.state = RunState::Idle;
            return Err(SyncError::NoArtifactTypeSelected);
        }
        debug!(?types, "artifact types in scope");
        Ok(types)
    }

    /// Push local artifacts to the service.
    pub async fn push(
        &mut self,
        selection: &TypeSelection,
        candidates: &Candidates,
        helpers: &HelperRegistry,
    ) -> Result<RunSummary, SyncError> {
        self.run(Direction::Push, selection, candidates, helpers).await
    }

    /// Pull remote artifacts into the working directory.
    pub async fn pull(
        &mut self,
        selection: &TypeSelection,
        candidates: &Candidates,
        helpers: &HelperRegistry,
    ) -> Result<RunSummary, SyncError> {
        self.run(Direction::Pull, selection, candidates, helpers).await
    }

    pub async fn push_item(
        &mut self,
        artifact_type: ArtifactType,
        id_or_path: &str,
        helpers: &HelperRegistry,
    ) -> Result<RunSummary, SyncError> {
        let selection = TypeSelection::Explicit(vec![artifact_type]);
        self.push(&selection, &Candidates::Item(id_or_path.to_owned()), helpers)
            .await
    }

    pub async fn push_all_items(
        &mut self,
        selection: &TypeSelection,
        helpers: &HelperRegistry,
    ) -> Result<RunSummary, SyncError> {
        self.push(selection, &Candidates::All, helpers).await
    }

    pub async fn push_modified_items(
        &mut self,
        selection: &TypeSelection,
        helpers: &HelperRegistry,
    ) -> Result<RunSummary, SyncError> {
        self.push(selection, &Candidates::Modified(SyncFlags::EITHER), helpers)
            .await
    }

    pub async fn push_manifest_items(
        &mut self,
        helpers: &HelperRegistry,
    ) -> Result<RunSummary, SyncError> {
        self.push(&TypeSelection::Manifest, &Candidates::Manifest, helpers)
            .await
    }

    async fn run(
        &mut self,
        direction: Direction,
        selection: &TypeSelection,
        candidates: &Candidates,
        helpers: &HelperRegistry,
    ) -> Result<RunSummary, SyncError> {
        let types = self.prepare(selection, helpers)?;
        let started_at = Utc::now();

        let mut outcome = Ok(());
        for artifact_type in types {
            self.state = RunState::Executing(artifact_type);
            let result = match helpers.get(artifact_type) {
                Some(helper) => self.execute_type(direction, helper, candidates).await,
                None => {
                    let mut summary = TypeSummary::new(artifact_type);
                    summary.error = Some("no helper registered".to_owned());
                    self.summary.types.push(summary);
                    Err(SyncError::Helper {
                        artifact_type,
                        source: HelperError::NotFound("no helper registered".to_owned()),
                    })
                }
            };

            if let Err(err) = result {
                if self.options.continue_on_error {
                    warn!(%artifact_type, error = %err, "continuing after error");
                    if let Some(summary) = self.summary.types.last_mut() {
                        summary.error.get_or_insert_with(|| err.to_string());
                    }
                } else {
                    outcome = Err(err);
                    break;
                }
            }
        }

        if outcome.is_ok() && self.summary.is_success() {
            match direction {
                Direction::Push => self.cache.set_last_push_timestamp(started_at),
                Direction::Pull => self.cache.set_last_pull_timestamp(started_at),
            }
        }
        self.manifests.save_all();
        self.state = RunState::Completed;

        info!(
            succeeded = self.summary.succeeded(),
            failed = self.summary.failed(),
            "{} run finished",
            match direction {
                Direction::Push => "push",
                Direction::Pull => "pull",
            }
        );
        outcome.map(|()| self.summary.clone())
    }

    async fn execute_type(
        &mut self,
        direction: Direction,
        helper: &dyn ArtifactHelper,
        candidates: &Candidates,
    ) -> Result<(), SyncError> {
        let artifact_type = helper.artifact_type();
        let limit = self.options.concurrency_for(artifact_type);

        let (summary, written) = match direction {
            Direction::Push => {
                let items = match self.push_candidates(helper, candidates).await {
                    Ok(items) => items,
                    Err(err) => return Err(self.type_failed(artifact_type, err)),
                };
                self.events.emit(SyncEvent::TypeStarted {
                    artifact_type,
                    candidates: items.len(),
                });
                self.push_items(helper, items, limit).await
            }
            Direction::Pull => {
                let items = match self.pull_candidates(helper, candidates).await {
                    Ok(items) => items,
                    Err(err) => return Err(self.type_failed(artifact_type, err)),
                };
                self.events.emit(SyncEvent::TypeStarted {
                    artifact_type,
                    candidates: items.len(),
                });
                self.pull_items(helper, items, limit).await
            }
        };

        let written: Vec<ManifestItem> = written.iter().map(ManifestItem::from).collect();
        let site = helper.site_id();
        self.manifests
            .record_written(artifact_type, &written, site.as_ref());

        let failed = summary.failed;
        self.events.emit(SyncEvent::TypeCompleted(summary.clone()));
        self.summary.types.push(summary);

        if failed > 0 {
            return Err(SyncError::ItemOperationFailed {
                artifact_type,
                failed,
            });
        }
        Ok(())
    }

    fn type_failed(&mut self, artifact_type: ArtifactType, source: HelperError) -> SyncError {
        let mut summary = TypeSummary::new(artifact_type);
        summary.error = Some(source.to_string());
        self.events.emit(SyncEvent::TypeCompleted(summary.clone()));
        self.summary.types.push(summary);
        SyncError::Helper {
            artifact_type,
            source,
        }
    }

    // -- push ---------------------------------------------------------------

    async fn push_candidates(
        &self,
        helper: &dyn ArtifactHelper,
        candidates: &Candidates,
    ) -> Result<Vec<LocalItem>, HelperError> {
        let artifact_type = helper.artifact_type();
        let local = helper.list_local_items().await?;

        let selected = match candidates {
            Candidates::Modified(flags) => local
                .into_iter()
                .filter(|item| self.cache.is_locally_modified(*flags, &item.path))
                .collect(),
            Candidates::All => local,
            Candidates::Manifest => {
                let site = helper.site_id();
                let Some(section) = self.manifests.section(artifact_type, site.as_ref()) else {
                    return Ok(Vec::new());
                };
                local
                    .into_iter()
                    .filter(|item| section.contains_key(&self.local_manifest_key(artifact_type, item)))
                    .collect()
            }
            Candidates::Item(target) => {
                let found: Vec<_> = local
                    .into_iter()
                    .filter(|item| {
                        item.id.as_ref().is_some_and(|id| id.0 == *target)
                            || self.local_manifest_key(artifact_type, item) == *target
                            || self.cache.relative_key(&item.path) == *target
                    })
                    .collect();
                if found.is_empty() {
                    return Err(HelperError::NotFound(target.clone()));
                }
                found
            }
        };
        Ok(selected)
    }

    /// The key a local item would have in its manifest section.
    fn local_manifest_key(&self, artifact_type: ArtifactType, item: &LocalItem) -> String {
        match artifact_type.manifest_key() {
            ManifestKey::Path => asset_path(&self.cache.relative_key(&item.path)),
            ManifestKey::Id => item
                .id
                .as_ref()
                .map(|id| id.0.clone())
                .unwrap_or_default(),
        }
    }

    async fn push_items(
        &self,
        helper: &dyn ArtifactHelper,
        items: Vec<LocalItem>,
        limit: usize,
    ) -> (TypeSummary, Vec<RemoteItem>) {
        let artifact_type = helper.artifact_type();
        let outcomes = run_bounded(limit, items, |item| async move {
            match helper.push_item(&item).await {
                Ok(remote) => {
                    if let Err(err) = self.cache.record_artifact(Some(item.path.as_path()), Some(&remote)) {
                        warn!(item = %local_label(&item), error = %err, "pushed but not cached");
                    }
                    debug!(%artifact_type, id = %remote.id, "pushed");
                    self.events.emit(SyncEvent::Pushed {
                        artifact_type,
                        item: remote.clone(),
                    });
                    Ok(remote)
                }
                Err(error) => {
                    warn!(%artifact_type, item = %local_label(&item), %error, "push failed");
                    self.events.emit(SyncEvent::PushFailed {
                        artifact_type,
                        item: local_label(&item),
                        error: error.clone(),
                    });
                    Err((local_label(&item), error))
                }
            }
        })
        .await;
        settle(artifact_type, outcomes)
    }

    // -- pull ---------------------------------------------------------------

    async fn pull_candidates(
        &self,
        helper: &dyn ArtifactHelper,
        candidates: &Candidates,
    ) -> Result<Vec<RemoteItem>, HelperError> {
        let artifact_type = helper.artifact_type();
        let since = match candidates {
            Candidates::Modified(_) => self.cache.last_pull_timestamp(),
            _ => None,
        };
        let remote = helper.list_remote_items(since).await?;

        let selected = match candidates {
            Candidates::Modified(flags) => remote
                .into_iter()
                .filter(|item| {
                    let local = helper.local_path_for(item);
                    self.cache
                        .is_remotely_modified(*flags, item, local.as_deref())
                })
                .collect(),
            Candidates::All => remote,
            Candidates::Manifest => {
                let site = helper.site_id();
                let Some(section) = self.manifests.section(artifact_type, site.as_ref()) else {
                    return Ok(Vec::new());
                };
                remote
                    .into_iter()
                    .filter(|item| {
                        let key = match artifact_type.manifest_key() {
                            ManifestKey::Path => item.path.clone().unwrap_or_default(),
                            ManifestKey::Id => item.id.0.clone(),
                        };
                        section.contains_key(&key)
                    })
                    .collect()
            }
            Candidates::Item(target) => {
                let found: Vec<_> = remote
                    .into_iter()
                    .filter(|item| item.id.0 == *target || item.path.as_deref() == Some(target))
                    .collect();
                if found.is_empty() {
                    return Err(HelperError::NotFound(target.clone()));
                }
                found
            }
        };
        Ok(selected)
    }

    async fn pull_items(
        &self,
        helper: &dyn ArtifactHelper,
        items: Vec<RemoteItem>,
        limit: usize,
    ) -> (TypeSummary, Vec<RemoteItem>) {
        let artifact_type = helper.artifact_type();
        let outcomes = run_bounded(limit, items, |item| async move {
            match helper.pull_item(&item).await {
                Ok(path) => {
                    self.record_pulled(&path, &item);
                    self.events.emit(SyncEvent::Pulled {
                        artifact_type,
                        item: item.clone(),
                    });
                    Ok(item)
                }
                Err(error) => {
                    warn!(%artifact_type, item = %remote_label(&item), %error, "pull failed");
                    self.events.emit(SyncEvent::PullFailed {
                        artifact_type,
                        item: remote_label(&item),
                        error: error.clone(),
                    });
                    Err((remote_label(&item), error))
                }
            }
        })
        .await;
        settle(artifact_type, outcomes)
    }

    fn record_pulled(&self, path: &Path, item: &RemoteItem) {
        if let Err(err) = self.cache.record_artifact(Some(path), Some(item)) {
            warn!(item = %remote_label(item), error = %err, "pulled but not cached");
        }
    }
}

/// Asset manifest keys are paths relative to the `assets/` directory.
fn asset_path(relative_key: &str) -> String {
    relative_key
        .strip_prefix("/assets")
        .filter(|rest| rest.starts_with('/'))
        .unwrap_or(relative_key)
        .to_owned()
}

fn settle(
    artifact_type: ArtifactType,
    outcomes: Vec<Result<RemoteItem, (String, HelperError)>>,
) -> (TypeSummary, Vec<RemoteItem>) {
    let mut summary = TypeSummary::new(artifact_type);
    let mut done = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(item) => {
                summary.succeeded += 1;
                done.push(item);
            }
            Err((label, error)) => summary.record_failure(label, &error),
        }
    }
    (summary, done)
}
