//! Remote deletion through the orchestrator.

mod common;

use std::collections::HashSet;

use tempfile::TempDir;
use tokio::sync::mpsc;

use common::FakeHelper;
use dxsync_core::{
    manifest, ArtifactId, ArtifactType, ManifestOptions, ManifestStore, RemoteItem, SiteId,
    SyncOptions, TenantId,
};
use dxsync_sync::{
    Candidates, Confirm, DeleteRequest, DeleteTarget, HashCache, HelperRegistry, Orchestrator,
    SearchQuery, SyncError, SyncEvent, TypeSelection,
};

/// Answers yes to everything except the listed ids.
struct RejectIds(HashSet<String>);

impl Confirm for RejectIds {
    fn confirm(&self, item: &RemoteItem) -> bool {
        !self.0.contains(&item.id.0)
    }
}

fn search(pattern: &str) -> DeleteTarget {
    DeleteTarget::BySearch {
        query: SearchQuery {
            pattern: Some(pattern.to_owned()),
            tags: Vec::new(),
        },
        recursive: true,
    }
}

fn layouts(dir: &TempDir) -> FakeHelper {
    let helper = FakeHelper::new(ArtifactType::Layouts, dir.path());
    for id in ["hero-a", "hero-b", "footer"] {
        helper.put_remote(id, "1");
    }
    helper
}

fn orchestrator(cache: &HashCache) -> Orchestrator<'_> {
    Orchestrator::new(
        cache.tenant(&TenantId::from("t1")),
        SyncOptions::default(),
        ManifestStore::default(),
    )
}

#[tokio::test]
async fn single_match_is_deleted_without_confirmation() {
    let dir = TempDir::new().unwrap();
    let helper = layouts(&dir);
    let cache = HashCache::open(dir.path());
    let mut orch = orchestrator(&cache);

    let outcome = orch
        .delete(
            &helper,
            &DeleteRequest::new(DeleteTarget::ById(ArtifactId::from("footer"))),
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.deleted.len(), 1);
    assert_eq!(outcome.summary.succeeded, 1);
    assert_eq!(helper.remote_ids(), vec!["hero-a", "hero-b"]);
}

#[tokio::test]
async fn delete_by_path_resolves_exact_path() {
    let dir = TempDir::new().unwrap();
    let helper = layouts(&dir);
    let cache = HashCache::open(dir.path());
    let mut orch = orchestrator(&cache);

    let outcome = orch
        .delete(
            &helper,
            &DeleteRequest::new(DeleteTarget::ByPath("/layouts/hero-a.json".to_owned())),
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.deleted[0].id.0, "hero-a");

    let missing = orch
        .delete(
            &helper,
            &DeleteRequest::new(DeleteTarget::ByPath("/layouts/nope.json".to_owned())),
            None,
        )
        .await
        .unwrap();
    assert!(missing.matched.is_empty());
    assert!(missing.deleted.is_empty());
}

#[tokio::test]
async fn several_matches_need_confirmation_or_quiet() {
    let dir = TempDir::new().unwrap();
    let helper = layouts(&dir);
    let cache = HashCache::open(dir.path());
    let mut orch = orchestrator(&cache);

    let err = orch
        .delete(&helper, &DeleteRequest::new(search("hero*")), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ConfirmationRequired { matches: 2 }));
    assert_eq!(helper.remote_ids().len(), 3);

    let outcome = orch
        .delete(&helper, &DeleteRequest::new(search("hero*")).quiet(), None)
        .await
        .unwrap();
    assert_eq!(outcome.deleted.len(), 2);
    assert_eq!(helper.remote_ids(), vec!["footer"]);
}

#[tokio::test]
async fn rejected_items_are_left_alone() {
    let dir = TempDir::new().unwrap();
    let helper = layouts(&dir);
    let cache = HashCache::open(dir.path());
    let mut orch = orchestrator(&cache);

    let confirm = RejectIds(HashSet::from(["hero-b".to_owned()]));
    let outcome = orch
        .delete(&helper, &DeleteRequest::new(search("hero*")), Some(&confirm))
        .await
        .unwrap();

    assert_eq!(outcome.matched.len(), 2);
    assert_eq!(outcome.deleted.len(), 1);
    assert_eq!(outcome.deleted[0].id.0, "hero-a");
    assert_eq!(helper.remote_ids(), vec!["footer", "hero-b"]);
}

#[tokio::test]
async fn preview_deletes_nothing() {
    let dir = TempDir::new().unwrap();
    let helper = layouts(&dir);
    let cache = HashCache::open(dir.path());
    let mut orch = orchestrator(&cache);

    let outcome = orch
        .delete(&helper, &DeleteRequest::new(DeleteTarget::All).preview(), None)
        .await
        .unwrap();
    assert!(outcome.preview);
    assert_eq!(outcome.matched.len(), 3);
    assert!(outcome.deleted.is_empty());
    assert_eq!(helper.remote_ids().len(), 3);
}

#[tokio::test]
async fn failed_deletes_are_counted() {
    let dir = TempDir::new().unwrap();
    let helper = layouts(&dir).failing(&["hero-b"]);
    let cache = HashCache::open(dir.path());
    let mut orch = orchestrator(&cache);

    let outcome = orch.delete_remote_items(&helper).await.unwrap();
    assert_eq!(outcome.summary.succeeded, 2);
    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(helper.remote_ids(), vec!["hero-b"]);
}

#[tokio::test]
async fn deleted_items_leave_the_cache_and_reach_the_deletions_manifest() {
    let dir = TempDir::new().unwrap();
    let helper = layouts(&dir);
    let mut registry = HelperRegistry::new();
    registry.register(Box::new(helper.clone()));

    let options = ManifestOptions {
        deletions: Some("deleted".to_owned()),
        ..ManifestOptions::default()
    };
    let store = ManifestStore::initialize(dir.path(), &options, None).unwrap();
    let cache = HashCache::open(dir.path());
    let mut orch = Orchestrator::new(
        cache.tenant(&TenantId::from("t1")),
        SyncOptions::default(),
        store,
    );

    orch.pull(
        &TypeSelection::Explicit(vec![ArtifactType::Layouts]),
        &Candidates::All,
        &registry,
    )
    .await
    .unwrap();
    assert!(orch.cache().lookup_by_id(&ArtifactId::from("footer")).is_some());

    orch.delete(
        &helper,
        &DeleteRequest::new(DeleteTarget::ById(ArtifactId::from("footer"))),
        None,
    )
    .await
    .unwrap();

    assert!(orch.cache().lookup_by_id(&ArtifactId::from("footer")).is_none());
    assert!(orch.cache().lookup_by_id(&ArtifactId::from("hero-a")).is_some());

    let deletions = manifest::load_at(&manifest::resolve_path_at(dir.path(), "deleted"))
        .unwrap()
        .unwrap();
    let section = deletions
        .section(ArtifactType::Layouts, &SiteId::default())
        .unwrap();
    assert!(section.contains_key("footer"));
}

#[tokio::test]
async fn single_item_delete_is_saved_to_the_deletions_manifest() {
    let dir = TempDir::new().unwrap();
    let helper = layouts(&dir);
    let options = ManifestOptions {
        deletions: Some("deleted".to_owned()),
        ..ManifestOptions::default()
    };
    let store = ManifestStore::initialize(dir.path(), &options, None).unwrap();
    let cache = HashCache::open(dir.path());
    let mut orch = Orchestrator::new(
        cache.tenant(&TenantId::from("t1")),
        SyncOptions::default(),
        store,
    );

    let footer = RemoteItem::new("footer")
        .with_name("footer")
        .with_path("/layouts/footer.json");
    let summary = orch.delete_remote_item(&helper, footer).await;
    assert_eq!(summary.succeeded, 1);

    let deletions = manifest::load_at(&manifest::resolve_path_at(dir.path(), "deleted"))
        .unwrap()
        .unwrap();
    let section = deletions
        .section(ArtifactType::Layouts, &SiteId::default())
        .unwrap();
    assert!(section.contains_key("footer"));
}

#[tokio::test]
async fn delete_events_are_bracketed_by_type_start_and_completion() {
    let dir = TempDir::new().unwrap();
    let helper = layouts(&dir).failing(&["footer"]);
    let cache = HashCache::open(dir.path());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut orch = orchestrator(&cache).with_events(tx);

    orch.delete_remote_items(&helper).await.unwrap();
    drop(orch);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(
        events.first(),
        Some(SyncEvent::TypeStarted {
            artifact_type: ArtifactType::Layouts,
            candidates: 3
        })
    ));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, SyncEvent::Deleted { .. }))
            .count(),
        2
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, SyncEvent::DeleteFailed { item, .. } if item == "footer")));
    match events.last() {
        Some(SyncEvent::TypeCompleted(summary)) => {
            assert_eq!(summary.succeeded, 2);
            assert_eq!(summary.failed, 1);
        }
        other => panic!("expected TypeCompleted, got {other:?}"),
    }
}
