#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dxsync_core::{ArtifactId, ArtifactType, LocalItem, RemoteItem};
use dxsync_sync::{ArtifactHelper, HelperError, SearchQuery};

/// In-memory stand-in for one artifact type's REST helper.
///
/// Local artifacts are `<dir>/<id>.json`; the "service" is a map of id to
/// item whose revision bumps on every push. Clones share that state, so a
/// test can keep one handle while the registry owns another.
#[derive(Clone)]
pub struct FakeHelper {
    pub artifact_type: ArtifactType,
    pub dir: PathBuf,
    pub fail_ids: HashSet<String>,
    remote: Arc<Mutex<BTreeMap<String, RemoteItem>>>,
    pushed: Arc<Mutex<Vec<String>>>,
    pulled: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeHelper {
    pub fn new(artifact_type: ArtifactType, working_dir: &Path) -> Self {
        let dir = working_dir.join(artifact_type.section_name());
        fs::create_dir_all(&dir).expect("create type dir");
        Self {
            artifact_type,
            dir,
            fail_ids: HashSet::new(),
            remote: Arc::default(),
            pushed: Arc::default(),
            pulled: Arc::default(),
            in_flight: Arc::default(),
            peak: Arc::default(),
        }
    }

    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.fail_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn write_local(&self, id: &str, body: &str) -> PathBuf {
        let path = self.dir.join(format!("{id}.json"));
        fs::write(&path, body).expect("write local artifact");
        path
    }

    pub fn put_remote(&self, id: &str, rev: &str) {
        let item = RemoteItem::new(id)
            .with_rev(rev)
            .with_name(id)
            .with_path(self.remote_path(id));
        self.remote.lock().unwrap().insert(id.to_string(), item);
    }

    pub fn pushed(&self) -> Vec<String> {
        let mut ids = self.pushed.lock().unwrap().clone();
        ids.sort();
        ids
    }

    pub fn pulled(&self) -> Vec<String> {
        let mut ids = self.pulled.lock().unwrap().clone();
        ids.sort();
        ids
    }

    /// Highest number of helper calls observed in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn remote_ids(&self) -> Vec<String> {
        self.remote.lock().unwrap().keys().cloned().collect()
    }

    fn remote_path(&self, id: &str) -> String {
        format!("/{}/{id}.json", self.artifact_type.section_name())
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(3)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArtifactHelper for FakeHelper {
    fn artifact_type(&self) -> ArtifactType {
        self.artifact_type
    }

    fn local_path_for(&self, item: &RemoteItem) -> Option<PathBuf> {
        Some(self.dir.join(format!("{}.json", item.id)))
    }

    async fn list_local_items(&self) -> Result<Vec<LocalItem>, HelperError> {
        let mut items = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| HelperError::Local(e.to_string()))?;
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            items.push(LocalItem::new(&path).with_id(stem.as_str()).with_name(stem));
        }
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }

    async fn push_item(&self, item: &LocalItem) -> Result<RemoteItem, HelperError> {
        self.enter().await;
        let id = item.id.clone().expect("fake items carry ids").0;
        if self.fail_ids.contains(&id) {
            return Err(HelperError::Remote(format!("500 pushing {id}")));
        }
        let mut remote = self.remote.lock().unwrap();
        let next_rev = remote
            .get(&id)
            .and_then(|r| r.rev.as_deref())
            .and_then(|r| r.parse::<u32>().ok())
            .map_or(1, |r| r + 1);
        let pushed = RemoteItem::new(id.as_str())
            .with_rev(next_rev.to_string())
            .with_name(id.as_str())
            .with_path(self.remote_path(&id));
        remote.insert(id.clone(), pushed.clone());
        self.pushed.lock().unwrap().push(id);
        Ok(pushed)
    }

    async fn list_remote_items(
        &self,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteItem>, HelperError> {
        Ok(self.remote.lock().unwrap().values().cloned().collect())
    }

    async fn pull_item(&self, item: &RemoteItem) -> Result<PathBuf, HelperError> {
        self.enter().await;
        if self.fail_ids.contains(&item.id.0) {
            return Err(HelperError::Remote(format!("500 pulling {}", item.id)));
        }
        let path = self.dir.join(format!("{}.json", item.id));
        let body = format!("{{\"id\":\"{}\",\"rev\":\"{:?}\"}}", item.id, item.rev);
        fs::write(&path, body).map_err(|e| HelperError::Local(e.to_string()))?;
        self.pulled.lock().unwrap().push(item.id.0.clone());
        Ok(path)
    }

    async fn get_remote_item(&self, id: &ArtifactId) -> Result<Option<RemoteItem>, HelperError> {
        Ok(self.remote.lock().unwrap().get(&id.0).cloned())
    }

    async fn get_remote_item_by_path(
        &self,
        path: &str,
    ) -> Result<Option<RemoteItem>, HelperError> {
        Ok(self
            .remote
            .lock()
            .unwrap()
            .values()
            .find(|r| r.path.as_deref() == Some(path))
            .cloned())
    }

    async fn search_remote(
        &self,
        query: &SearchQuery,
        _recursive: bool,
    ) -> Result<Vec<RemoteItem>, HelperError> {
        let prefix = query
            .pattern
            .as_deref()
            .unwrap_or("*")
            .trim_end_matches('*')
            .to_string();
        Ok(self
            .remote
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.name.as_deref().unwrap_or_default().starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn delete_remote_item(&self, item: &RemoteItem) -> Result<(), HelperError> {
        self.enter().await;
        if self.fail_ids.contains(&item.id.0) {
            return Err(HelperError::Remote(format!("500 deleting {}", item.id)));
        }
        self.remote
            .lock()
            .unwrap()
            .remove(&item.id.0)
            .map(|_| ())
            .ok_or_else(|| HelperError::NotFound(item.id.0.clone()))
    }
}
