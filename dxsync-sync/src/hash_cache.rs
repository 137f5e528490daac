//! Hash cache: per-directory, per-tenant record of what was last synced.
//!
//! Persists one JSON document per working directory at
//! `<working_dir>/.dxsync/hashes.json`:
//!
//! ```json
//! {
//!   "<tenantId>": {
//!     "lastPullTimestamp": "2026-01-02T03:04:05Z",
//!     "lastPushTimestamp": "2026-01-02T03:04:05Z",
//!     "<artifactId>": { "id": "...", "rev": "...", "md5": "...", "path": "/types/a.json",
//!                       "resource": "...", "lastModified": "..." }
//!   }
//! }
//! ```
//!
//! Writes use the atomic `.tmp` + rename pattern after every mutation.
//!
//! # Failure policy
//!
//! - Read: an unparsable file resets every tenant ([`CacheRecovery::ResetFile`]);
//!   an unparsable tenant scope resets that tenant only, on first access
//!   ([`CacheRecovery::ResetTenant`]). Other tenants are written back untouched.
//! - Write: failures are logged and the in-memory state is kept, so the
//!   running process still sees the update and the next successful write
//!   flushes it.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use dxsync_core::{ArtifactId, RemoteItem, SyncFlags, TenantId};

use crate::error::{io_err, SyncError};
use crate::fingerprint::{fingerprint, Fingerprint};

/// Cached state of one artifact as of its last successful push or pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub id: ArtifactId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Path relative to the working directory, `/`-separated with a
    /// leading `/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "md5", default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn new(id: ArtifactId) -> Self {
        Self {
            id,
            rev: None,
            path: None,
            content_hash: None,
            resource: None,
            last_modified: None,
        }
    }

    fn merge_metadata(&mut self, metadata: &RemoteItem) {
        if metadata.rev.is_some() {
            self.rev.clone_from(&metadata.rev);
        }
        if metadata.resource.is_some() {
            self.resource.clone_from(&metadata.resource);
        }
        if metadata.last_modified.is_some() {
            self.last_modified = metadata.last_modified;
        }
    }
}

/// Everything cached for one tenant in one working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pull_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_push_timestamp: Option<DateTime<Utc>>,
    /// Entries keyed by artifact id, in insertion order.
    #[serde(flatten)]
    pub entries: IndexMap<String, CacheEntry>,
}

/// A recovery applied while reading persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRecovery {
    /// The whole file was unparsable; every tenant started fresh.
    ResetFile,
    /// One tenant's scope was unparsable and was discarded.
    ResetTenant { tenant: TenantId },
}

/// One tenant's state. `raw` holds the value loaded from disk until the
/// tenant is first accessed; until then it is written back verbatim.
#[derive(Debug, Default)]
struct TenantSlot {
    raw: Option<Value>,
    scope: TenantScope,
    /// Relative path to artifact id. When several entries share a path the
    /// most recently recorded one wins.
    by_path: HashMap<String, String>,
}

impl TenantSlot {
    fn reindex(&mut self) {
        self.by_path = self
            .scope
            .entries
            .iter()
            .filter_map(|(id, e)| e.path.clone().map(|path| (path, id.clone())))
            .collect();
    }

    fn find_by_path(&self, key: &str) -> Option<&CacheEntry> {
        self.by_path
            .get(key)
            .and_then(|id| self.scope.entries.get(id))
    }

    fn set_path(&mut self, id: &str, key: String) {
        let Some(entry) = self.scope.entries.get_mut(id) else {
            return;
        };
        if let Some(old) = entry.path.replace(key.clone()).filter(|old| *old != key) {
            self.unindex(&old, id);
        }
        self.by_path.insert(key, id.to_owned());
    }

    fn remove(&mut self, id: &str) -> Option<CacheEntry> {
        let removed = self.scope.entries.shift_remove(id)?;
        if let Some(path) = &removed.path {
            self.unindex(path, id);
        }
        Some(removed)
    }

    /// Drop `path -> id` and hand the path to another entry still at it.
    fn unindex(&mut self, path: &str, id: &str) {
        if self.by_path.get(path).map(String::as_str) != Some(id) {
            return;
        }
        self.by_path.remove(path);
        let other = self
            .scope
            .entries
            .iter()
            .rev()
            .find(|(other, e)| other.as_str() != id && e.path.as_deref() == Some(path))
            .map(|(other, _)| other.clone());
        if let Some(other) = other {
            self.by_path.insert(path.to_owned(), other);
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    tenants: IndexMap<String, TenantSlot>,
    recoveries: Vec<CacheRecovery>,
}

impl CacheState {
    fn slot_mut(&mut self, tenant: &TenantId) -> &mut TenantSlot {
        let slot = self.tenants.entry(tenant.0.clone()).or_default();

        if let Some(value) = slot.raw.take() {
            slot.scope = match serde_json::from_value::<TenantScope>(value) {
                Ok(scope) => scope,
                Err(err) => {
                    warn!(tenant = %tenant, error = %err, "discarding corrupt hash cache scope");
                    self.recoveries.push(CacheRecovery::ResetTenant {
                        tenant: tenant.clone(),
                    });
                    TenantScope::default()
                }
            };
            slot.reindex();
        }
        slot
    }

    fn scope_mut(&mut self, tenant: &TenantId) -> &mut TenantScope {
        &mut self.slot_mut(tenant).scope
    }

    fn to_value(&self) -> Result<Value, serde_json::Error> {
        let mut out = serde_json::Map::new();
        for (tenant, slot) in &self.tenants {
            let value = match &slot.raw {
                Some(raw) => raw.clone(),
                None => serde_json::to_value(&slot.scope)?,
            };
            out.insert(tenant.clone(), value);
        }
        Ok(Value::Object(out))
    }
}

/// `<working_dir>/.dxsync/hashes.json`. Pure, no I/O.
pub fn cache_path_at(working_dir: &Path) -> PathBuf {
    working_dir.join(".dxsync").join("hashes.json")
}

/// Raw per-tenant values of the cache file; empty if the file is missing.
pub fn load_at(working_dir: &Path) -> Result<IndexMap<String, Value>, SyncError> {
    let path = cache_path_at(working_dir);
    if !path.exists() {
        return Ok(IndexMap::new());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_json::from_str(&contents).map_err(|source| SyncError::CacheCorrupt { path, source })
}

fn save_at(working_dir: &Path, value: &Value) -> Result<(), SyncError> {
    let path = cache_path_at(working_dir);
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid hash cache path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Cache handle for one working directory.
///
/// Shared by reference between concurrent item operations; every mutation
/// merges one key under the lock and flushes immediately.
#[derive(Debug)]
pub struct HashCache {
    working_dir: PathBuf,
    state: Mutex<CacheState>,
}

impl HashCache {
    /// Open the cache for `working_dir`. Never fails: unreadable state is
    /// recovered according to the module failure policy.
    pub fn open(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        let mut state = CacheState::default();
        match load_at(&working_dir) {
            Ok(raw) => {
                state.tenants = raw
                    .into_iter()
                    .map(|(tenant, value)| {
                        let slot = TenantSlot {
                            raw: Some(value),
                            ..TenantSlot::default()
                        };
                        (tenant, slot)
                    })
                    .collect();
            }
            Err(err) => {
                warn!(error = %err, "starting with an empty hash cache");
                state.recoveries.push(CacheRecovery::ResetFile);
            }
        }
        Self {
            working_dir,
            state: Mutex::new(state),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Scoped view for `(working_dir, tenant)`.
    pub fn tenant(&self, tenant: &TenantId) -> TenantCache<'_> {
        TenantCache {
            cache: self,
            tenant: tenant.clone(),
        }
    }

    /// Recoveries applied so far, in the order they happened.
    pub fn recoveries(&self) -> Vec<CacheRecovery> {
        self.lock().recoveries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &CacheState) {
        let result = state
            .to_value()
            .map_err(SyncError::from)
            .and_then(|value| save_at(&self.working_dir, &value));
        if let Err(err) = result {
            warn!(
                dir = %self.working_dir.display(),
                error = %err,
                "failed to persist hash cache; keeping in-memory state"
            );
        }
    }

    /// `/`-separated path of `file` relative to the working directory.
    pub fn relative_key(&self, file: &Path) -> String {
        let relative = file.strip_prefix(&self.working_dir).unwrap_or(file);
        let mut key = String::new();
        for component in relative.components() {
            if let Component::Normal(part) = component {
                key.push('/');
                key.push_str(&part.to_string_lossy());
            }
        }
        if key.is_empty() {
            key.push('/');
        }
        key
    }
}

/// A [`HashCache`] narrowed to one tenant.
#[derive(Debug, Clone)]
pub struct TenantCache<'a> {
    cache: &'a HashCache,
    tenant: TenantId,
}

impl TenantCache<'_> {
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant
    }

    /// See [`HashCache::relative_key`].
    pub fn relative_key(&self, file: &Path) -> String {
        self.cache.relative_key(file)
    }

    /// Current scope, without mutation.
    pub fn snapshot(&self) -> TenantScope {
        self.cache.lock().scope_mut(&self.tenant).clone()
    }

    /// Merge `metadata` (and the fingerprint and relative path of
    /// `file_path`) into the entry keyed by `metadata.id`, then persist.
    ///
    /// With no metadata, an existing entry found by path has its hash
    /// refreshed; with neither argument this is a read. Only an unreadable
    /// `file_path` is an error.
    pub fn record_artifact(
        &self,
        file_path: Option<&Path>,
        metadata: Option<&RemoteItem>,
    ) -> Result<TenantScope, SyncError> {
        if file_path.is_none() && metadata.is_none() {
            return Ok(self.snapshot());
        }

        let located = match file_path {
            Some(path) => Some((self.cache.relative_key(path), fingerprint(path)?)),
            None => None,
        };

        let mut state = self.cache.lock();
        let slot = state.slot_mut(&self.tenant);

        let id = match (metadata, &located) {
            (Some(meta), _) => Some(meta.id.0.clone()),
            (None, Some((key, _))) => slot.find_by_path(key).map(|e| e.id.0.clone()),
            (None, None) => None,
        };
        let Some(id) = id else {
            debug!(tenant = %self.tenant, "no cache entry to refresh");
            return Ok(slot.scope.clone());
        };

        let entry = slot
            .scope
            .entries
            .entry(id.clone())
            .or_insert_with(|| CacheEntry::new(ArtifactId::from(id.as_str())));
        if let Some(meta) = metadata {
            entry.merge_metadata(meta);
        }
        if let Some((key, hash)) = located {
            entry.content_hash = Some(hash);
            slot.set_path(&id, key);
        }

        let updated = slot.scope.clone();
        self.cache.persist(&state);
        Ok(updated)
    }

    /// Drop the entry for `id`, if any, and persist.
    pub fn remove_artifact(&self, id: &ArtifactId) -> Option<CacheEntry> {
        let mut state = self.cache.lock();
        let removed = state.slot_mut(&self.tenant).remove(&id.0);
        if removed.is_some() {
            self.cache.persist(&state);
        }
        removed
    }

    /// Is the local file new or modified relative to the cache?
    ///
    /// A missing file is neither.
    pub fn is_locally_modified(&self, flags: SyncFlags, file_path: &Path) -> bool {
        if !file_path.is_file() {
            return false;
        }
        let Some(entry) = self.lookup_by_path(file_path) else {
            return flags.includes_new();
        };
        if !flags.includes_modified() {
            return false;
        }
        match (&entry.content_hash, fingerprint(file_path)) {
            (Some(stored), Ok(current)) => *stored != current,
            (None, Ok(_)) => true,
            (_, Err(err)) => {
                warn!(error = %err, "cannot fingerprint file; treating as modified");
                true
            }
        }
    }

    /// Is the remote item new or modified relative to the cache?
    ///
    /// A cached entry whose local file (`file_path`) is gone counts as
    /// absent, so the item is reported as new.
    pub fn is_remotely_modified(
        &self,
        flags: SyncFlags,
        remote: &RemoteItem,
        file_path: Option<&Path>,
    ) -> bool {
        let entry = self
            .lookup_by_id(&remote.id)
            .filter(|_| file_path.map_or(true, Path::exists));
        match entry {
            None => flags.includes_new(),
            Some(entry) => flags.includes_modified() && entry.rev != remote.rev,
        }
    }

    pub fn lookup_by_id(&self, id: &ArtifactId) -> Option<CacheEntry> {
        self.cache
            .lock()
            .scope_mut(&self.tenant)
            .entries
            .get(&id.0)
            .cloned()
    }

    /// Reverse lookup by the stored relative path.
    pub fn lookup_by_path(&self, file_path: &Path) -> Option<CacheEntry> {
        let key = self.cache.relative_key(file_path);
        self.cache
            .lock()
            .slot_mut(&self.tenant)
            .find_by_path(&key)
            .cloned()
    }

    /// Relative paths of all entries, in insertion order.
    pub fn list_tracked_paths(&self) -> Vec<String> {
        self.cache
            .lock()
            .scope_mut(&self.tenant)
            .entries
            .values()
            .filter_map(|e| e.path.clone())
            .collect()
    }

    pub fn last_pull_timestamp(&self) -> Option<DateTime<Utc>> {
        self.cache.lock().scope_mut(&self.tenant).last_pull_timestamp
    }

    pub fn set_last_pull_timestamp(&self, ts: DateTime<Utc>) {
        let mut state = self.cache.lock();
        state.scope_mut(&self.tenant).last_pull_timestamp = Some(ts);
        self.cache.persist(&state);
    }

    pub fn last_push_timestamp(&self) -> Option<DateTime<Utc>> {
        self.cache.lock().scope_mut(&self.tenant).last_push_timestamp
    }

    pub fn set_last_push_timestamp(&self, ts: DateTime<Utc>) {
        let mut state = self.cache.lock();
        state.scope_mut(&self.tenant).last_push_timestamp = Some(ts);
        self.cache.persist(&state);
    }
}
