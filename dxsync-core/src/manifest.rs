//! Manifests: explicit, serializable declarations of which artifacts an
//! operation acts on.
//!
//! # Storage layout
//!
//! ```text
//! <working_dir>/assets/dxconfig/manifests/<name>.json
//! ```
//!
//! ```json
//! {
//!   "assets": { "/images/logo.png": { "id": "a1", "name": "logo.png", "path": "/images/logo.png" } },
//!   "types":  { "t1": { "id": "t1", "name": "Article" } },
//!   "sites":  { "default": { "id": "default", "pages": { "p1": { "id": "p1", "name": "Home" } } } }
//! }
//! ```
//!
//! In memory, pages are a [`Section::SiteScoped`] section keyed by site id;
//! on disk they are nested under `sites.<siteId>.pages`, so a pages section
//! cannot exist without a sites section.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{io_err, ManifestError};
use crate::remote::ManifestFetcher;
use crate::types::{ArtifactType, ManifestKey, RemoteItem, ServiceTier, SiteId};

/// Items of one flat section, keyed by id (or by path for assets).
pub type SectionItems = IndexMap<String, ManifestItem>;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// One artifact reference inside a manifest section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ManifestItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            path: Some(path.into()),
        }
    }

    fn key(&self, key: ManifestKey) -> Option<&str> {
        match key {
            ManifestKey::Id => self.id.as_deref(),
            ManifestKey::Path => self.path.as_deref(),
        }
    }
}

impl From<&RemoteItem> for ManifestItem {
    fn from(item: &RemoteItem) -> Self {
        Self {
            id: Some(item.id.0.clone()),
            name: item.name.clone(),
            path: item.path.clone(),
        }
    }
}

/// A manifest section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    Flat(SectionItems),
    SiteScoped(IndexMap<SiteId, SectionItems>),
}

impl Section {
    fn empty_for(artifact_type: ArtifactType) -> Self {
        if artifact_type.is_site_scoped() {
            Section::SiteScoped(IndexMap::new())
        } else {
            Section::Flat(IndexMap::new())
        }
    }

    /// Total number of items, across all sites for a site-scoped section.
    pub fn len(&self) -> usize {
        match self {
            Section::Flat(items) => items.len(),
            Section::SiteScoped(sites) => sites.values().map(IndexMap::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How results are merged into a write or deletions manifest section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    #[default]
    Append,
    Replace,
}

/// In-memory manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    sections: IndexMap<ArtifactType, Section>,
    /// Top-level keys this version does not know, kept for round-tripping.
    extra: IndexMap<String, Value>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items of a section, or `None` when the section (or, for pages, the
    /// sites section or the site itself) is absent.
    pub fn section(&self, artifact_type: ArtifactType, site: &SiteId) -> Option<&SectionItems> {
        if artifact_type.is_site_scoped() {
            let sites = self.flat(ArtifactType::Sites)?;
            if !sites.contains_key(&site.0) {
                return None;
            }
            match self.sections.get(&artifact_type)? {
                Section::SiteScoped(by_site) => by_site.get(site),
                Section::Flat(_) => None,
            }
        } else {
            self.flat(artifact_type)
        }
    }

    pub fn raw_section(&self, artifact_type: ArtifactType) -> Option<&Section> {
        self.sections.get(&artifact_type)
    }

    /// Top-level sections that are not artifact types, as read.
    pub fn extra_sections(&self) -> &IndexMap<String, Value> {
        &self.extra
    }

    /// Sections holding at least one item, in declared execution order.
    pub fn artifact_types(&self) -> Vec<ArtifactType> {
        ArtifactType::ALL
            .into_iter()
            .filter(|t| self.sections.get(t).is_some_and(|s| !s.is_empty()))
            .collect()
    }

    /// Insert items keyed by their manifest key; items lacking the key are
    /// skipped.
    pub fn append(&mut self, artifact_type: ArtifactType, items: &[ManifestItem], site: &SiteId) {
        let key = artifact_type.manifest_key();
        let target = self.section_mut(artifact_type, site);
        for item in items {
            match item.key(key) {
                Some(k) => {
                    target.insert(k.to_owned(), item.clone());
                }
                None => warn!(
                    section = artifact_type.section_name(),
                    ?item,
                    "skipping manifest item without a {} field",
                    match key {
                        ManifestKey::Id => "id",
                        ManifestKey::Path => "path",
                    }
                ),
            }
        }
    }

    /// Clear the section (one site's pages for pages), then append.
    pub fn replace(&mut self, artifact_type: ArtifactType, items: &[ManifestItem], site: &SiteId) {
        self.section_mut(artifact_type, site).clear();
        self.append(artifact_type, items, site);
    }

    /// Merge a run's results. An empty batch leaves the manifest as is, in
    /// either mode.
    pub fn update(
        &mut self,
        mode: UpdateMode,
        artifact_type: ArtifactType,
        items: &[ManifestItem],
        site: &SiteId,
    ) {
        if items.is_empty() {
            return;
        }
        match mode {
            UpdateMode::Append => self.append(artifact_type, items, site),
            UpdateMode::Replace => self.replace(artifact_type, items, site),
        }
    }

    fn flat(&self, artifact_type: ArtifactType) -> Option<&SectionItems> {
        match self.sections.get(&artifact_type)? {
            Section::Flat(items) => Some(items),
            Section::SiteScoped(_) => None,
        }
    }

    fn section_mut(&mut self, artifact_type: ArtifactType, site: &SiteId) -> &mut SectionItems {
        if artifact_type.is_site_scoped() {
            // Pages need their parent site entry to exist.
            if let Section::Flat(sites) = self
                .sections
                .entry(ArtifactType::Sites)
                .or_insert_with(|| Section::Flat(IndexMap::new()))
            {
                sites.entry(site.0.clone()).or_default();
            }
        }

        let section = self
            .sections
            .entry(artifact_type)
            .or_insert_with(|| Section::empty_for(artifact_type));
        match section {
            Section::Flat(items) => items,
            Section::SiteScoped(by_site) => by_site.entry(site.clone()).or_default(),
        }
    }

    // -- serde bridging ------------------------------------------------------

    fn from_raw(mut raw: IndexMap<String, Value>) -> Result<Self, serde_json::Error> {
        let mut manifest = Manifest::default();

        if let Some(sites) = raw.shift_remove(ArtifactType::Sites.section_name()) {
            let sites: IndexMap<String, RawSiteEntry> = serde_json::from_value(sites)?;
            let mut site_items = IndexMap::new();
            let mut pages = IndexMap::new();
            for (site_id, entry) in sites {
                if let Some(site_pages) = entry.pages {
                    pages.insert(SiteId::from(site_id.clone()), site_pages);
                }
                site_items.insert(site_id, entry.item);
            }
            manifest
                .sections
                .insert(ArtifactType::Sites, Section::Flat(site_items));
            if !pages.is_empty() {
                manifest
                    .sections
                    .insert(ArtifactType::Pages, Section::SiteScoped(pages));
            }
        }

        for (name, value) in raw {
            match ArtifactType::from_section_name(&name) {
                Some(t) if !t.is_site_scoped() => {
                    let items: SectionItems = serde_json::from_value(value)?;
                    manifest.sections.insert(t, Section::Flat(items));
                }
                _ => {
                    debug!(section = %name, "keeping unrecognised manifest section as-is");
                    manifest.extra.insert(name, value);
                }
            }
        }
        Ok(manifest)
    }

    fn to_raw(&self) -> Result<IndexMap<String, Value>, serde_json::Error> {
        let mut raw = IndexMap::new();
        for t in ArtifactType::ALL {
            match t {
                ArtifactType::Pages => {}
                ArtifactType::Sites => {
                    if let Some(sites) = self.sites_raw()? {
                        raw.insert(t.section_name().to_owned(), sites);
                    }
                }
                _ => {
                    if let Some(items) = self.flat(t) {
                        raw.insert(t.section_name().to_owned(), serde_json::to_value(items)?);
                    }
                }
            }
        }
        for (name, value) in &self.extra {
            raw.insert(name.clone(), value.clone());
        }
        Ok(raw)
    }

    fn sites_raw(&self) -> Result<Option<Value>, serde_json::Error> {
        let sites = self.flat(ArtifactType::Sites);
        let pages = match self.sections.get(&ArtifactType::Pages) {
            Some(Section::SiteScoped(by_site)) => Some(by_site),
            _ => None,
        };
        if sites.is_none() && pages.is_none() {
            return Ok(None);
        }

        let mut out: IndexMap<String, RawSiteEntry> = IndexMap::new();
        for (site_id, item) in sites.into_iter().flatten() {
            out.insert(
                site_id.clone(),
                RawSiteEntry {
                    item: item.clone(),
                    pages: None,
                },
            );
        }
        for (site_id, site_pages) in pages.into_iter().flatten() {
            out.entry(site_id.0.clone())
                .or_insert_with(|| RawSiteEntry {
                    item: ManifestItem::default(),
                    pages: None,
                })
                .pages = Some(site_pages.clone());
        }
        serde_json::to_value(out).map(Some)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RawSiteEntry {
    #[serde(flatten)]
    item: ManifestItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pages: Option<SectionItems>,
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_raw()
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, Value>::deserialize(deserializer)?;
        Manifest::from_raw(raw).map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Paths + persistence
// ---------------------------------------------------------------------------

/// `<working_dir>/assets/dxconfig/manifests/`. Pure, no I/O.
pub fn manifests_dir_at(working_dir: &Path) -> PathBuf {
    working_dir
        .join("assets")
        .join("dxconfig")
        .join("manifests")
}

/// Resolve a manifest name to a local file path.
///
/// Bare names land in [`manifests_dir_at`]; names containing a path
/// separator are taken as paths. `.json` is appended when missing.
pub fn resolve_path_at(working_dir: &Path, name: &str) -> PathBuf {
    let file = with_json_suffix(name);
    if has_separator(name) {
        PathBuf::from(file)
    } else {
        manifests_dir_at(working_dir).join(file)
    }
}

/// Remote location of a manifest name on the content store.
pub fn remote_path(name: &str) -> String {
    let file = with_json_suffix(name);
    if has_separator(name) {
        file
    } else {
        format!("/dxconfig/manifests/{file}")
    }
}

fn has_separator(name: &str) -> bool {
    name.contains('/') || name.contains(std::path::MAIN_SEPARATOR)
}

fn with_json_suffix(name: &str) -> String {
    if name.ends_with(".json") {
        name.to_owned()
    } else {
        format!("{name}.json")
    }
}

/// Load a manifest file. `Ok(None)` when the file does not exist.
pub fn load_at(path: &Path) -> Result<Option<Manifest>, ManifestError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read(path).map_err(|e| io_err(path, e))?;
    parse(&contents, &path.display().to_string()).map(Some)
}

fn parse(bytes: &[u8], location: &str) -> Result<Manifest, ManifestError> {
    serde_json::from_slice(bytes).map_err(|source| ManifestError::Invalid {
        location: location.to_owned(),
        source,
    })
}

/// Write `manifest` as two-space pretty JSON, creating parent directories.
pub fn try_save_at(path: &Path, manifest: &Manifest) -> Result<(), ManifestError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let json = serde_json::to_string_pretty(manifest).map_err(|source| ManifestError::Invalid {
        location: path.display().to_string(),
        source,
    })?;
    std::fs::write(path, json).map_err(|e| io_err(path, e))
}

/// [`try_save_at`], logging instead of failing. Returns whether the write
/// succeeded.
pub fn save_at(path: &Path, manifest: &Manifest) -> bool {
    match try_save_at(path, manifest) {
        Ok(()) => true,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to save manifest");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Which manifests a run uses and how they are located.
#[derive(Debug, Clone, Default)]
pub struct ManifestOptions {
    pub read: Option<String>,
    pub write: Option<String>,
    pub deletions: Option<String>,
    /// Download the read manifest from the remote service.
    pub remote_fetch: bool,
    pub mode: UpdateMode,
    pub tier: ServiceTier,
    pub default_site_id: SiteId,
}

#[derive(Debug, Clone)]
struct ManifestFile {
    path: PathBuf,
    manifest: Manifest,
}

impl ManifestFile {
    fn open(path: PathBuf) -> Result<Self, ManifestError> {
        let manifest = load_at(&path)?.unwrap_or_default();
        Ok(Self { path, manifest })
    }
}

/// The read / write / deletions manifests of one run.
///
/// The read manifest is fixed after [`ManifestStore::initialize`]; the
/// write and deletions manifests accumulate results and are written once
/// by [`ManifestStore::save_all`].
#[derive(Debug, Clone, Default)]
pub struct ManifestStore {
    read: Option<Manifest>,
    write: Option<ManifestFile>,
    deletions: Option<ManifestFile>,
    mode: UpdateMode,
    default_site_id: SiteId,
}

impl ManifestStore {
    /// Load every manifest named in `options`.
    ///
    /// Fails before any transfer can start: `NotFound` for a missing read
    /// manifest, `Invalid` for unparsable JSON in any of them, and
    /// `Incompatible` when the read manifest needs a section the tier lacks.
    pub fn initialize(
        working_dir: &Path,
        options: &ManifestOptions,
        fetcher: Option<&dyn ManifestFetcher>,
    ) -> Result<Self, ManifestError> {
        let read = match options.read.as_deref() {
            None => None,
            Some(name) if options.remote_fetch => {
                let location = remote_path(name);
                let fetcher = fetcher.ok_or_else(|| ManifestError::Fetch {
                    location: location.clone(),
                    reason: "no remote fetcher configured".to_owned(),
                })?;
                let bytes = fetcher.fetch(&location)?;
                Some(parse(&bytes, &location)?)
            }
            Some(name) => {
                let path = resolve_path_at(working_dir, name);
                let manifest = load_at(&path)?.ok_or_else(|| ManifestError::NotFound {
                    location: path.display().to_string(),
                })?;
                Some(manifest)
            }
        };

        if let Some(manifest) = &read {
            check_tier(manifest, options.tier)?;
        }

        let write = options
            .write
            .as_deref()
            .map(|name| ManifestFile::open(resolve_path_at(working_dir, name)))
            .transpose()?;
        let deletions = options
            .deletions
            .as_deref()
            .map(|name| ManifestFile::open(resolve_path_at(working_dir, name)))
            .transpose()?;

        Ok(Self {
            read,
            write,
            deletions,
            mode: options.mode,
            default_site_id: options.default_site_id.clone(),
        })
    }

    pub fn read_manifest(&self) -> Option<&Manifest> {
        self.read.as_ref()
    }

    pub fn write_manifest(&self) -> Option<&Manifest> {
        self.write.as_ref().map(|f| &f.manifest)
    }

    pub fn deletions_manifest(&self) -> Option<&Manifest> {
        self.deletions.as_ref().map(|f| &f.manifest)
    }

    pub fn has_read_manifest(&self) -> bool {
        self.read.is_some()
    }

    /// A section of the read manifest; pages use `site` or the default site.
    pub fn section(&self, artifact_type: ArtifactType, site: Option<&SiteId>) -> Option<&SectionItems> {
        let site = site.unwrap_or(&self.default_site_id);
        self.read.as_ref()?.section(artifact_type, site)
    }

    /// Artifact types the read manifest puts in scope.
    pub fn artifact_types(&self) -> Vec<ArtifactType> {
        self.read
            .as_ref()
            .map(Manifest::artifact_types)
            .unwrap_or_default()
    }

    /// Merge transferred items into the write manifest, if one is configured.
    pub fn record_written(
        &mut self,
        artifact_type: ArtifactType,
        items: &[ManifestItem],
        site: Option<&SiteId>,
    ) {
        let site = site.unwrap_or(&self.default_site_id).clone();
        if let Some(file) = self.write.as_mut() {
            file.manifest.update(self.mode, artifact_type, items, &site);
        }
    }

    /// Merge deleted items into the deletions manifest, if one is configured.
    pub fn record_deleted(
        &mut self,
        artifact_type: ArtifactType,
        items: &[ManifestItem],
        site: Option<&SiteId>,
    ) {
        let site = site.unwrap_or(&self.default_site_id).clone();
        if let Some(file) = self.deletions.as_mut() {
            file.manifest.update(self.mode, artifact_type, items, &site);
        }
    }

    /// Write the write and deletions manifests. Failures are logged only.
    pub fn save_all(&self) {
        for file in [&self.write, &self.deletions].into_iter().flatten() {
            save_at(&file.path, &file.manifest);
        }
    }
}

fn check_tier(manifest: &Manifest, tier: ServiceTier) -> Result<(), ManifestError> {
    for t in manifest.sections.keys() {
        if !tier.supports(*t) {
            return Err(ManifestError::Incompatible {
                artifact_type: *t,
                tier,
            });
        }
    }
    Ok(())
}
