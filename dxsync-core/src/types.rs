//! Domain types shared by the dxsync crates.
//!
//! Paths on disk are `PathBuf`; paths as the remote service knows them
//! (web-addressable asset paths, manifest paths) stay `String`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable identifier of an artifact on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId(pub String);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ArtifactId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArtifactId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Remote account / namespace a working directory syncs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a site; pages are always scoped to one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteId(pub String);

impl SiteId {
    pub const DEFAULT: &'static str = "default";
}

impl Default for SiteId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_owned())
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SiteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SiteId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Artifact types
// ---------------------------------------------------------------------------

/// Kind of synchronized content.
///
/// Variant order is the execution order of a multi-type run: types that
/// other artifacts may reference come first, sites come before pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    ImageProfiles,
    Categories,
    Assets,
    Renditions,
    Layouts,
    Types,
    LayoutMappings,
    Content,
    Sites,
    Pages,
    PublishingSources,
}

/// Field an artifact is keyed by inside its manifest section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKey {
    Id,
    Path,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 11] = [
        ArtifactType::ImageProfiles,
        ArtifactType::Categories,
        ArtifactType::Assets,
        ArtifactType::Renditions,
        ArtifactType::Layouts,
        ArtifactType::Types,
        ArtifactType::LayoutMappings,
        ArtifactType::Content,
        ArtifactType::Sites,
        ArtifactType::Pages,
        ArtifactType::PublishingSources,
    ];

    /// Manifest section name, also used in options files and log output.
    pub fn section_name(self) -> &'static str {
        match self {
            ArtifactType::ImageProfiles => "image-profiles",
            ArtifactType::Categories => "categories",
            ArtifactType::Assets => "assets",
            ArtifactType::Renditions => "renditions",
            ArtifactType::Layouts => "layouts",
            ArtifactType::Types => "types",
            ArtifactType::LayoutMappings => "layout-mappings",
            ArtifactType::Content => "content",
            ArtifactType::Sites => "sites",
            ArtifactType::Pages => "pages",
            ArtifactType::PublishingSources => "publishing-sources",
        }
    }

    pub fn from_section_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.section_name() == name)
    }

    /// Assets are keyed by path: several resource revisions can share an
    /// id across renames while the web-addressable path stays put.
    pub fn manifest_key(self) -> ManifestKey {
        match self {
            ArtifactType::Assets => ManifestKey::Path,
            _ => ManifestKey::Id,
        }
    }

    /// Pages live under `sites.<siteId>.pages` rather than at the top level.
    pub fn is_site_scoped(self) -> bool {
        matches!(self, ArtifactType::Pages)
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section_name())
    }
}

impl FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_section_name(&s.to_ascii_lowercase()).ok_or_else(|| {
            let known: Vec<_> = Self::ALL.iter().map(|t| t.section_name()).collect();
            format!("unknown artifact type '{s}'; expected one of: {}", known.join(", "))
        })
    }
}

// ---------------------------------------------------------------------------
// Service tier
// ---------------------------------------------------------------------------

/// Feature level of the remote service the tenant is provisioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTier {
    #[default]
    Full,
    Base,
}

impl ServiceTier {
    pub fn supports(self, artifact_type: ArtifactType) -> bool {
        match self {
            ServiceTier::Full => true,
            ServiceTier::Base => !matches!(
                artifact_type,
                ArtifactType::Sites
                    | ArtifactType::Pages
                    | ArtifactType::Layouts
                    | ArtifactType::LayoutMappings
            ),
        }
    }
}

impl fmt::Display for ServiceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceTier::Full => write!(f, "full"),
            ServiceTier::Base => write!(f, "base"),
        }
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Artifact metadata as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    pub id: ArtifactId,
    /// Opaque remote version marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Id of the binary resource backing this artifact, if stored apart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl RemoteItem {
    pub fn new(id: impl Into<ArtifactId>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            name: None,
            path: None,
            last_modified: None,
            resource: None,
        }
    }

    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = Some(rev.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// A local artifact file discovered by a per-type helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalItem {
    pub id: Option<ArtifactId>,
    pub name: Option<String>,
    /// Absolute path of the artifact file.
    pub path: PathBuf,
}

impl LocalItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: None,
            name: None,
            path: path.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<ArtifactId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Change flags
// ---------------------------------------------------------------------------

/// Which change categories a modified-query should report.
///
/// An empty set behaves like [`SyncFlags::EITHER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncFlags {
    pub new: bool,
    pub modified: bool,
}

impl SyncFlags {
    pub const NEW: SyncFlags = SyncFlags {
        new: true,
        modified: false,
    };
    pub const MODIFIED: SyncFlags = SyncFlags {
        new: false,
        modified: true,
    };
    pub const EITHER: SyncFlags = SyncFlags {
        new: true,
        modified: true,
    };

    pub fn includes_new(self) -> bool {
        self.new || !self.modified
    }

    pub fn includes_modified(self) -> bool {
        self.modified || !self.new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(ArtifactId::from("a1").to_string(), "a1");
        assert_eq!(TenantId::from("t-01").to_string(), "t-01");
        assert_eq!(SiteId::default().to_string(), "default");
    }

    #[test]
    fn section_names_roundtrip() {
        for t in ArtifactType::ALL {
            assert_eq!(ArtifactType::from_section_name(t.section_name()), Some(t));
        }
        assert_eq!(ArtifactType::from_section_name("widgets"), None);
    }

    #[test]
    fn declared_order_puts_sites_before_pages() {
        let pos = |t| ArtifactType::ALL.iter().position(|x| *x == t).unwrap();
        assert!(pos(ArtifactType::Sites) < pos(ArtifactType::Pages));
        assert!(pos(ArtifactType::Categories) < pos(ArtifactType::Content));
        assert!(pos(ArtifactType::ImageProfiles) < pos(ArtifactType::Assets));
        let mut sorted = ArtifactType::ALL;
        sorted.sort();
        assert_eq!(sorted, ArtifactType::ALL);
    }

    #[test]
    fn only_assets_are_keyed_by_path() {
        assert_eq!(ArtifactType::Assets.manifest_key(), ManifestKey::Path);
        assert_eq!(ArtifactType::Types.manifest_key(), ManifestKey::Id);
        assert_eq!(ArtifactType::Pages.manifest_key(), ManifestKey::Id);
    }

    #[test]
    fn base_tier_excludes_site_features() {
        assert!(!ServiceTier::Base.supports(ArtifactType::Pages));
        assert!(!ServiceTier::Base.supports(ArtifactType::LayoutMappings));
        assert!(ServiceTier::Base.supports(ArtifactType::Content));
        assert!(ServiceTier::Full.supports(ArtifactType::Sites));
    }

    #[test]
    fn empty_flags_mean_either() {
        let empty = SyncFlags::default();
        assert!(empty.includes_new() && empty.includes_modified());
        assert!(SyncFlags::NEW.includes_new());
        assert!(!SyncFlags::NEW.includes_modified());
        assert!(!SyncFlags::MODIFIED.includes_new());
    }

    #[test]
    fn artifact_type_parses_case_insensitively() {
        assert_eq!("Layout-Mappings".parse::<ArtifactType>(), Ok(ArtifactType::LayoutMappings));
        assert!("bogus".parse::<ArtifactType>().is_err());
    }
}
