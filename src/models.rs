//! Core data models used throughout Release Harness.
//!
//! These types represent the items, source repositories, and releases that
//! flow through the collection and enrichment pipeline, plus the output
//! document written at the end of a run. Field names serialize in camelCase
//! because the output is consumed by a JavaScript front end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which upstream catalog an [`Item`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageKind {
    Flatpak,
    Homebrew,
    OsRelease,
}

impl PackageKind {
    /// Namespace prefix used to build canonical item ids.
    ///
    /// Keeps the identifier spaces of the different catalogs apart, so a
    /// Homebrew formula can never collide with a Flatpak app id.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            PackageKind::Flatpak => "flatpak",
            PackageKind::Homebrew => "homebrew",
            PackageKind::OsRelease => "os",
        }
    }

    /// Build the canonical `"<prefix>:<native id>"` item id.
    pub fn item_id(&self, native_id: &str) -> String {
        format!("{}:{}", self.id_prefix(), native_id)
    }

    /// Human-readable label used in synthesized summaries.
    pub fn label(&self) -> &'static str {
        match self {
            PackageKind::Flatpak => "Flatpak",
            PackageKind::Homebrew => "Homebrew",
            PackageKind::OsRelease => "OS release",
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id_prefix())
    }
}

/// Hosting platform of a source repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    Github,
    Gitlab,
    Other,
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostKind::Github => "github",
            HostKind::Gitlab => "gitlab",
            HostKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Resolved identity of an item's canonical code repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRepo {
    pub host_kind: HostKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

impl SourceRepo {
    /// A repository known only by URL.
    pub fn url_only(host_kind: HostKind, url: impl Into<String>) -> Self {
        Self {
            host_kind,
            url: url.into(),
            owner: None,
            repo: None,
        }
    }

    /// `"owner/repo"` when both halves were resolved and are non-empty.
    pub fn project_path(&self) -> Option<String> {
        match (self.owner.as_deref(), self.repo.as_deref()) {
            (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => {
                Some(format!("{}/{}", owner, repo))
            }
            _ => None,
        }
    }
}

/// Provenance of a [`Release`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseOrigin {
    /// Published on the source repository host (GitHub/GitLab releases).
    RepoHostRelease,
    /// Embedded in catalog metadata (appstream, OS release feed).
    CatalogEmbedded,
    Unknown,
}

impl ReleaseOrigin {
    /// Sort rank: lower ranks are shown first.
    pub fn rank(&self) -> u8 {
        match self {
            ReleaseOrigin::RepoHostRelease => 0,
            ReleaseOrigin::CatalogEmbedded => 1,
            ReleaseOrigin::Unknown => 2,
        }
    }
}

/// One changelog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub version: String,
    pub date: DateTime<Utc>,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub origin: ReleaseOrigin,
}

/// Flathub verification details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Flatpak-specific metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatpakInfo {
    #[serde(default)]
    pub installs_last_month: u64,
    #[serde(default)]
    pub favorites_count: u64,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    /// Curated app set the id was listed in (e.g. `"core"`, `"dx"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_set: Option<String>,
}

/// Formula or cask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HomebrewFlavor {
    Formula,
    Cask,
}

/// Homebrew-specific metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomebrewInfo {
    pub flavor: HomebrewFlavor,
    /// Tap the package lives in, `homebrew/core` for the main catalog.
    pub tap: String,
    pub token: String,
    #[serde(default)]
    pub experimental: bool,
}

/// Build/stream metadata for an OS release train.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsInfo {
    pub stream: String,
    pub build_number: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fedora_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kernel_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gnome_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mesa_version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub major_packages: BTreeMap<String, String>,
}

/// A normalized package, app, or release-train entry.
///
/// Created once by the normalizer, given its [`SourceRepo`] by the resolver,
/// and mutated at most once more by the enrichment orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub package_kind: PackageKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub developer_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub license: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release_date: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub catalog_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_repo: Option<SourceRepo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub releases: Vec<Release>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flatpak: Option<FlatpakInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homebrew: Option<HomebrewInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsInfo>,
}

impl Item {
    /// An item with only its identity filled in.
    pub fn bare(kind: PackageKind, native_id: &str, fetched_at: DateTime<Utc>) -> Self {
        Self {
            id: kind.item_id(native_id),
            name: String::new(),
            summary: String::new(),
            description: String::new(),
            package_kind: kind,
            developer_name: String::new(),
            icon: String::new(),
            license: String::new(),
            categories: Vec::new(),
            updated_at: String::new(),
            version: String::new(),
            release_date: String::new(),
            catalog_url: String::new(),
            source_repo: None,
            releases: Vec::new(),
            fetched_at,
            flatpak: None,
            homebrew: None,
            os: None,
        }
    }

    /// Host kind of the resolved source repository, if any.
    pub fn host_kind(&self) -> Option<HostKind> {
        self.source_repo.as_ref().map(|r| r.host_kind)
    }
}

/// Aggregate counts over the final item set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub items_total: usize,
    #[serde(rename = "itemsWithGitHubRepo")]
    pub items_with_github_repo: usize,
    #[serde(rename = "itemsWithGitLabRepo")]
    pub items_with_gitlab_repo: usize,
    pub items_with_changelogs: usize,
    pub total_releases: usize,
    pub flatpak_count: usize,
    pub homebrew_count: usize,
    pub os_count: usize,
}

/// Wall-clock timings per pipeline stage, formatted for humans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub flatpak_fetch_duration: String,
    pub homebrew_fetch_duration: String,
    pub os_fetch_duration: String,
    pub enrichment_duration: String,
}

/// Run metadata written ahead of the items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub schema_version: String,
    pub generated_at: String,
    pub generated_by: String,
    pub build_duration: String,
    pub stats: Stats,
    pub performance: Performance,
}

/// The document written at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputData {
    pub metadata: Metadata,
    pub items: Vec<Item>,
}
