//! Item Normalizer: raw catalog records → [`Item`].
//!
//! Each catalog backend hands over its own raw shape wrapped in a
//! [`RawItem`] variant, optionally paired with a [`RawDetail`] record. The
//! upstream JSON quirks (string-or-list fields, epoch timestamps, several
//! date formats) are decoded here and never leak into the rest of the
//! pipeline.
//!
//! [`normalize`] is total: it never fails. Missing optional fields stay
//! empty, except the summary, which gets a synthesized fallback.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

use crate::models::{
    FlatpakInfo, HomebrewFlavor, HomebrewInfo, Item, OsInfo, PackageKind, Release, ReleaseOrigin,
    Verification,
};

// ═══════════════════════════════════════════════════════════════════════
// Raw shapes
// ═══════════════════════════════════════════════════════════════════════

/// A JSON field that upstream sends either as one string or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StringOrList::One(s) if s.is_empty() => Vec::new(),
            StringOrList::One(s) => vec![s],
            StringOrList::Many(v) => v,
        }
    }
}

/// A hit of the Flathub collection/search API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlathubApp {
    #[serde(default, deserialize_with = "null_as_default")]
    pub app_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub developer_name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub project_license: Option<String>,
    #[serde(default)]
    pub main_categories: Option<StringOrList>,
    #[serde(default)]
    pub sub_categories: Option<Vec<String>>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub installs_last_month: Option<u64>,
    #[serde(default)]
    pub favorites_count: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub verification_verified: bool,
    #[serde(default)]
    pub verification_method: Option<String>,
    #[serde(default)]
    pub verification_login_name: Option<String>,
    #[serde(default)]
    pub verification_login_provider: Option<String>,
    #[serde(default)]
    pub verification_website: Option<String>,
    /// Filled in by the backend, not part of the upstream JSON.
    #[serde(skip)]
    pub catalog_url: String,
}

/// `null` decodes like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A Homebrew formula or cask named in a Brewfile or tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomebrewStub {
    pub flavor: HomebrewFlavor,
    /// `homebrew/core`, `homebrew/cask`, or a third-party tap name.
    pub tap: String,
    pub token: String,
    pub experimental: bool,
    pub catalog_url: String,
}

impl HomebrewStub {
    /// Native id as used in the canonical item id.
    ///
    /// Core formulae use their bare name, casks `cask/<token>`, and tap
    /// formulae their fully qualified `<owner>/<tap>/<name>`.
    pub fn native_id(&self) -> String {
        match self.flavor {
            HomebrewFlavor::Cask => format!("cask/{}", self.token),
            HomebrewFlavor::Formula if self.tap == CORE_TAP => self.token.clone(),
            HomebrewFlavor::Formula => format!("{}/{}", self.tap, self.token),
        }
    }

    /// Inverse of [`native_id`](HomebrewStub::native_id).
    pub fn from_native_id(native_id: &str) -> Self {
        let (flavor, tap, token) = if let Some(token) = native_id.strip_prefix("cask/") {
            (HomebrewFlavor::Cask, CASK_TAP.to_string(), token.to_string())
        } else {
            match native_id.rsplit_once('/') {
                Some((tap, token)) => (HomebrewFlavor::Formula, tap.to_string(), token.to_string()),
                None => (HomebrewFlavor::Formula, CORE_TAP.to_string(), native_id.to_string()),
            }
        };
        Self {
            flavor,
            tap,
            token,
            experimental: false,
            catalog_url: String::new(),
        }
    }
}

pub const CORE_TAP: &str = "homebrew/core";
pub const CASK_TAP: &str = "homebrew/cask";

/// A release object of the GitHub REST API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubRelease {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
}

/// Presentation settings of an OS release train.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsTrain {
    pub display_name: String,
    pub icon: String,
    /// Embedded notes are cut to this many characters; 0 disables the cut.
    pub notes_limit: usize,
}

/// One published build of an OS release train.
#[derive(Debug, Clone, Default)]
pub struct OsReleaseRecord {
    pub release: GithubRelease,
    pub train: OsTrain,
}

/// A catalog record as its backend produced it.
#[derive(Debug, Clone)]
pub enum RawItem {
    Flatpak(FlathubApp),
    Homebrew(HomebrewStub),
    OsRelease(OsReleaseRecord),
}

impl RawItem {
    /// A record carrying only an id, to be filled from detail.
    pub fn stub(kind: PackageKind, native_id: &str) -> Self {
        match kind {
            PackageKind::Flatpak => RawItem::Flatpak(FlathubApp {
                app_id: native_id.to_string(),
                ..Default::default()
            }),
            PackageKind::Homebrew => RawItem::Homebrew(HomebrewStub::from_native_id(native_id)),
            PackageKind::OsRelease => RawItem::OsRelease(OsReleaseRecord {
                release: GithubRelease {
                    tag_name: native_id.to_string(),
                    ..Default::default()
                },
                train: OsTrain::default(),
            }),
        }
    }

    pub fn kind(&self) -> PackageKind {
        match self {
            RawItem::Flatpak(_) => PackageKind::Flatpak,
            RawItem::Homebrew(_) => PackageKind::Homebrew,
            RawItem::OsRelease(_) => PackageKind::OsRelease,
        }
    }

    /// The upstream's own identifier, without namespace prefix.
    pub fn native_id(&self) -> String {
        match self {
            RawItem::Flatpak(app) => app.app_id.clone(),
            RawItem::Homebrew(stub) => stub.native_id(),
            RawItem::OsRelease(record) => record.release.tag_name.clone(),
        }
    }

    /// Canonical item id (`<prefix>:<native id>`).
    pub fn item_id(&self) -> String {
        self.kind().item_id(&self.native_id())
    }
}

/// A release entry embedded in catalog metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRelease {
    pub version: String,
    /// Upstream date text: `YYYY-MM-DD`, RFC 3339, or epoch seconds.
    pub date: String,
    pub description: String,
}

/// Rich per-item metadata from a catalog's detail endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDetail {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub developer_name: String,
    pub icon: String,
    pub version: String,
    pub license: String,
    /// Link collection keyed by kind (`homepage`, `bugtracker`, ...).
    pub urls: BTreeMap<String, String>,
    /// Newest first.
    pub releases: Vec<CatalogRelease>,
}

// ═══════════════════════════════════════════════════════════════════════
// Normalization
// ═══════════════════════════════════════════════════════════════════════

/// Map one raw record (plus optional detail) to an [`Item`].
pub fn normalize(raw: RawItem, detail: Option<&RawDetail>, fetched_at: DateTime<Utc>) -> Item {
    let empty = RawDetail::default();
    let detail = detail.unwrap_or(&empty);

    let mut item = match raw {
        RawItem::Flatpak(app) => normalize_flatpak(app, detail, fetched_at),
        RawItem::Homebrew(stub) => normalize_homebrew(stub, detail, fetched_at),
        RawItem::OsRelease(record) => normalize_os(record, fetched_at),
    };

    if item.summary.is_empty() {
        item.summary = fallback_summary(&item);
    }
    item
}

fn normalize_flatpak(app: FlathubApp, detail: &RawDetail, fetched_at: DateTime<Utc>) -> Item {
    let mut item = Item::bare(PackageKind::Flatpak, &app.app_id, fetched_at);

    item.name = first_non_empty(app.name, &detail.name);
    item.summary = first_non_empty(app.summary, &detail.summary);
    item.description = first_non_empty(app.description, &detail.description);
    item.developer_name = first_non_empty(app.developer_name, &detail.developer_name);
    item.icon = first_non_empty(app.icon, &detail.icon);
    item.license = first_non_empty(app.project_license, &detail.license);
    item.catalog_url = app.catalog_url;

    let mut categories = app.main_categories.map(StringOrList::into_vec).unwrap_or_default();
    categories.extend(app.sub_categories.unwrap_or_default());
    item.categories = categories;

    item.updated_at = app.updated_at.map(epoch_to_rfc3339).unwrap_or_default();

    let verification = if app.verification_verified {
        Some(Verification {
            method: app.verification_method.unwrap_or_default(),
            login_name: app.verification_login_name,
            login_provider: app.verification_login_provider,
            website: app.verification_website,
        })
    } else {
        None
    };
    item.flatpak = Some(FlatpakInfo {
        installs_last_month: app.installs_last_month.unwrap_or(0),
        favorites_count: app.favorites_count.unwrap_or(0),
        is_verified: app.verification_verified,
        verification,
        app_set: None,
    });

    apply_embedded_release(&mut item, detail);
    item
}

fn normalize_homebrew(stub: HomebrewStub, detail: &RawDetail, fetched_at: DateTime<Utc>) -> Item {
    let mut item = Item::bare(PackageKind::Homebrew, &stub.native_id(), fetched_at);

    item.name = if detail.name.is_empty() {
        stub.token.clone()
    } else {
        detail.name.clone()
    };
    item.summary = detail.summary.clone();
    item.description = detail.description.clone();
    item.icon = detail.icon.clone();
    item.license = detail.license.clone();
    item.version = detail.version.clone();
    item.catalog_url = stub.catalog_url;
    item.homebrew = Some(HomebrewInfo {
        flavor: stub.flavor,
        tap: stub.tap,
        token: stub.token,
        experimental: stub.experimental,
    });

    apply_embedded_release(&mut item, detail);
    item
}

fn normalize_os(record: OsReleaseRecord, fetched_at: DateTime<Utc>) -> Item {
    let OsReleaseRecord { release, train } = record;
    let info = parse_os_info(&release);
    let body = release.body.unwrap_or_default();
    let title = release
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| release.tag_name.clone());
    let date = release
        .published_at
        .or(release.created_at)
        .unwrap_or(fetched_at);
    let url = release.html_url.filter(|u| !u.is_empty());

    let mut item = Item::bare(PackageKind::OsRelease, &release.tag_name, fetched_at);
    item.name = format!("{} {}", train.display_name, info.stream)
        .trim()
        .to_string();
    item.summary = os_summary(&info);
    item.icon = train.icon;
    item.version = release.tag_name.clone();
    item.release_date = to_rfc3339(date);
    item.updated_at = item.release_date.clone();
    item.catalog_url = url.clone().unwrap_or_default();
    item.releases = vec![Release {
        version: release.tag_name.clone(),
        date,
        title,
        description: truncate_notes(&body, train.notes_limit),
        url,
        origin: ReleaseOrigin::CatalogEmbedded,
    }];
    item.description = body;
    item.os = Some(info);
    item
}

/// Keep only the newest catalog-embedded release and mirror it into the
/// item's version and release date.
fn apply_embedded_release(item: &mut Item, detail: &RawDetail) {
    let Some(latest) = detail.releases.first() else {
        return;
    };
    if latest.version.is_empty() {
        return;
    }

    let date = parse_catalog_date(&latest.date).unwrap_or(item.fetched_at);
    item.version = latest.version.clone();
    item.release_date = to_rfc3339(date);
    item.releases = vec![Release {
        version: latest.version.clone(),
        date,
        title: format!("Version {}", latest.version),
        description: latest.description.clone(),
        url: None,
        origin: ReleaseOrigin::CatalogEmbedded,
    }];
}

fn first_non_empty(primary: Option<String>, fallback: &str) -> String {
    match primary {
        Some(s) if !s.trim().is_empty() => s,
        _ => fallback.to_string(),
    }
}

fn fallback_summary(item: &Item) -> String {
    let name: &str = if item.name.is_empty() {
        item.id
            .split_once(':')
            .map(|(_, native)| native)
            .unwrap_or(&item.id)
    } else {
        &item.name
    };
    format!("{} package: {}", item.package_kind.label(), name)
}

// ═══════════════════════════════════════════════════════════════════════
// Timestamps
// ═══════════════════════════════════════════════════════════════════════

/// RFC 3339 with second precision and a `Z` suffix.
pub fn to_rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Epoch seconds → RFC 3339. Zero and out-of-range values yield `""`.
pub fn epoch_to_rfc3339(secs: i64) -> String {
    if secs <= 0 {
        return String::new();
    }
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(to_rfc3339)
        .unwrap_or_default()
}

/// Parse a catalog release date: `YYYY-MM-DD`, RFC 3339, or epoch seconds.
pub fn parse_catalog_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return day.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .filter(|secs| *secs > 0)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

// ═══════════════════════════════════════════════════════════════════════
// OS release trains
// ═══════════════════════════════════════════════════════════════════════

static FEDORA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"F(\d+)\.\d+").expect("valid regex"));
static COMMIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#([a-f0-9]+)").expect("valid regex"));
static TABLE_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\|\s*\*\*([^*|]+?)\*\*\s*\|\s*([^|]+?)\s*\|").expect("valid regex")
});

const MAJOR_PACKAGES: [&str; 4] = ["Podman", "Nvidia", "Docker", "Incus"];

/// Stream, build, Fedora base and package versions of one OS build.
///
/// Tags look like `stable-20260203`; names like
/// `stable-20260203: Stable (F43.20260203, #4132884)`; bodies carry
/// markdown tables with rows such as `| **Kernel** | 6.17.7 ➡️ 6.17.12 |`.
pub fn parse_os_info(release: &GithubRelease) -> OsInfo {
    let (stream, build_number) = match release.tag_name.split_once('-') {
        Some((stream, rest)) => {
            let build = rest.split('-').next().unwrap_or(rest);
            (stream.to_string(), build.to_string())
        }
        None => ("stable".to_string(), release.tag_name.clone()),
    };

    let name = release.name.as_deref().unwrap_or_default();
    let capture = |re: &Regex| {
        re.captures(name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    };

    let body = release.body.as_deref().unwrap_or_default();
    let major_packages: BTreeMap<String, String> = MAJOR_PACKAGES
        .iter()
        .filter_map(|pkg| {
            let version = package_version(body, pkg);
            (!version.is_empty()).then(|| (pkg.to_string(), version))
        })
        .collect();

    OsInfo {
        stream,
        build_number,
        fedora_version: capture(&FEDORA_RE),
        commit_hash: capture(&COMMIT_RE),
        kernel_version: package_version(body, "Kernel"),
        gnome_version: package_version(body, "Gnome"),
        mesa_version: package_version(body, "Mesa"),
        major_packages,
    }
}

/// Version cell of a `| **<package>** | <version> |` table row. When the
/// cell shows an upgrade (`old ➡️ new`), the new version is returned.
pub fn package_version(body: &str, package: &str) -> String {
    let Some(cell) = TABLE_ROW_RE
        .captures_iter(body)
        .find(|c| &c[1] == package)
        .and_then(|c| c.get(2))
    else {
        return String::new();
    };
    let cell = cell.as_str().trim();
    match cell.split_once("➡️") {
        Some((_, new)) => new.trim().to_string(),
        None => cell.to_string(),
    }
}

fn os_summary(info: &OsInfo) -> String {
    let stream = if info.stream == "gts" {
        "GTS (Long-Term Support)".to_string()
    } else {
        title_case(&info.stream)
    };
    let mut summary = format!("{} release based on Fedora {}", stream, info.fedora_version);
    if !info.kernel_version.is_empty() {
        summary.push_str(&format!(" with Kernel {}", info.kernel_version));
    }
    summary
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate_notes(body: &str, limit: usize) -> String {
    if limit == 0 {
        return body.to_string();
    }
    match body.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
