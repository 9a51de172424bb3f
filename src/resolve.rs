//! Source Resolver and the manual override table.
//!
//! Resolution order, first success wins:
//!
//! 1. An entry for the item id in the [`OverrideTable`], returned verbatim.
//! 2. The detail record's `homepage` link, then `bugtracker`, then the first
//!    remaining link in lexicographic key order.
//! 3. The chosen URL is classified: `github.com` and any `gitlab` host get
//!    `owner/repo` extracted; everything else is kept as a bare URL.
//!
//! No URL at all means no source repository, which is a normal outcome.

use anyhow::{Context, Result};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::models::{HostKind, SourceRepo};
use crate::normalize::RawDetail;

// ═══════════════════════════════════════════════════════════════════════
// Override table
// ═══════════════════════════════════════════════════════════════════════

/// One manually curated repository entry.
///
/// ```toml
/// ["flatpak:org.gnome.World.Secrets"]
/// host_kind = "gitlab"
/// url = "https://gitlab.gnome.org/World/secrets"
/// owner = "World"
/// repo = "secrets"
/// notes = "homepage points at the GNOME wiki"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideEntry {
    pub host_kind: HostKind,
    pub url: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OverrideEntry {
    pub fn to_source_repo(&self) -> SourceRepo {
        SourceRepo {
            host_kind: self.host_kind,
            url: self.url.clone(),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
        }
    }
}

/// Item id → curated [`SourceRepo`]. Read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideTable {
    entries: BTreeMap<String, OverrideEntry>,
}

impl OverrideTable {
    pub fn new(entries: BTreeMap<String, OverrideEntry>) -> Self {
        Self { entries }
    }

    /// Parse the TOML form. Any schema violation rejects the whole table.
    pub fn parse(content: &str) -> Result<Self> {
        let entries: BTreeMap<String, OverrideEntry> =
            toml::from_str(content).context("Failed to parse override table")?;
        Ok(Self { entries })
    }

    /// Load from `path`, degrading to an empty table on any problem.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "override table unreadable, using none");
                return Self::default();
            }
        };

        match Self::parse(&content) {
            Ok(table) => {
                info!(path = %path.display(), entries = table.len(), "loaded source overrides");
                table
            }
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{e:#}"), "override table malformed, using none");
                Self::default()
            }
        }
    }

    pub fn get(&self, item_id: &str) -> Option<&OverrideEntry> {
        self.entries.get(item_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OverrideEntry)> {
        self.entries.iter()
    }
}

static GLOBAL_OVERRIDES: OnceCell<OverrideTable> = OnceCell::new();

/// Install the process-wide override table. Only the first call has an
/// effect; later calls return the table already installed.
pub fn init_global(table: OverrideTable) -> &'static OverrideTable {
    GLOBAL_OVERRIDES.get_or_init(|| table)
}

/// The process-wide override table, empty if never initialised.
pub fn global() -> &'static OverrideTable {
    GLOBAL_OVERRIDES.get_or_init(OverrideTable::default)
}

// ═══════════════════════════════════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════════════════════════════════

static GITHUB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"github\.com/([^/\s?#]+)/([^/\s?#]+)").expect("valid regex")
});
static GITLAB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(gitlab\.[^/\s?#]*)/([^/\s?#]+)/([^/\s?#]+)").expect("valid regex")
});

/// Determines the authoritative source repository of an item.
pub struct SourceResolver<'a> {
    overrides: &'a OverrideTable,
}

impl<'a> SourceResolver<'a> {
    pub fn new(overrides: &'a OverrideTable) -> Self {
        Self { overrides }
    }

    pub fn resolve(&self, item_id: &str, detail: Option<&RawDetail>) -> Option<SourceRepo> {
        if let Some(entry) = self.overrides.get(item_id) {
            info!(item = %item_id, url = %entry.url, "applied source override");
            return Some(entry.to_source_repo());
        }

        let url = detail.and_then(|d| pick_url(&d.urls))?;
        let repo = classify_url(url);
        debug!(item = %item_id, host = %repo.host_kind, url = %repo.url, "resolved source repository");
        Some(repo)
    }
}

/// `homepage`, then `bugtracker`, then the first other non-empty link.
pub fn pick_url(urls: &BTreeMap<String, String>) -> Option<&str> {
    let non_empty = |key: &str| urls.get(key).map(|u| u.trim()).filter(|u| !u.is_empty());

    non_empty("homepage")
        .or_else(|| non_empty("bugtracker"))
        .or_else(|| {
            urls.values()
                .map(|u| u.trim())
                .find(|u| !u.is_empty())
        })
}

/// Classify a URL by host and extract `owner/repo` where possible.
///
/// A fully resolved GitHub/GitLab repository gets a canonical
/// `https://<host>/<owner>/<repo>` URL; anything else keeps the URL as given.
pub fn classify_url(url: &str) -> SourceRepo {
    if url.contains("github.com") {
        return match GITHUB_RE.captures(url) {
            Some(caps) => {
                let owner = caps[1].to_string();
                let repo = clean_repo(&caps[2]);
                if repo.is_empty() {
                    SourceRepo::url_only(HostKind::Github, url)
                } else {
                    SourceRepo {
                        host_kind: HostKind::Github,
                        url: format!("https://github.com/{}/{}", owner, repo),
                        owner: Some(owner),
                        repo: Some(repo),
                    }
                }
            }
            None => SourceRepo::url_only(HostKind::Github, url),
        };
    }

    if url.contains("gitlab") {
        return match GITLAB_RE.captures(url) {
            Some(caps) => {
                let host = caps[1].to_string();
                let owner = caps[2].to_string();
                let repo = clean_repo(&caps[3]);
                if repo.is_empty() || repo == "-" {
                    SourceRepo::url_only(HostKind::Gitlab, url)
                } else {
                    SourceRepo {
                        host_kind: HostKind::Gitlab,
                        url: format!("https://{}/{}/{}", host, owner, repo),
                        owner: Some(owner),
                        repo: Some(repo),
                    }
                }
            }
            None => SourceRepo::url_only(HostKind::Gitlab, url),
        };
    }

    SourceRepo::url_only(HostKind::Other, url)
}

fn clean_repo(raw: &str) -> String {
    raw.trim_end_matches('/').trim_end_matches(".git").to_string()
}
