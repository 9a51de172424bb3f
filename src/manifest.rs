//! Manifest scraping: Brewfiles and Homebrew formula files.
//!
//! The curated package lists are plain-text Brewfiles (`brew "bat"`,
//! `cask "font-fira-code"`, `flatpak "org.gnome.Calculator"`), fetched raw
//! from the repository configured under `[manifests]`. Tap formulae are Ruby
//! files from which a handful of metadata lines are scraped.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::ManifestsConfig;
use crate::error::FetchError;
use crate::http;

static BREW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*brew\s+"([^"]+)""#).expect("valid regex"));
static CASK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*cask\s+"([^"]+)""#).expect("valid regex"));
static FLATPAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*flatpak\s+"([^"]+)""#).expect("valid regex"));

static DESC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*desc\s+"([^"]*)""#).expect("valid regex"));
static HOMEPAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*homepage\s+"([^"]*)""#).expect("valid regex"));
static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*version\s+"([^"]*)""#).expect("valid regex"));
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*url\s+"([^"]*)""#).expect("valid regex"));
static LICENSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*license\s+"([^"]*)""#).expect("valid regex"));
static URL_VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[/_-]v?(\d+(?:\.\d+)+)(?:[/_.-]|$)").expect("valid regex")
});
static GITHUB_REPO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"github\.com/([^/\s]+)/([^/\s?#]+)").expect("valid regex")
});

/// Extract one token per matching line and drop repeats.
///
/// The first capture group of `pattern` is the token. Lines that do not
/// match are skipped. Duplicates are removed by exact string equality and
/// the first-seen order is kept.
pub fn extract_unique<'a, I>(lines: I, pattern: &Regex) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for line in lines {
        let Some(token) = pattern
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
        else {
            continue;
        };
        if seen.insert(token.to_string()) {
            out.push(token.to_string());
        }
    }
    out
}

/// Entries declared in one or more Brewfiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrewfileEntries {
    pub formulae: Vec<String>,
    pub casks: Vec<String>,
    pub flatpaks: Vec<String>,
}

/// Parse Brewfile text. `tap` lines are ignored.
pub fn parse_brewfile(content: &str) -> BrewfileEntries {
    BrewfileEntries {
        formulae: extract_unique(content.lines(), &BREW_RE),
        casks: extract_unique(content.lines(), &CASK_RE),
        flatpaks: extract_unique(content.lines(), &FLATPAK_RE),
    }
}

/// Merge the entries of several Brewfiles, keeping first-seen order.
pub fn merge_brewfiles<'a, I>(contents: I) -> BrewfileEntries
where
    I: IntoIterator<Item = &'a str>,
{
    let contents: Vec<&str> = contents.into_iter().collect();
    let lines = || contents.iter().flat_map(|c| c.lines());
    BrewfileEntries {
        formulae: extract_unique(lines(), &BREW_RE),
        casks: extract_unique(lines(), &CASK_RE),
        flatpaks: extract_unique(lines(), &FLATPAK_RE),
    }
}

/// Metadata scraped from a Homebrew formula (`.rb`) file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormulaMetadata {
    pub description: String,
    pub homepage: String,
    pub version: String,
    pub license: String,
    pub download_url: String,
    /// `owner/repo` when the download URL is hosted on GitHub.
    pub github_repo: Option<String>,
}

pub fn parse_formula(content: &str) -> FormulaMetadata {
    let capture = |re: &Regex| {
        re.captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    };

    let download_url = capture(&URL_RE);
    let mut version = capture(&VERSION_RE);
    if version.is_empty() {
        version = URL_VERSION_RE
            .captures(&download_url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
    }

    let github_repo = GITHUB_REPO_RE.captures(&download_url).map(|c| {
        let repo = c[2].trim_end_matches(".git");
        format!("{}/{}", &c[1], repo)
    });

    FormulaMetadata {
        description: capture(&DESC_RE),
        homepage: capture(&HOMEPAGE_RE),
        version,
        license: capture(&LICENSE_RE),
        download_url,
        github_repo,
    }
}

/// Fetches raw manifest files from the configured repository.
pub struct ManifestSource {
    client: reqwest::Client,
    config: ManifestsConfig,
    token: Option<String>,
}

impl ManifestSource {
    pub fn new(client: reqwest::Client, config: ManifestsConfig, token: Option<String>) -> Self {
        Self {
            client,
            config,
            token,
        }
    }

    fn raw_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.config.raw_base.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            self.config.branch,
            path.trim_start_matches('/')
        )
    }

    /// Fetch one manifest file. A missing file is an error here, since the
    /// configured list is expected to exist.
    pub async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        let mut request = self.client.get(self.raw_url(path));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        match http::get_text(request).await? {
            Some(text) => Ok(text),
            None => Err(FetchError::Status {
                status: 404,
                body: format!("manifest not found: {}", path),
            }),
        }
    }

    /// Flatpak ids from every configured Flatpak Brewfile, each paired with
    /// the app set of the first file that listed it.
    ///
    /// Individual files that fail are skipped. Fails only when no file
    /// could be read at all, since there is nothing to collect then.
    pub async fn flatpak_ids(&self) -> Result<Vec<(String, String)>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut fetched = 0usize;

        for manifest in &self.config.flatpak {
            let content = match self.fetch(&manifest.path).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %manifest.path, error = %e, "skipping Flatpak manifest");
                    continue;
                }
            };
            fetched += 1;

            let ids = parse_brewfile(&content).flatpaks;
            info!(path = %manifest.path, count = ids.len(), "parsed Flatpak manifest");
            for id in ids {
                if seen.insert(id.clone()) {
                    out.push((id, manifest.app_set.clone()));
                }
            }
        }

        if fetched == 0 && !self.config.flatpak.is_empty() {
            bail!("none of the {} Flatpak manifests could be fetched", self.config.flatpak.len());
        }

        Ok(out)
    }

    /// Formulae and casks from every configured Homebrew Brewfile.
    pub async fn homebrew_entries(&self) -> BrewfileEntries {
        let mut contents = Vec::new();
        for path in &self.config.homebrew {
            match self.fetch(path).await {
                Ok(c) => contents.push(c),
                Err(e) => warn!(path = %path, error = %e, "skipping Homebrew manifest"),
            }
        }
        let entries = merge_brewfiles(contents.iter().map(String::as_str));
        info!(
            formulae = entries.formulae.len(),
            casks = entries.casks.len(),
            "parsed Homebrew manifests"
        );
        entries
    }
}
