//! Homebrew catalog backend.
//!
//! Formula and cask names come from the curated Brewfiles; third-party taps
//! are listed through the GitHub contents API. Detail for core formulae and
//! casks comes from the formulae.brew.sh JSON API, tap formulae are scraped
//! from their raw `.rb` files.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

use crate::config::{HomebrewConfig, TapConfig};
use crate::error::FetchError;
use crate::http;
use crate::manifest::{self, ManifestSource};
use crate::models::{HomebrewFlavor, PackageKind};
use crate::normalize::{HomebrewStub, RawDetail, RawItem, CASK_TAP, CORE_TAP};
use crate::traits::CatalogBackend;

#[derive(Debug, Deserialize)]
struct FormulaJson {
    #[serde(default)]
    name: String,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    versions: Option<FormulaVersions>,
}

#[derive(Debug, Deserialize)]
struct FormulaVersions {
    #[serde(default)]
    stable: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaskJson {
    #[serde(default)]
    token: String,
    #[serde(default)]
    name: Vec<String>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

/// An entry of `GET /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

fn urls_with_homepage(homepage: Option<String>) -> BTreeMap<String, String> {
    homepage
        .filter(|h| !h.trim().is_empty())
        .map(|h| BTreeMap::from([("homepage".to_string(), h)]))
        .unwrap_or_default()
}

pub struct HomebrewCatalog {
    client: reqwest::Client,
    config: HomebrewConfig,
    manifests: ManifestSource,
    github_api: String,
    raw_base: String,
    token: Option<String>,
}

impl HomebrewCatalog {
    pub fn new(
        client: reqwest::Client,
        config: HomebrewConfig,
        manifests: ManifestSource,
        github_api: String,
        raw_base: String,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            config,
            manifests,
            github_api,
            raw_base,
            token,
        }
    }

    fn web_url(&self, section: &str, token: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.web_base.trim_end_matches('/'),
            section,
            token
        )
    }

    fn github_get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Formula names of one tap. A rate-limited or failing listing yields
    /// no formulae; the run carries on with the other sources.
    async fn list_tap(&self, tap: &TapConfig) -> Vec<HomebrewStub> {
        let url = format!(
            "{}/repos/{}/{}/contents/Formula?ref={}",
            self.github_api.trim_end_matches('/'),
            tap.owner,
            tap.repo,
            tap.branch
        );

        let entries: Vec<ContentItem> = match http::get_json(self.github_get(&url)).await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) if e.is_rate_limited() => {
                warn!(tap = %tap.tap_name(), error = %e, "tap listing rate limited, treating as empty; set GITHUB_TOKEN");
                return Vec::new();
            }
            Err(e) => {
                warn!(tap = %tap.tap_name(), error = %e, "tap listing failed, treating as empty");
                return Vec::new();
            }
        };

        let catalog_url = format!("https://github.com/{}/{}", tap.owner, tap.repo);
        let stubs: Vec<HomebrewStub> = entries
            .into_iter()
            .filter(|e| e.kind == "file")
            .filter_map(|e| e.name.strip_suffix(".rb").map(str::to_string))
            .map(|token| HomebrewStub {
                flavor: HomebrewFlavor::Formula,
                tap: tap.tap_name(),
                token,
                experimental: tap.experimental,
                catalog_url: catalog_url.clone(),
            })
            .collect();

        info!(tap = %tap.tap_name(), count = stubs.len(), "listed tap formulae");
        stubs
    }

    async fn formula_detail(&self, name: &str) -> Result<Option<RawDetail>, FetchError> {
        let url = format!("{}/formula/{}.json", self.config.api_base.trim_end_matches('/'), name);
        let formula: Option<FormulaJson> = http::get_json(self.client.get(&url)).await?;
        Ok(formula.map(|f| RawDetail {
            name: f.name,
            summary: f.desc.unwrap_or_default(),
            version: f.versions.and_then(|v| v.stable).unwrap_or_default(),
            license: f.license.unwrap_or_default(),
            urls: urls_with_homepage(f.homepage),
            ..Default::default()
        }))
    }

    async fn cask_detail(&self, token: &str) -> Result<Option<RawDetail>, FetchError> {
        let url = format!("{}/cask/{}.json", self.config.api_base.trim_end_matches('/'), token);
        let cask: Option<CaskJson> = http::get_json(self.client.get(&url)).await?;
        Ok(cask.map(|c| RawDetail {
            name: c.name.into_iter().next().unwrap_or(c.token),
            summary: c.desc.unwrap_or_default(),
            version: c.version.unwrap_or_default(),
            urls: urls_with_homepage(c.homepage),
            ..Default::default()
        }))
    }

    async fn tap_formula_detail(&self, stub: &HomebrewStub) -> Result<Option<RawDetail>, FetchError> {
        let Some(tap) = self.config.taps.iter().find(|t| t.tap_name() == stub.tap) else {
            return Ok(None);
        };
        let url = format!(
            "{}/{}/{}/{}/Formula/{}.rb",
            self.raw_base.trim_end_matches('/'),
            tap.owner,
            tap.repo,
            tap.branch,
            stub.token
        );
        let Some(content) = http::get_text(self.client.get(&url)).await? else {
            return Ok(None);
        };

        let meta = manifest::parse_formula(&content);
        let mut urls = urls_with_homepage(Some(meta.homepage));
        if let Some(repo) = meta.github_repo {
            urls.insert("source".to_string(), format!("https://github.com/{}", repo));
        }
        Ok(Some(RawDetail {
            name: stub.token.clone(),
            summary: meta.description,
            version: meta.version,
            license: meta.license,
            urls,
            ..Default::default()
        }))
    }
}

#[async_trait]
impl CatalogBackend for HomebrewCatalog {
    fn name(&self) -> &str {
        "homebrew"
    }

    fn kind(&self) -> PackageKind {
        PackageKind::Homebrew
    }

    async fn list_items(&self) -> Result<Vec<RawItem>> {
        let entries = self.manifests.homebrew_entries().await;

        let mut stubs: Vec<HomebrewStub> = Vec::new();
        for name in entries.formulae {
            let mut stub = HomebrewStub::from_native_id(&name);
            stub.catalog_url = if stub.tap == CORE_TAP {
                self.web_url("formula", &stub.token)
            } else {
                String::new()
            };
            stubs.push(stub);
        }
        for token in entries.casks {
            stubs.push(HomebrewStub {
                flavor: HomebrewFlavor::Cask,
                tap: CASK_TAP.to_string(),
                catalog_url: self.web_url("cask", &token),
                token,
                experimental: false,
            });
        }
        for tap in &self.config.taps {
            stubs.extend(self.list_tap(tap).await);
        }

        let mut seen = HashSet::new();
        stubs.retain(|s| seen.insert(s.native_id()));
        info!(count = stubs.len(), "collected Homebrew packages");

        Ok(stubs.into_iter().map(RawItem::Homebrew).collect())
    }

    async fn fetch_detail(&self, native_id: &str) -> Result<Option<RawDetail>, FetchError> {
        let stub = HomebrewStub::from_native_id(native_id);
        match stub.flavor {
            HomebrewFlavor::Cask => self.cask_detail(&stub.token).await,
            HomebrewFlavor::Formula if stub.tap == CORE_TAP => self.formula_detail(&stub.token).await,
            HomebrewFlavor::Formula => self.tap_formula_detail(&stub).await,
        }
    }
}
