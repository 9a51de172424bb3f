//! OS release-train catalog backend.
//!
//! Every published (non-draft, non-prerelease) GitHub release of the OS
//! image repository becomes one item. The repository itself is offered to
//! the resolver as the homepage link.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::info;

use crate::config::OsConfig;
use crate::error::FetchError;
use crate::http;
use crate::models::PackageKind;
use crate::normalize::{GithubRelease, OsReleaseRecord, OsTrain, RawDetail, RawItem};
use crate::traits::CatalogBackend;

pub struct OsCatalog {
    client: reqwest::Client,
    config: OsConfig,
    github_api: String,
    token: Option<String>,
}

impl OsCatalog {
    pub fn new(
        client: reqwest::Client,
        config: OsConfig,
        github_api: String,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            config,
            github_api,
            token,
        }
    }

    fn repo_url(&self) -> String {
        format!("https://github.com/{}/{}", self.config.owner, self.config.repo)
    }

    fn train(&self) -> OsTrain {
        OsTrain {
            display_name: self.config.display_name.clone(),
            icon: self.config.icon.clone(),
            notes_limit: self.config.notes_limit,
        }
    }
}

#[async_trait]
impl CatalogBackend for OsCatalog {
    fn name(&self) -> &str {
        "os-releases"
    }

    fn kind(&self) -> PackageKind {
        PackageKind::OsRelease
    }

    async fn list_items(&self) -> Result<Vec<RawItem>> {
        let url = format!(
            "{}/repos/{}/{}/releases?per_page={}",
            self.github_api.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            self.config.per_page
        );
        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let releases: Vec<GithubRelease> = http::get_json(request)
            .await
            .with_context(|| format!("Failed to fetch OS releases from {}", url))?
            .unwrap_or_default();

        let train = self.train();
        let items: Vec<RawItem> = releases
            .into_iter()
            .filter(|r| !r.draft && !r.prerelease && !r.tag_name.is_empty())
            .map(|release| {
                RawItem::OsRelease(OsReleaseRecord {
                    release,
                    train: train.clone(),
                })
            })
            .collect();

        info!(count = items.len(), repo = %self.repo_url(), "fetched OS releases");
        Ok(items)
    }

    async fn fetch_detail(&self, _native_id: &str) -> Result<Option<RawDetail>, FetchError> {
        Ok(Some(RawDetail {
            urls: BTreeMap::from([("homepage".to_string(), self.repo_url())]),
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_skips_drafts_and_prereleases() {
        let app = Router::new().route(
            "/repos/ublue-os/bluefin/releases",
            get(|| async {
                Json(json!([
                    {"tag_name": "stable-20260203", "name": "stable-20260203: Stable (F43.20260203, #abc123)",
                     "body": "| **Kernel** | 6.17.12 |", "html_url": "https://example.org/r/1",
                     "published_at": "2026-02-03T10:00:00Z", "draft": false, "prerelease": false},
                    {"tag_name": "beta-20260204", "draft": false, "prerelease": true},
                    {"tag_name": "stable-20260205", "draft": true, "prerelease": false}
                ]))
            }),
        );
        let base = serve(app).await;
        let catalog = OsCatalog::new(
            http::build_client(&HttpConfig::default()).unwrap(),
            OsConfig::default(),
            base,
            None,
        );

        let items = catalog.list_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_id(), "os:stable-20260203");

        let detail = catalog.fetch_detail("stable-20260203").await.unwrap().unwrap();
        assert_eq!(detail.urls["homepage"], "https://github.com/ublue-os/bluefin");
    }
}
