//! GitLab release backend, for gitlab.com and self-hosted instances.
//!
//! The API host is taken from the repository URL unless `[gitlab] api_base`
//! overrides it. The project path is percent-encoded into one segment:
//! `GET {base}/api/v4/projects/{owner%2Frepo}/releases?per_page=N`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::FetchError;
use crate::http;
use crate::markdown::{MarkdownRenderer, Renderer};
use crate::models::{HostKind, Release, ReleaseOrigin, SourceRepo};
use crate::traits::ReleaseBackend;

const DEFAULT_HOST: &str = "gitlab.com";

#[derive(Debug, Deserialize)]
struct GitlabRelease {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    released_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

pub struct GitlabReleases {
    client: reqwest::Client,
    api_base: Option<String>,
    token: Option<String>,
    renderer: Arc<dyn Renderer>,
}

impl GitlabReleases {
    pub fn new(client: reqwest::Client, api_base: Option<String>, token: Option<String>) -> Self {
        Self {
            client,
            api_base,
            token,
            renderer: Arc::new(MarkdownRenderer),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    fn api_base_for(&self, repo_url: Option<&Url>) -> String {
        if let Some(base) = &self.api_base {
            return base.clone();
        }
        match repo_url.and_then(|u| u.host_str().map(|h| (u.scheme(), h))) {
            Some((scheme, host)) => format!("{}://{}", scheme, host),
            None => format!("https://{}", DEFAULT_HOST),
        }
    }

    fn releases_url(&self, repo: &SourceRepo, per_page: usize) -> Result<Option<Url>, FetchError> {
        let repo_url = Url::parse(&repo.url).ok();
        let project = repo.project_path().or_else(|| {
            repo_url
                .as_ref()
                .map(|u| u.path().trim_matches('/').to_string())
                .filter(|p| !p.is_empty())
        });
        let Some(project) = project else {
            return Ok(None);
        };

        let base = self.api_base_for(repo_url.as_ref());
        let mut url = Url::parse(&base)
            .map_err(|e| FetchError::Network(format!("invalid GitLab base {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Network(format!("invalid GitLab base {}", base)))?
            .pop_if_empty()
            .extend(["api", "v4", "projects"])
            .push(&project)
            .push("releases");
        url.query_pairs_mut()
            .append_pair("per_page", &per_page.to_string());
        Ok(Some(url))
    }
}

#[async_trait]
impl ReleaseBackend for GitlabReleases {
    fn host_kind(&self) -> HostKind {
        HostKind::Gitlab
    }

    fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    async fn list_releases(
        &self,
        repo: &SourceRepo,
        per_page: usize,
    ) -> Result<Vec<Release>, FetchError> {
        let Some(url) = self.releases_url(repo, per_page)? else {
            return Ok(Vec::new());
        };

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.header("PRIVATE-TOKEN", token);
        }

        let fetched_at = Utc::now();
        let raw: Vec<GitlabRelease> = http::get_json(request).await?.unwrap_or_default();
        let repo_url = repo.url.trim_end_matches('/');

        Ok(raw
            .into_iter()
            .filter(|r| !r.tag_name.is_empty())
            .take(per_page)
            .map(|r| Release {
                title: r
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| r.tag_name.clone()),
                date: r.released_at.or(r.created_at).unwrap_or(fetched_at),
                description: self
                    .renderer
                    .render(r.description.as_deref().unwrap_or_default()),
                url: Some(format!("{}/-/releases/{}", repo_url, r.tag_name)),
                origin: ReleaseOrigin::RepoHostRelease,
                version: r.tag_name,
            })
            .collect())
    }
}
