//! GitHub release backend.
//!
//! `GET {api}/repos/{owner}/{repo}/releases?per_page=N`, authenticated with
//! a bearer token. Without a token the GitHub stage does not run at all.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::error::FetchError;
use crate::http;
use crate::markdown::{Passthrough, Renderer};
use crate::models::{HostKind, Release, ReleaseOrigin, SourceRepo};
use crate::normalize::GithubRelease;
use crate::traits::ReleaseBackend;

pub struct GithubReleases {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
    renderer: Arc<dyn Renderer>,
}

impl GithubReleases {
    pub fn new(client: reqwest::Client, api_base: String, token: Option<String>) -> Self {
        Self {
            client,
            api_base,
            token,
            renderer: Arc::new(Passthrough),
        }
    }

    /// Render release bodies with `renderer` instead of keeping markdown.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

#[async_trait]
impl ReleaseBackend for GithubReleases {
    fn host_kind(&self) -> HostKind {
        HostKind::Github
    }

    fn requires_credential(&self) -> bool {
        true
    }

    fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    async fn list_releases(
        &self,
        repo: &SourceRepo,
        per_page: usize,
    ) -> Result<Vec<Release>, FetchError> {
        let Some(path) = repo.project_path() else {
            return Ok(Vec::new());
        };
        let url = format!(
            "{}/repos/{}/releases?per_page={}",
            self.api_base.trim_end_matches('/'),
            path,
            per_page
        );

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let fetched_at = Utc::now();
        let raw: Vec<GithubRelease> = http::get_json(request).await?.unwrap_or_default();

        Ok(raw
            .into_iter()
            .filter(|r| !r.tag_name.is_empty() && !r.draft)
            .take(per_page)
            .map(|r| Release {
                title: r
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| r.tag_name.clone()),
                date: r.published_at.or(r.created_at).unwrap_or(fetched_at),
                description: self.renderer.render(r.body.as_deref().unwrap_or_default()),
                url: r.html_url.filter(|u| !u.is_empty()),
                origin: ReleaseOrigin::RepoHostRelease,
                version: r.tag_name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
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

    fn repo(owner: &str, name: &str) -> SourceRepo {
        SourceRepo {
            host_kind: HostKind::Github,
            url: format!("https://github.com/{}/{}", owner, name),
            owner: Some(owner.to_string()),
            repo: Some(name.to_string()),
        }
    }

    async fn backend() -> GithubReleases {
        let app = Router::new().route(
            "/repos/{owner}/{repo}/releases",
            get(
                |Path((owner, repo)): Path<(String, String)>, headers: HeaderMap| async move {
                    let authorized = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        == Some("Bearer t0ken");
                    if !authorized {
                        return Err(StatusCode::UNAUTHORIZED);
                    }
                    match (owner.as_str(), repo.as_str()) {
                        ("sharkdp", "bat") => Ok(Json(json!([
                            {"tag_name": "v0.25.0", "name": "", "body": "## Features",
                             "html_url": "https://github.com/sharkdp/bat/releases/tag/v0.25.0",
                             "published_at": "2025-01-07T10:00:00Z"},
                            {"tag_name": "v0.24.0", "name": "bat 0.24", "body": null,
                             "created_at": "2023-10-11T10:00:00Z"},
                            {"tag_name": "", "name": "broken"}
                        ]))),
                        ("limited", _) => Err(StatusCode::FORBIDDEN),
                        _ => Err(StatusCode::NOT_FOUND),
                    }
                },
            ),
        );
        let base = serve(app).await;
        GithubReleases::new(
            http::build_client(&HttpConfig::default()).unwrap(),
            base,
            Some("t0ken".to_string()),
        )
    }

    #[tokio::test]
    async fn test_maps_releases() {
        let backend = backend().await;
        assert!(backend.requires_credential());
        assert!(backend.has_credential());

        let releases = backend.list_releases(&repo("sharkdp", "bat"), 5).await.unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].version, "v0.25.0");
        assert_eq!(releases[0].title, "v0.25.0");
        assert_eq!(releases[0].description, "## Features");
        assert_eq!(releases[0].origin, ReleaseOrigin::RepoHostRelease);
        assert_eq!(releases[1].title, "bat 0.24");
        assert_eq!(releases[1].date.to_rfc3339(), "2023-10-11T10:00:00+00:00");
        assert!(releases[1].url.is_none());
    }

    #[tokio::test]
    async fn test_not_found_is_empty_and_forbidden_is_error() {
        let backend = backend().await;
        let releases = backend.list_releases(&repo("nobody", "nothing"), 5).await.unwrap();
        assert!(releases.is_empty());

        let err = backend.list_releases(&repo("limited", "x"), 5).await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_custom_renderer_converts_bodies() {
        let backend = backend()
            .await
            .with_renderer(Arc::new(crate::markdown::MarkdownRenderer));
        let releases = backend.list_releases(&repo("sharkdp", "bat"), 5).await.unwrap();
        assert_eq!(releases[0].description.trim(), "<h2>Features</h2>");
        assert_eq!(releases[1].description, "");
    }

    #[tokio::test]
    async fn test_url_only_repo_yields_nothing() {
        let backend = backend().await;
        let repo = SourceRepo::url_only(HostKind::Github, "https://github.com/sharkdp");
        assert!(backend.list_releases(&repo, 5).await.unwrap().is_empty());
    }
}
