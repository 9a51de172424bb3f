//! Flathub catalog backend.
//!
//! Discovery uses the recently-updated collection
//! (`GET {api}/collection/recently-updated`); detail comes from the
//! appstream endpoint (`GET {api}/appstream/{id}`), where 404 means the app
//! is unknown to Flathub.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::FlathubConfig;
use crate::error::FetchError;
use crate::http;
use crate::models::PackageKind;
use crate::normalize::{CatalogRelease, FlathubApp, RawDetail, RawItem};
use crate::traits::CatalogBackend;

/// Hits stay raw so one malformed entry drops only itself.
#[derive(Debug, Deserialize)]
struct CollectionResponse {
    #[serde(default)]
    hits: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AppstreamDetail {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    developer_name: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    project_license: Option<String>,
    #[serde(default)]
    urls: Option<BTreeMap<String, String>>,
    #[serde(default)]
    releases: Option<Vec<AppstreamRelease>>,
}

#[derive(Debug, Deserialize)]
struct AppstreamRelease {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    timestamp: Option<Timestamp>,
    #[serde(default)]
    description: Option<String>,
}

/// Appstream timestamps arrive as either strings or numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Number(i64),
    Text(String),
}

impl From<AppstreamDetail> for RawDetail {
    fn from(d: AppstreamDetail) -> Self {
        let releases = d
            .releases
            .unwrap_or_default()
            .into_iter()
            .map(|r| CatalogRelease {
                version: r.version.unwrap_or_default(),
                date: match (r.date, r.timestamp) {
                    (Some(date), _) if !date.is_empty() => date,
                    (_, Some(Timestamp::Number(n))) => n.to_string(),
                    (_, Some(Timestamp::Text(t))) => t,
                    _ => String::new(),
                },
                description: r.description.unwrap_or_default(),
            })
            .collect();

        RawDetail {
            name: d.name.unwrap_or_default(),
            summary: d.summary.unwrap_or_default(),
            description: d.description.unwrap_or_default(),
            developer_name: d.developer_name.unwrap_or_default(),
            icon: d.icon.unwrap_or_default(),
            version: String::new(),
            license: d.project_license.unwrap_or_default(),
            urls: d.urls.unwrap_or_default(),
            releases,
        }
    }
}

pub struct FlathubCatalog {
    client: reqwest::Client,
    config: FlathubConfig,
}

impl FlathubCatalog {
    pub fn new(client: reqwest::Client, config: FlathubConfig) -> Self {
        Self { client, config }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn app_url(&self, app_id: &str) -> String {
        format!("{}/{}", self.config.web_base.trim_end_matches('/'), app_id)
    }
}

#[async_trait]
impl CatalogBackend for FlathubCatalog {
    fn name(&self) -> &str {
        "flathub"
    }

    fn kind(&self) -> PackageKind {
        PackageKind::Flatpak
    }

    async fn list_items(&self) -> Result<Vec<RawItem>> {
        let url = self.api("collection/recently-updated");
        let response: Option<CollectionResponse> = http::get_json(self.client.get(&url))
            .await
            .with_context(|| format!("Failed to fetch Flathub listing {}", url))?;

        let hits = response.map(|r| r.hits).unwrap_or_default();
        info!(count = hits.len(), "fetched recently updated Flathub apps");

        Ok(hits
            .into_iter()
            .filter_map(|hit| match serde_json::from_value::<FlathubApp>(hit) {
                Ok(app) if !app.app_id.is_empty() => Some(app),
                Ok(_) => {
                    warn!("Flathub hit without app_id dropped");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "malformed Flathub hit dropped");
                    None
                }
            })
            .map(|mut app| {
                app.catalog_url = self.app_url(&app.app_id);
                RawItem::Flatpak(app)
            })
            .collect())
    }

    async fn list_items_by_ids(&self, ids: &[String]) -> Result<Vec<RawItem>> {
        Ok(ids
            .iter()
            .map(|id| {
                RawItem::Flatpak(FlathubApp {
                    app_id: id.clone(),
                    catalog_url: self.app_url(id),
                    ..Default::default()
                })
            })
            .collect())
    }

    async fn fetch_detail(&self, native_id: &str) -> Result<Option<RawDetail>, FetchError> {
        let url = self.api(&format!("appstream/{}", native_id));
        let detail: Option<AppstreamDetail> = http::get_json(self.client.get(&url)).await?;
        Ok(detail.map(RawDetail::from))
    }
}
