//! Run orchestration.
//!
//! Sequences one full run: catalogs → normalize/resolve → release
//! enrichment → assembly. Every run starts from scratch; nothing is read
//! back from a previous output.
//!
//! Two run modes decide which catalogs are consulted:
//!
//! - `curated`: Flatpak ids from the curated Brewfiles, plus Homebrew and
//!   the OS release train.
//! - `recent`: Flathub's recently-updated collection only, capped at
//!   `[flathub] recent_cap`.

use anyhow::{bail, Result};
use chrono::Utc;
use clap::ValueEnum;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::assemble::{self, RunSummary, Timings};
use crate::catalog_flathub::FlathubCatalog;
use crate::catalog_homebrew::HomebrewCatalog;
use crate::catalog_os::OsCatalog;
use crate::collect::{collect, Discovery};
use crate::config::{Config, Credentials};
use crate::enrich::{enrich, EnrichReport};
use crate::http;
use crate::manifest::ManifestSource;
use crate::models::{Item, OutputData, PackageKind};
use crate::release_github::GithubReleases;
use crate::release_gitlab::GitlabReleases;
use crate::resolve::{self, OverrideTable, SourceResolver};
use crate::throttle::{FixedDelay, Throttle};
use crate::traits::BackendRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Curated Brewfiles plus Homebrew and OS releases.
    Curated,
    /// Flathub's recently updated apps only.
    Recent,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Curated => "curated",
            RunMode::Recent => "recent",
        }
    }
}

/// One catalog to consult in a run.
#[derive(Debug, Clone)]
pub struct CatalogStage {
    pub kind: PackageKind,
    pub discovery: Discovery,
    /// A failing discovery aborts the run instead of being skipped.
    pub required: bool,
}

/// What a run collects.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub stages: Vec<CatalogStage>,
    /// Flatpak id → curated app set it was listed in.
    pub app_sets: BTreeMap<String, String>,
}

/// Knobs of the stage engine that do not come from backends.
pub struct StageSettings {
    pub per_page: usize,
    pub detail_throttle: Arc<dyn Throttle>,
    pub release_throttle: Arc<dyn Throttle>,
    pub schema_version: String,
}

impl StageSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            per_page: config.enrichment.per_page,
            detail_throttle: Arc::new(FixedDelay::from_millis(config.enrichment.detail_delay_ms)),
            release_throttle: Arc::new(FixedDelay::from_millis(config.enrichment.delay_ms)),
            schema_version: config.output.schema_version.clone(),
        }
    }
}

/// Register the built-in catalogs and release hosts.
pub fn build_registry(
    config: &Config,
    client: &reqwest::Client,
    credentials: &Credentials,
) -> BackendRegistry {
    let mut registry = BackendRegistry::new();

    registry.register_catalog(Arc::new(FlathubCatalog::new(
        client.clone(),
        config.flathub.clone(),
    )));
    registry.register_catalog(Arc::new(HomebrewCatalog::new(
        client.clone(),
        config.homebrew.clone(),
        manifest_source(config, client, credentials),
        config.github.api_base.clone(),
        config.manifests.raw_base.clone(),
        credentials.github.clone(),
    )));
    registry.register_catalog(Arc::new(OsCatalog::new(
        client.clone(),
        config.os.clone(),
        config.github.api_base.clone(),
        credentials.github.clone(),
    )));

    registry.register_release(Arc::new(GithubReleases::new(
        client.clone(),
        config.github.api_base.clone(),
        credentials.github.clone(),
    )));
    registry.register_release(Arc::new(GitlabReleases::new(
        client.clone(),
        config.gitlab.api_base.clone(),
        credentials.gitlab.clone(),
    )));

    registry
}

fn manifest_source(
    config: &Config,
    client: &reqwest::Client,
    credentials: &Credentials,
) -> ManifestSource {
    ManifestSource::new(
        client.clone(),
        config.manifests.clone(),
        credentials.github.clone(),
    )
}

/// Decide what to collect for `mode`. Curated mode reads the Flatpak
/// Brewfiles here; if none of them can be fetched the run fails.
pub async fn plan(
    mode: RunMode,
    config: &Config,
    client: &reqwest::Client,
    credentials: &Credentials,
) -> Result<RunPlan> {
    match mode {
        RunMode::Recent => Ok(RunPlan {
            stages: vec![CatalogStage {
                kind: PackageKind::Flatpak,
                discovery: Discovery::Listing {
                    cap: Some(config.flathub.recent_cap),
                },
                required: true,
            }],
            app_sets: BTreeMap::new(),
        }),
        RunMode::Curated => {
            let pairs = manifest_source(config, client, credentials)
                .flatpak_ids()
                .await?;
            let ids: Vec<String> = pairs.iter().map(|(id, _)| id.clone()).collect();
            info!(count = ids.len(), "curated Flatpak ids");

            Ok(RunPlan {
                stages: vec![
                    CatalogStage {
                        kind: PackageKind::Flatpak,
                        discovery: Discovery::Ids(ids),
                        required: true,
                    },
                    CatalogStage {
                        kind: PackageKind::Homebrew,
                        discovery: Discovery::Listing { cap: None },
                        required: false,
                    },
                    CatalogStage {
                        kind: PackageKind::OsRelease,
                        discovery: Discovery::Listing { cap: None },
                        required: false,
                    },
                ],
                app_sets: pairs.into_iter().collect(),
            })
        }
    }
}

/// Result of the stage engine, before anything is written.
#[derive(Debug)]
pub struct RunOutput {
    pub data: OutputData,
    pub enrichment: Vec<EnrichReport>,
}

/// Run `plan` against whatever backends `registry` holds.
///
/// This is the engine behind `run`; it performs no file I/O, so custom or
/// in-memory backends can drive it directly.
pub async fn run_with_backends(
    registry: &BackendRegistry,
    plan: &RunPlan,
    overrides: &OverrideTable,
    settings: &StageSettings,
) -> Result<RunOutput> {
    let started = Instant::now();
    let resolver = SourceResolver::new(overrides);
    let mut timings = Timings::default();
    let mut items: Vec<Item> = Vec::new();

    for stage in &plan.stages {
        let Some(catalog) = registry.catalog(stage.kind) else {
            if stage.required {
                bail!("no catalog registered for {}", stage.kind);
            }
            warn!(kind = %stage.kind, "no catalog registered, skipping");
            continue;
        };

        let stage_started = Instant::now();
        let collected = collect(
            catalog,
            stage.discovery.clone(),
            &resolver,
            Arc::clone(&settings.detail_throttle),
        )
        .await;
        record_timing(&mut timings, stage.kind, stage_started.elapsed());

        match collected {
            Ok(collected) => items.extend(collected.items),
            Err(e) if stage.required => return Err(e),
            Err(e) => warn!(kind = %stage.kind, error = %format!("{e:#}"), "catalog unavailable, continuing without it"),
        }
    }

    apply_app_sets(&mut items, &plan.app_sets);

    let enrich_started = Instant::now();
    let (items, enrichment) = enrich(
        items,
        registry,
        settings.per_page,
        Arc::clone(&settings.release_throttle),
    )
    .await;
    timings.enrichment = enrich_started.elapsed();
    timings.total = started.elapsed();

    let data = assemble::assemble(items, &settings.schema_version, &timings, Utc::now());
    Ok(RunOutput { data, enrichment })
}

fn record_timing(timings: &mut Timings, kind: PackageKind, elapsed: Duration) {
    match kind {
        PackageKind::Flatpak => timings.flatpak += elapsed,
        PackageKind::Homebrew => timings.homebrew += elapsed,
        PackageKind::OsRelease => timings.os += elapsed,
    }
}

fn apply_app_sets(items: &mut [Item], app_sets: &BTreeMap<String, String>) {
    if app_sets.is_empty() {
        return;
    }
    for item in items.iter_mut() {
        let Some(native) = item.id.strip_prefix("flatpak:") else {
            continue;
        };
        if let (Some(info), Some(set)) = (item.flatpak.as_mut(), app_sets.get(native)) {
            info.app_set = Some(set.clone());
        }
    }
}

/// The `run` command: build backends from config, run, write the dataset
/// and print the summary line to stdout.
pub async fn run(config: &Config, mode: RunMode, output: Option<&Path>) -> Result<()> {
    let client = http::build_client(&config.http)?;
    let credentials = Credentials::from_env(config);
    let overrides = resolve::init_global(OverrideTable::load(config.overrides.path.as_deref()));

    if credentials.github.is_none() {
        warn!(
            env = %config.github.token_env,
            "no GitHub token; GitHub release enrichment will be skipped"
        );
    }

    let registry = build_registry(config, &client, &credentials);
    let plan = plan(mode, config, &client, &credentials).await?;
    let settings = StageSettings::from_config(config);

    info!(mode = mode.as_str(), stages = plan.stages.len(), "starting run");
    let result = run_with_backends(&registry, &plan, overrides, &settings).await?;

    let path: PathBuf = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.output.path.clone());
    assemble::write_output(&result.data, &path)?;

    let summary = RunSummary::new(&result.data, mode.as_str(), &path);
    println!("{}", summary.to_json()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::{HostKind, Release, ReleaseOrigin, SourceRepo};
    use crate::normalize::{RawDetail, RawItem};
    use crate::throttle::NoDelay;
    use crate::traits::{CatalogBackend, ReleaseBackend};
    use async_trait::async_trait;

    struct Catalog {
        kind: PackageKind,
        fail_listing: bool,
    }

    #[async_trait]
    impl CatalogBackend for Catalog {
        fn name(&self) -> &str {
            "memory"
        }
        fn kind(&self) -> PackageKind {
            self.kind
        }
        async fn list_items(&self) -> Result<Vec<RawItem>> {
            if self.fail_listing {
                bail!("listing exploded");
            }
            Ok(vec![RawItem::stub(self.kind, "one"), RawItem::stub(self.kind, "two")])
        }
        async fn fetch_detail(&self, id: &str) -> Result<Option<RawDetail>, FetchError> {
            Ok(Some(RawDetail {
                summary: format!("detail of {id}"),
                urls: [("homepage".to_string(), format!("https://github.com/mem/{id}"))]
                    .into_iter()
                    .collect(),
                ..Default::default()
            }))
        }
    }

    struct Host;

    #[async_trait]
    impl ReleaseBackend for Host {
        fn host_kind(&self) -> HostKind {
            HostKind::Github
        }
        fn requires_credential(&self) -> bool {
            true
        }
        fn has_credential(&self) -> bool {
            true
        }
        async fn list_releases(
            &self,
            repo: &SourceRepo,
            _per_page: usize,
        ) -> Result<Vec<Release>, FetchError> {
            Ok(vec![Release {
                version: format!("{}-1.0", repo.repo.as_deref().unwrap_or_default()),
                date: Utc::now(),
                title: "1.0".to_string(),
                description: String::new(),
                url: None,
                origin: ReleaseOrigin::RepoHostRelease,
            }])
        }
    }

    fn settings() -> StageSettings {
        StageSettings {
            per_page: 5,
            detail_throttle: Arc::new(NoDelay),
            release_throttle: Arc::new(NoDelay),
            schema_version: "1.0.0".to_string(),
        }
    }

    fn stage(kind: PackageKind, required: bool) -> CatalogStage {
        CatalogStage {
            kind,
            discovery: Discovery::Listing { cap: None },
            required,
        }
    }

    #[tokio::test]
    async fn test_optional_catalog_failure_is_skipped() {
        let mut registry = BackendRegistry::new();
        registry.register_catalog(Arc::new(Catalog {
            kind: PackageKind::Flatpak,
            fail_listing: false,
        }));
        registry.register_catalog(Arc::new(Catalog {
            kind: PackageKind::Homebrew,
            fail_listing: true,
        }));
        registry.register_release(Arc::new(Host));

        let mut plan = RunPlan {
            stages: vec![
                stage(PackageKind::Flatpak, true),
                stage(PackageKind::Homebrew, false),
                stage(PackageKind::OsRelease, false),
            ],
            app_sets: BTreeMap::new(),
        };
        plan.app_sets.insert("one".to_string(), "core".to_string());

        let out = run_with_backends(&registry, &plan, &OverrideTable::default(), &settings())
            .await
            .unwrap();

        let items = &out.data.items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "flatpak:one");
        assert_eq!(items[0].releases[0].version, "one-1.0");
        assert_eq!(
            items[0].flatpak.as_ref().unwrap().app_set.as_deref(),
            Some("core")
        );
        assert!(items[1].flatpak.as_ref().unwrap().app_set.is_none());
        assert_eq!(out.data.metadata.stats.items_with_github_repo, 2);
        assert_eq!(out.enrichment[0].merged, 2);
    }

    #[tokio::test]
    async fn test_required_catalog_failure_aborts() {
        let mut registry = BackendRegistry::new();
        registry.register_catalog(Arc::new(Catalog {
            kind: PackageKind::Flatpak,
            fail_listing: true,
        }));
        let plan = RunPlan {
            stages: vec![stage(PackageKind::Flatpak, true)],
            app_sets: BTreeMap::new(),
        };

        let err = run_with_backends(&registry, &plan, &OverrideTable::default(), &settings())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("listing exploded"));
    }

    #[tokio::test]
    async fn test_recent_plan_caps_listing() {
        let config = Config::minimal();
        let client = http::build_client(&config.http).unwrap();
        let plan = plan(RunMode::Recent, &config, &client, &Credentials::default())
            .await
            .unwrap();
        assert_eq!(plan.stages.len(), 1);
        assert_eq!(plan.stages[0].discovery, Discovery::Listing { cap: Some(50) });
    }
}
