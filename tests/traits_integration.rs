//! Integration tests for the backend traits.
//!
//! Custom catalogs and release hosts (implemented via `CatalogBackend` and
//! `ReleaseBackend`) are driven through the real stage engine, the same one
//! the `run` command uses.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use release_harness::collect::Discovery;
use release_harness::error::FetchError;
use release_harness::models::{HostKind, PackageKind, Release, ReleaseOrigin, SourceRepo};
use release_harness::normalize::{CatalogRelease, RawDetail, RawItem};
use release_harness::pipeline::{run_with_backends, CatalogStage, RunPlan, StageSettings};
use release_harness::resolve::OverrideTable;
use release_harness::throttle::{CountingThrottle, NoDelay};
use release_harness::traits::{BackendRegistry, CatalogBackend, ReleaseBackend};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ─── Test Catalog ───────────────────────────────────────────────────

/// In-memory Flatpak catalog: `(app_id, homepage)` pairs. An empty homepage
/// means the detail record has no links; `missing` ids have no detail.
struct InMemoryCatalog {
    apps: Vec<(&'static str, &'static str)>,
    missing: Vec<&'static str>,
}

#[async_trait]
impl CatalogBackend for InMemoryCatalog {
    fn name(&self) -> &str {
        "inmemory"
    }

    fn kind(&self) -> PackageKind {
        PackageKind::Flatpak
    }

    async fn list_items(&self) -> Result<Vec<RawItem>> {
        Ok(self
            .apps
            .iter()
            .map(|(id, _)| RawItem::stub(PackageKind::Flatpak, id))
            .collect())
    }

    async fn fetch_detail(&self, id: &str) -> Result<Option<RawDetail>, FetchError> {
        if self.missing.iter().any(|m| *m == id) {
            return Ok(None);
        }
        let homepage = self
            .apps
            .iter()
            .find(|(app, _)| *app == id)
            .map(|(_, home)| *home)
            .unwrap_or_default();

        let mut urls = BTreeMap::new();
        if !homepage.is_empty() {
            urls.insert("homepage".to_string(), homepage.to_string());
        }
        Ok(Some(RawDetail {
            name: id.rsplit('.').next().unwrap_or(id).to_string(),
            summary: format!("{id} summary"),
            urls,
            releases: vec![CatalogRelease {
                version: "0.9".to_string(),
                date: "2025-12-01".to_string(),
                description: String::new(),
            }],
            ..Default::default()
        }))
    }
}

// ─── Test Release Host ──────────────────────────────────────────────

/// Release host that answers for one host kind and counts its calls.
struct RecordingHost {
    host: HostKind,
    credential: bool,
    fail_repo: Option<&'static str>,
    calls: AtomicUsize,
}

impl RecordingHost {
    fn new(host: HostKind, credential: bool) -> Self {
        Self {
            host,
            credential,
            fail_repo: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReleaseBackend for RecordingHost {
    fn host_kind(&self) -> HostKind {
        self.host
    }

    fn requires_credential(&self) -> bool {
        self.host == HostKind::Github
    }

    fn has_credential(&self) -> bool {
        self.credential
    }

    async fn list_releases(
        &self,
        repo: &SourceRepo,
        per_page: usize,
    ) -> Result<Vec<Release>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = repo.repo.clone().unwrap_or_default();
        if self.fail_repo == Some(name.as_str()) {
            return Err(FetchError::RateLimited { status: 429 });
        }
        Ok((0..per_page.min(2))
            .map(|i| Release {
                version: format!("{name}-{}", 2 - i),
                date: Utc.with_ymd_and_hms(2026, 2, 1 + i as u32, 0, 0, 0).unwrap(),
                title: format!("{name} release"),
                description: String::new(),
                url: None,
                origin: ReleaseOrigin::RepoHostRelease,
            })
            .collect())
    }
}

fn settings(per_page: usize) -> StageSettings {
    StageSettings {
        per_page,
        detail_throttle: Arc::new(NoDelay),
        release_throttle: Arc::new(NoDelay),
        schema_version: "1.0.0".to_string(),
    }
}

fn listing_plan() -> RunPlan {
    RunPlan {
        stages: vec![CatalogStage {
            kind: PackageKind::Flatpak,
            discovery: Discovery::Listing { cap: None },
            required: true,
        }],
        app_sets: BTreeMap::new(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_custom_backends_through_stage_engine() {
    let github = Arc::new(RecordingHost::new(HostKind::Github, true));
    let gitlab = Arc::new(RecordingHost::new(HostKind::Gitlab, false));

    let mut registry = BackendRegistry::new();
    registry.register_catalog(Arc::new(InMemoryCatalog {
        apps: vec![
            ("org.gh.One", "https://github.com/gh/one"),
            ("org.gl.Two", "https://gitlab.gnome.org/gl/two"),
            ("org.none.Three", "https://three.example.org"),
        ],
        missing: vec![],
    }));
    registry.register_release(github.clone());
    registry.register_release(gitlab.clone());

    let out = run_with_backends(&registry, &listing_plan(), &OverrideTable::default(), &settings(5))
        .await
        .unwrap();

    let items = &out.data.items;
    assert_eq!(items.len(), 3);

    let one: Vec<&str> = items[0].releases.iter().map(|r| r.version.as_str()).collect();
    assert_eq!(one, vec!["one-1", "one-2", "0.9"]);
    assert_eq!(items[1].source_repo.as_ref().unwrap().host_kind, HostKind::Gitlab);
    assert_eq!(items[1].releases[0].version, "two-1");
    assert_eq!(items[2].source_repo.as_ref().unwrap().host_kind, HostKind::Other);
    assert_eq!(items[2].releases.len(), 1);

    assert_eq!(github.calls.load(Ordering::SeqCst), 1);
    assert_eq!(gitlab.calls.load(Ordering::SeqCst), 1);

    let stats = &out.data.metadata.stats;
    assert_eq!(stats.items_with_github_repo, 1);
    assert_eq!(stats.items_with_gitlab_repo, 1);
    assert_eq!(stats.total_releases, 3 + 3 + 1);
}

#[tokio::test]
async fn test_missing_github_credential_skips_only_github() {
    let github = Arc::new(RecordingHost::new(HostKind::Github, false));
    let gitlab = Arc::new(RecordingHost::new(HostKind::Gitlab, false));

    let mut registry = BackendRegistry::new();
    registry.register_catalog(Arc::new(InMemoryCatalog {
        apps: vec![
            ("org.gh.One", "https://github.com/gh/one"),
            ("org.gl.Two", "https://gitlab.com/gl/two"),
        ],
        missing: vec![],
    }));
    registry.register_release(github.clone());
    registry.register_release(gitlab.clone());

    let out = run_with_backends(&registry, &listing_plan(), &OverrideTable::default(), &settings(5))
        .await
        .unwrap();

    assert_eq!(github.calls.load(Ordering::SeqCst), 0);
    assert_eq!(gitlab.calls.load(Ordering::SeqCst), 1);
    assert!(out.enrichment[0].stage_skipped);
    assert!(!out.enrichment[1].stage_skipped);
    assert_eq!(out.data.items[0].releases.len(), 1);
}

#[tokio::test]
async fn test_override_and_failures_are_isolated() {
    let mut github = RecordingHost::new(HostKind::Github, true);
    github.fail_repo = Some("broken");
    let github = Arc::new(github);

    let overrides = OverrideTable::parse(
        r#"
["flatpak:org.site.Only"]
host_kind = "github"
url = "https://github.com/site/only"
owner = "site"
repo = "only"

["flatpak:org.gone.Missing"]
host_kind = "github"
url = "https://github.com/gone/missing"
owner = "gone"
repo = "missing"
"#,
    )
    .unwrap();

    let mut registry = BackendRegistry::new();
    registry.register_catalog(Arc::new(InMemoryCatalog {
        apps: vec![
            ("org.site.Only", "https://site.example.org"),
            ("org.b.Broken", "https://github.com/b/broken"),
            ("org.gone.Missing", ""),
        ],
        missing: vec!["org.gone.Missing"],
    }));
    registry.register_release(github.clone());

    let out = run_with_backends(&registry, &listing_plan(), &overrides, &settings(1))
        .await
        .unwrap();
    let items = &out.data.items;

    assert_eq!(items[0].source_repo.as_ref().unwrap().url, "https://github.com/site/only");
    let only: Vec<&str> = items[0].releases.iter().map(|r| r.version.as_str()).collect();
    assert_eq!(only, vec!["only-2", "0.9"]);

    // Failed fetch keeps the catalog release.
    assert_eq!(items[1].releases.len(), 1);
    assert_eq!(items[1].releases[0].origin, ReleaseOrigin::CatalogEmbedded);

    // No detail, but the override still attaches a repo.
    assert_eq!(items[2].summary, "Flatpak package: org.gone.Missing");
    assert_eq!(items[2].releases[0].version, "missing-2");

    let report = &out.enrichment[0];
    assert_eq!(report.merged, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(github.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_throttle_paces_detail_and_release_calls() {
    let detail = Arc::new(CountingThrottle::new());
    let release = Arc::new(CountingThrottle::new());

    let mut registry = BackendRegistry::new();
    registry.register_catalog(Arc::new(InMemoryCatalog {
        apps: vec![
            ("org.a.A", "https://github.com/a/a"),
            ("org.b.B", "https://github.com/b/b"),
        ],
        missing: vec![],
    }));
    registry.register_release(Arc::new(RecordingHost::new(HostKind::Github, true)));

    let settings = StageSettings {
        per_page: 5,
        detail_throttle: detail.clone(),
        release_throttle: release.clone(),
        schema_version: "2.0.0".to_string(),
    };
    let out = run_with_backends(&registry, &listing_plan(), &OverrideTable::default(), &settings)
        .await
        .unwrap();

    assert_eq!(detail.calls(), 2);
    assert_eq!(release.calls(), 2);
    assert_eq!(out.data.metadata.schema_version, "2.0.0");
}
