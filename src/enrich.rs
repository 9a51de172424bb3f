//! Enrichment Orchestrator.
//!
//! For every item whose source repository lives on a release host, fetch the
//! host's most recent releases and merge them ahead of the catalog-embedded
//! entries. Each eligible item gets its own task; results are written into a
//! slot per item index, so the output order is the input order no matter
//! which task finishes first.
//!
//! Per item the outcome is one of:
//!
//! | Outcome | When | Effect on `releases` |
//! |---------|------|----------------------|
//! | `Merged` | fetch succeeded (404 counts as empty success) | `new ++ existing`, ordered by origin |
//! | `Skipped` | no source repo, or hosted elsewhere | unchanged |
//! | `FailedSoft` | transport, rate limit, decode, other non-2xx | unchanged, warning logged |

use std::cmp::Reverse;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::models::{HostKind, Item, Release, SourceRepo};
use crate::throttle::Throttle;
use crate::traits::{BackendRegistry, ReleaseBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichOutcome {
    Merged { added: usize },
    Skipped,
    FailedSoft { error: String },
}

/// Counters of one host's enrichment stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichReport {
    pub host: HostKind,
    /// The whole stage was skipped for lack of a credential.
    pub stage_skipped: bool,
    pub merged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub releases_added: usize,
}

impl EnrichReport {
    fn new(host: HostKind) -> Self {
        Self {
            host,
            stage_skipped: false,
            merged: 0,
            skipped: 0,
            failed: 0,
            releases_added: 0,
        }
    }

    fn record(&mut self, outcome: &EnrichOutcome) {
        match outcome {
            EnrichOutcome::Merged { added } => {
                self.merged += 1;
                self.releases_added += added;
            }
            EnrichOutcome::Skipped => self.skipped += 1,
            EnrichOutcome::FailedSoft { .. } => self.failed += 1,
        }
    }
}

/// Place `new` ahead of `existing`, then order by origin priority and, within
/// one origin, newest first. The sort is stable, so equal dates keep their
/// fetch order. Entries are never de-duplicated across origins.
pub fn merge_releases(new: Vec<Release>, existing: Vec<Release>) -> Vec<Release> {
    let mut merged = new;
    merged.extend(existing);
    merged.sort_by_key(|r| (r.origin.rank(), Reverse(r.date)));
    merged
}

/// Run one release host's stage over `items`.
///
/// When the backend requires a credential and has none, `items` is handed
/// back as is: same vector, same allocation, no task spawned.
pub async fn enrich_stage(
    items: Vec<Item>,
    backend: Arc<dyn ReleaseBackend>,
    per_page: usize,
    throttle: Arc<dyn Throttle>,
) -> (Vec<Item>, EnrichReport) {
    let host = backend.host_kind();
    let mut report = EnrichReport::new(host);

    if backend.requires_credential() && !backend.has_credential() {
        warn!(host = %host, "no token configured, skipping release enrichment for this host");
        report.stage_skipped = true;
        report.skipped = items.len();
        return (items, report);
    }

    let mut eligible = vec![false; items.len()];
    let mut slots: Vec<Option<Result<Vec<Release>, FetchError>>> = Vec::with_capacity(items.len());
    slots.resize_with(items.len(), || None);

    let mut set = JoinSet::new();
    for (index, item) in items.iter().enumerate() {
        let Some(repo) = item.source_repo.clone().filter(|r| is_eligible(r, host)) else {
            continue;
        };
        eligible[index] = true;

        let backend = Arc::clone(&backend);
        let throttle = Arc::clone(&throttle);
        set.spawn(async move {
            let result = backend.list_releases(&repo, per_page).await;
            if result.is_ok() {
                throttle.pause().await;
            }
            (index, result)
        });
    }

    let spawned = set.len();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => warn!(host = %host, error = %e, "release task aborted"),
        }
    }

    let mut out = Vec::with_capacity(items.len());
    for ((mut item, slot), was_eligible) in items.into_iter().zip(slots).zip(eligible) {
        let outcome = apply(&mut item, slot, was_eligible);
        if let EnrichOutcome::FailedSoft { error } = &outcome {
            warn!(item = %item.id, host = %host, error = %error, "release fetch failed, keeping existing releases");
        }
        report.record(&outcome);
        out.push(item);
    }

    info!(
        host = %host,
        tasks = spawned,
        merged = report.merged,
        failed = report.failed,
        releases = report.releases_added,
        "release enrichment finished"
    );
    (out, report)
}

/// GitHub needs `owner/repo`; GitLab can fall back to the URL path.
fn is_eligible(repo: &SourceRepo, host: HostKind) -> bool {
    repo.host_kind == host && (host != HostKind::Github || repo.project_path().is_some())
}

fn apply(
    item: &mut Item,
    slot: Option<Result<Vec<Release>, FetchError>>,
    eligible: bool,
) -> EnrichOutcome {
    if !eligible {
        return EnrichOutcome::Skipped;
    }
    match slot {
        Some(Ok(new)) => {
            let added = new.len();
            let existing = std::mem::take(&mut item.releases);
            item.releases = merge_releases(new, existing);
            EnrichOutcome::Merged { added }
        }
        Some(Err(e)) => EnrichOutcome::FailedSoft {
            error: e.to_string(),
        },
        None => EnrichOutcome::FailedSoft {
            error: "task aborted".to_string(),
        },
    }
}

/// Run every registered release host's stage in registration order.
pub async fn enrich(
    items: Vec<Item>,
    registry: &BackendRegistry,
    per_page: usize,
    throttle: Arc<dyn Throttle>,
) -> (Vec<Item>, Vec<EnrichReport>) {
    let mut items = items;
    let mut reports = Vec::new();
    for backend in registry.release_backends() {
        let (next, report) =
            enrich_stage(items, Arc::clone(backend), per_page, Arc::clone(&throttle)).await;
        items = next;
        reports.push(report);
    }
    (items, reports)
}
